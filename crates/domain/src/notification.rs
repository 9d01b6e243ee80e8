//! # 通知
//!
//! メール配信サブシステムのドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`DeliveryRequest`] | 配信依頼 | テンプレート + 宛先 + ペイロード + サンドボックスフラグ |
//! | [`MailJob`] | 配信ジョブ | キューに積まれる配信依頼。状態と試行回数を持つ |
//! | [`DeliveryMode`] | 配信モード | 同期 / 非同期（インメモリ）/ 非同期（永続、未対応） |
//! | [`EmailMessage`] | メールメッセージ | レンダリング済みの送信内容 |
//!
//! ## 設計方針
//!
//! - **fire-and-forget**: 非同期配信の呼び出し元が受け取るのはキュー投入の成否のみ
//! - **永続化なし**: ジョブはメモリ上にのみ存在し、プロセス停止で失われる
//! - **状態遷移はワーカーのみ**: `Pending → Processing → Sent | Failed`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

define_uuid_id! {
    /// 配信ジョブ ID（一意識別子）
    ///
    /// ログ相関用。UUID v7 を使用する。
    pub struct MailJobId;
}

/// ユーザー登録時の確認メール（OTP 通知）テンプレート
pub const USER_WELCOME_TEMPLATE: &str = "welcome_mail";

/// 通知配信エラー
#[derive(Debug, Error)]
pub enum NotificationError {
    /// キューが起動していない（未起動または停止済み）
    #[error("メールキューが起動していません")]
    QueueNotRunning,

    /// 待機時間内にキューへ投入できなかった
    #[error("メールキューが満杯です")]
    QueueFull,

    /// テンプレートレンダリングに失敗（リトライしない）
    #[error("テンプレートレンダリングに失敗: {0}")]
    TemplateFailed(String),

    /// 1 回の送信試行に失敗
    #[error("メール送信に失敗: {0}")]
    SendFailed(String),

    /// 配信処理そのものが異常終了した（panic など）
    #[error("配信処理が異常終了しました: {0}")]
    DeliveryAborted(String),

    /// 全試行が失敗
    #[error("{attempts} 回試行してもメールを送信できませんでした: {source}")]
    RetriesExhausted {
        /// 試行回数
        attempts: u32,
        /// 最後の試行のエラー
        #[source]
        source:   Box<NotificationError>,
    },

    /// 実装のない配信モードが指定された
    #[error("未対応の配信モードです: {0}")]
    UnsupportedDeliveryMode(DeliveryMode),
}

impl NotificationError {
    /// キュー投入時の拒否エラーかどうか
    ///
    /// 拒否された呼び出し元は、時間をおいて再投入するか同期送信に切り替えられる。
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::QueueNotRunning | Self::QueueFull)
    }
}

/// 配信モード
///
/// 文字列表現は `sync` / `async_memory` / `async_db`。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
pub enum DeliveryMode {
    /// キューを経由せず、呼び出し元のタスクで送信する
    #[strum(serialize = "sync")]
    #[serde(rename = "sync")]
    Sync,
    /// インメモリキューに投入し、ワーカーが送信する
    #[default]
    #[strum(serialize = "async_memory")]
    #[serde(rename = "async_memory")]
    AsyncInMemory,
    /// 永続キュー経由の配信（予約語。実装なし）
    #[strum(serialize = "async_db")]
    #[serde(rename = "async_db")]
    AsyncPersistent,
}

/// 配信依頼
///
/// 呼び出し元が組み立て、トランスポートに渡される送信内容の元データ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// テンプレート ID（例: `welcome_mail`）
    pub template_id:     String,
    /// 受信者の表示名
    pub recipient_name:  String,
    /// 受信者のメールアドレス
    pub recipient_email: String,
    /// 件名（空文字列の場合はテンプレートから導出する）
    pub subject:         String,
    /// テンプレートに渡すデータ
    pub payload:         serde_json::Value,
    /// サンドボックスモード（送信せずログ出力のみ）
    pub sandbox:         bool,
}

impl DeliveryRequest {
    pub fn new(
        template_id: impl Into<String>,
        recipient_name: impl Into<String>,
        recipient_email: impl Into<String>,
        subject: impl Into<String>,
        payload: serde_json::Value,
        sandbox: bool,
    ) -> Self {
        Self {
            template_id: template_id.into(),
            recipient_name: recipient_name.into(),
            recipient_email: recipient_email.into(),
            subject: subject.into(),
            payload,
            sandbox,
        }
    }

    /// ワンタイムパスワードを通知する登録確認メールの配信依頼を作成する
    ///
    /// ペイロードには `username`、`otp_code`、`otp_expires_at`、`subject` を詰める。
    pub fn welcome_otp(
        username: &str,
        email: &str,
        subject: &str,
        otp_code: &str,
        otp_expires_at: DateTime<Utc>,
        sandbox: bool,
    ) -> Self {
        let payload = serde_json::json!({
            "username": username,
            "otp_code": otp_code,
            "otp_expires_at": otp_expires_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "subject": subject,
        });

        Self::new(
            USER_WELCOME_TEMPLATE,
            username,
            email,
            subject,
            payload,
            sandbox,
        )
    }
}

/// 配信ジョブの状態
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum MailJobStatus {
    /// キュー待ち
    Pending,
    /// ワーカーが処理中
    Processing,
    /// 送信完了（サンドボックスでのログ出力を含む）
    Sent,
    /// 送信失敗（トランスポートのリトライを使い切った）
    Failed,
}

/// 配信ジョブ
///
/// 非同期配信のたびにファサードが生成し、キューが所有する。
/// 状態と試行回数を変更するのは、ジョブを取り出したワーカーだけ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailJob {
    id:         MailJobId,
    request:    DeliveryRequest,
    status:     MailJobStatus,
    attempts:   u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MailJob {
    /// 新しい配信ジョブを `Pending` 状態で作成する
    pub fn new(request: DeliveryRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: MailJobId::new(),
            request,
            status: MailJobStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &MailJobId {
        &self.id
    }

    pub fn request(&self) -> &DeliveryRequest {
        &self.request
    }

    pub fn status(&self) -> MailJobStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// ワーカーが処理を開始する
    pub fn start_processing(&mut self, now: DateTime<Utc>) {
        self.status = MailJobStatus::Processing;
        self.attempts += 1;
        self.updated_at = now;
    }

    /// 送信完了として記録する
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = MailJobStatus::Sent;
        self.updated_at = now;
    }

    /// 送信失敗として記録する
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = MailJobStatus::Failed;
        self.updated_at = now;
    }
}

/// メールメッセージ
///
/// テンプレートレンダリングの出力。`NotificationSender` に渡される。
/// 送信元アドレスは送信実装側が保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    /// 送信先メールアドレス
    pub to:        String,
    /// 送信先の表示名
    pub to_name:   String,
    /// 件名
    pub subject:   String,
    /// HTML 本文
    pub html_body: String,
}
