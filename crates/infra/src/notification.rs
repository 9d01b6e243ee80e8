//! # 通知送信
//!
//! メール 1 通を 1 回だけ送信する「ワイヤ」層のインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: `NotificationSender` trait でメール送信を抽象化
//! - **3 つの実装**: SMTP（lettre）、HTTP API（reqwest）、Noop（ログのみ）
//! - **1 回の試行のみ**: リトライ・待機・サンドボックス判定は呼び出し側（トランスポート）が行う
//! - **環境変数切替**: `MAIL_BACKEND` でランタイム選択

mod http_api;
mod noop;
mod smtp;

use async_trait::async_trait;
use courier_domain::notification::{EmailMessage, NotificationError};
pub use http_api::{DEFAULT_API_URL, HttpApiNotificationSender};
pub use noop::NoopNotificationSender;
pub use smtp::{SmtpConfig, SmtpNotificationSender};

/// メール送信トレイト
///
/// 配信基盤の最下層。具体的な送信手段を抽象化する。
/// 実装は不変の設定だけを持ち、全ワーカーから同時に呼ばれても安全であること。
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// メールを 1 回送信する
    ///
    /// 失敗は `NotificationError::SendFailed` で返す。どのステップで失敗しても、
    /// この試行だけが失敗扱いになる。
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError>;

    /// 送信手段の名前（ログ出力用）
    fn channel(&self) -> &'static str;

    /// 送信元（From ヘッダーの値）
    ///
    /// サンドボックスモードのログに使う。送信元を持たない実装は `None`。
    fn from_header(&self) -> Option<String> {
        None
    }
}
