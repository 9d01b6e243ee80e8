//! # 配信トランスポート
//!
//! テンプレートレンダリング → サンドボックス判定 → リトライ付き送信 を 1 回の配信として実行する。
//!
//! ## 設計方針
//!
//! - **[`Transport`] trait**: キュー・ファサードが依存する配信契約。テストではスタブに差し替える
//! - **送信手段の注入**: ネットワークに触れる部分は `NotificationSender` に委譲し、
//!   SMTP と HTTP API で同じリトライ・サンドボックス処理を共有する
//! - **固定間隔リトライ**: 指数バックオフではなく、毎回同じ `retry_delay` だけ待つ
//! - **レンダリング失敗はリトライしない**

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_domain::notification::{DeliveryRequest, EmailMessage, NotificationError};
use courier_infra::notification::NotificationSender;
use courier_shared::{event_log::event, log_business_event};

use super::TemplateRenderer;

/// デフォルトの最大試行回数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// デフォルトの試行間隔
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 配信契約
///
/// 1 件の配信依頼を最後まで処理する。成功・失敗は戻り値で返し、
/// リトライが必要ならこの中で完結させる（キュー側ではリトライしない）。
/// 実装は全ワーカーから同時に呼ばれても安全であること。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<(), NotificationError>;
}

/// リトライ方針
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    /// `max_retries` は 1 未満を指定しても 1 回は試行する
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// メール配信トランスポート
///
/// テンプレートから [`EmailMessage`] を組み立て、注入された送信手段で配信する。
pub struct MailTransport {
    renderer: Arc<TemplateRenderer>,
    sender:   Arc<dyn NotificationSender>,
    retry:    RetryPolicy,
}

impl MailTransport {
    pub fn new(
        renderer: Arc<TemplateRenderer>,
        sender: Arc<dyn NotificationSender>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            renderer,
            sender,
            retry,
        }
    }

    /// 配信依頼からメールメッセージを組み立てる
    ///
    /// 件名の優先順位: 呼び出し元の件名 → テンプレートの件名 → `Message for {受信者名}`
    fn compose(&self, request: &DeliveryRequest) -> Result<EmailMessage, NotificationError> {
        let rendered = self
            .renderer
            .render(&request.template_id, &request.payload)?;

        let subject = if request.subject.is_empty() {
            rendered
                .subject
                .unwrap_or_else(|| format!("Message for {}", request.recipient_name))
        } else {
            request.subject.clone()
        };

        Ok(EmailMessage {
            to: request.recipient_email.clone(),
            to_name: request.recipient_name.clone(),
            subject,
            html_body: rendered.html_body,
        })
    }

    async fn send_with_retry(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let max_retries = self.retry.max_retries();
        let channel = self.sender.channel();
        let mut attempt = 1;

        loop {
            tracing::debug!(
                channel,
                attempt,
                max_retries,
                to = %email.to,
                "メール送信を試行します"
            );

            let err = match self.sender.send_email(email).await {
                Ok(()) => {
                    tracing::info!(channel, attempt, to = %email.to, "メールを送信しました");
                    return Ok(());
                }
                Err(e) => e,
            };

            tracing::warn!(
                channel,
                attempt,
                max_retries,
                to = %email.to,
                error = %err,
                "メール送信の試行に失敗しました"
            );

            if attempt >= max_retries {
                return Err(NotificationError::RetriesExhausted {
                    attempts: attempt,
                    source:   Box::new(err),
                });
            }

            let delay_ms =
                u64::try_from(self.retry.retry_delay().as_millis()).unwrap_or(u64::MAX);
            tracing::debug!(delay_ms, "リトライまで待機します");
            tokio::time::sleep(self.retry.retry_delay()).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Transport for MailTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<(), NotificationError> {
        let email = self.compose(request).inspect_err(|e| {
            tracing::error!(
                template_id = %request.template_id,
                error = %e,
                "通知テンプレートのレンダリングに失敗"
            );
        })?;

        if request.sandbox {
            log_business_event!(
                event.category = event::category::NOTIFICATION,
                event.action = event::action::NOTIFICATION_SANDBOXED,
                event.result = event::result::SUCCESS,
                template_id = %request.template_id,
                from = %self.sender.from_header().unwrap_or_default(),
                to = %email.to,
                subject = %email.subject,
                content_type = "text/html; charset=UTF-8",
                body = %email.html_body,
                "SANDBOX MODE: メールを送信せずログ出力のみ行いました"
            );
            return Ok(());
        }

        self.send_with_retry(&email).await
    }
}
