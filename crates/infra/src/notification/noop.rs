//! Noop 通知送信実装
//!
//! 送信バックエンドを用意していない環境（`MAIL_BACKEND=noop`）で使う。
//! ネットワークには触れず、宛先と件名だけをログに残して成功を返す。
//! 本文を出力するサンドボックスモードとは異なり、本文はサイズのみ記録する。

use async_trait::async_trait;
use courier_domain::notification::{EmailMessage, NotificationError};

use super::NotificationSender;

/// Noop 通知送信（ログ出力のみ）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationSender;

#[async_trait]
impl NotificationSender for NoopNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        tracing::info!(
            to = %email.to,
            to_name = %email.to_name,
            subject = %email.subject,
            body_bytes = email.html_body.len(),
            "Noop: メール送信をスキップ"
        );
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn 宛先が不正でも送信をスキップして成功する() {
        let sender = NoopNotificationSender;
        let email = EmailMessage {
            to:        "broken".to_string(),
            to_name:   String::new(),
            subject:   "Finish up your Registration".to_string(),
            html_body: "<p>123456</p>".to_string(),
        };

        assert!(sender.send_email(&email).await.is_ok());
        assert_eq!(sender.channel(), "noop");
    }
}
