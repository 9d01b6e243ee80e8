//! SMTP 通知送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//!
//! 1 回の送信で行う SMTP 対話:
//!
//! 1. 接続して EHLO
//! 2. サーバーが STARTTLS を広告していれば TLS に昇格（未対応なら平文のまま続行）
//! 3. ユーザー名とパスワードが両方設定されている場合のみ PLAIN 認証
//! 4. MAIL FROM / RCPT TO / DATA（RFC 5322 形式のメッセージ）
//! 5. QUIT
//!
//! どのステップで失敗しても、その試行だけが失敗になる。

use std::time::Duration;

use async_trait::async_trait;
use courier_domain::notification::{EmailMessage, NotificationError};
use lettre::{
    Address,
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, header::ContentType},
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
        extension::ClientId,
    },
};

use super::NotificationSender;

/// SMTP セッション全体のタイムアウト
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP 接続設定
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP サーバーのホスト名
    pub host:                 String,
    /// SMTP サーバーのポート番号（例: 587）
    pub port:                 u16,
    /// 認証ユーザー名（空なら認証しない）
    pub username:             String,
    /// 認証パスワード（空なら認証しない）
    pub password:             String,
    /// STARTTLS 時に不正な証明書を許容するか
    pub accept_invalid_certs: bool,
    /// 送信元メールアドレス
    pub from_address:         String,
    /// 送信元の表示名
    pub from_name:            String,
}

/// SMTP 通知送信
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
/// 接続は送信ごとに張り直し、インスタンスは不変の設定だけを保持する。
pub struct SmtpNotificationSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from:      Mailbox,
}

impl SmtpNotificationSender {
    /// 新しい SMTP 送信インスタンスを作成
    ///
    /// 送信元アドレスが不正な場合や TLS パラメータを構築できない場合はエラーを返す。
    pub fn new(config: &SmtpConfig) -> Result<Self, NotificationError> {
        let tls_parameters = TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| NotificationError::SendFailed(format!("TLS 設定の構築失敗: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .hello_name(ClientId::Domain("localhost".to_string()))
            .tls(Tls::Opportunistic(tls_parameters))
            .timeout(Some(SMTP_TIMEOUT));

        if !config.username.is_empty() && !config.password.is_empty() {
            builder = builder
                .credentials(Credentials::new(
                    config.username.clone(),
                    config.password.clone(),
                ))
                .authentication(vec![Mechanism::Plain]);
        }

        let from_address: Address = config
            .from_address
            .parse()
            .map_err(|e| NotificationError::SendFailed(format!("送信元アドレス不正: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from:      Mailbox::new(non_empty(&config.from_name), from_address),
        })
    }

    /// RFC 5322 形式のメッセージを組み立てる
    pub(crate) fn build_message(&self, email: &EmailMessage) -> Result<Message, NotificationError> {
        let to_address: Address = email
            .to
            .parse()
            .map_err(|e| NotificationError::SendFailed(format!("宛先アドレス不正: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(non_empty(&email.to_name), to_address))
            .subject(&email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone())
            .map_err(|e| NotificationError::SendFailed(format!("メッセージ構築失敗: {e}")))
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::SendFailed(format!("SMTP 送信失敗: {e}")))?;

        Ok(())
    }

    fn channel(&self) -> &'static str {
        "smtp"
    }

    fn from_header(&self) -> Option<String> {
        Some(self.from.to_string())
    }
}
