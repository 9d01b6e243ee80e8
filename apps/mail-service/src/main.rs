//! # Mail Service
//!
//! メール配信サブシステムをホストするプロセス。
//!
//! ## 役割
//!
//! - 環境変数から送信バックエンド（SMTP / HTTP API / noop）を選択して構築する
//! - メールキューのワーカーを起動し、Ctrl-C を受けたらキューを排出してから終了する
//! - `MAIL_TEST_RECIPIENT` が設定されていれば、起動直後に確認メールを非同期配信する
//!
//! 環境変数の一覧は [`courier_mail_service::config`] を参照。
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（noop バックエンド、サンドボックスモード）
//! cargo run -p courier-mail-service
//!
//! # SMTP 経由で送信
//! MAIL_BACKEND=smtp MAIL_HOST=localhost MAIL_PORT=1025 cargo run -p courier-mail-service
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use courier_domain::notification::DeliveryRequest;
use courier_infra::notification::{
    HttpApiNotificationSender,
    NoopNotificationSender,
    NotificationSender,
    SmtpNotificationSender,
};
use courier_mail_service::{
    config::{MailBackend, MailServiceConfig},
    usecase::notification::{
        MailClient,
        MailQueue,
        MailTransport,
        QueuedMailClient,
        TemplateRenderer,
    },
};
use courier_shared::observability::{TracingConfig, init_tracing};

/// 起動確認メールに載せるワンタイムパスワード
const TEST_OTP_CODE: &str = "000000";

/// 起動確認メールのワンタイムパスワードの有効期間
const TEST_OTP_VALIDITY: chrono::TimeDelta = chrono::TimeDelta::minutes(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(&TracingConfig::from_env("mail-service"))
        .context("トレーシングの初期化に失敗しました")?;
    let _tracing_guard = tracing::info_span!("app", service = "mail-service").entered();

    let config = MailServiceConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        backend = %config.backend,
        worker_count = config.queue.worker_count,
        queue_size = config.queue.capacity,
        max_retries = config.retry.max_retries(),
        sandbox = config.sandbox,
        "Mail Service を起動します"
    );

    let sender = build_sender(&config).context("送信バックエンドの構築に失敗しました")?;
    let renderer =
        Arc::new(TemplateRenderer::new().context("テンプレートの読み込みに失敗しました")?);
    let transport = Arc::new(MailTransport::new(renderer, sender, config.retry));
    let queue = Arc::new(MailQueue::new(transport.clone(), config.queue));
    let client = QueuedMailClient::new(queue.clone(), transport);

    queue.start().await;

    if let Some(recipient) = &config.test_recipient {
        let request = DeliveryRequest::welcome_otp(
            "Geek",
            recipient,
            "Finish up your Registration",
            TEST_OTP_CODE,
            chrono::Utc::now() + TEST_OTP_VALIDITY,
            config.sandbox,
        );
        // 投入できなくても起動は続ける
        match client.send(request).await {
            Ok(()) => {}
            Err(e) if e.is_rejection() => {
                tracing::warn!(error = %e, %recipient, "キューが確認メールを受け付けませんでした");
            }
            Err(e) => {
                tracing::error!(error = %e, %recipient, "確認メールを投入できませんでした");
            }
        }
    }

    tracing::info!("Mail Service の準備ができました。Ctrl-C で停止します");

    tokio::signal::ctrl_c()
        .await
        .context("シグナルの待機に失敗しました")?;

    tracing::info!("停止シグナルを受信しました");
    queue.stop().await;

    let stats = queue.stats();
    tracing::info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        delivered = stats.delivered,
        failed = stats.failed,
        "Mail Service を停止しました"
    );

    Ok(())
}

fn build_sender(config: &MailServiceConfig) -> anyhow::Result<Arc<dyn NotificationSender>> {
    let sender: Arc<dyn NotificationSender> = match config.backend {
        MailBackend::Smtp => Arc::new(SmtpNotificationSender::new(&config.smtp)?),
        MailBackend::Http => {
            let http = config
                .http
                .as_ref()
                .context("HTTP API の設定がありません")?;
            Arc::new(HttpApiNotificationSender::new(
                &http.api_url,
                &http.api_key,
                &config.smtp.from_address,
                &config.smtp.from_name,
            )?)
        }
        MailBackend::Noop => Arc::new(NoopNotificationSender),
    };

    tracing::info!(channel = sender.channel(), "送信バックエンドを構築しました");
    Ok(sender)
}
