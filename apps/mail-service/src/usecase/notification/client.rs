//! # メール配信クライアント
//!
//! 呼び出し元が使う唯一の入口。配信モードに応じて同期送信とキュー投入を振り分ける。
//!
//! | モード | 経路 | 呼び出し元が受け取る結果 |
//! |--------|------|--------------------------|
//! | `sync` | [`Transport`] を直接呼ぶ | 配信結果（リトライ込み） |
//! | `async_memory` | [`MailQueue`] に投入 | 投入の成否のみ |
//! | `async_db` | なし | 常に [`NotificationError::UnsupportedDeliveryMode`] |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use courier_domain::notification::{DeliveryMode, DeliveryRequest, MailJob, NotificationError};

use super::{MailQueue, Transport};

/// メール配信クライアント
#[async_trait]
pub trait MailClient: Send + Sync {
    /// 非同期（インメモリキュー）で配信する
    ///
    /// fire-and-forget: `Ok` はキューに投入できたことだけを意味する。
    /// 配信の成否はイベントログとキューの統計値でしか分からない。
    async fn send(&self, request: DeliveryRequest) -> Result<(), NotificationError>;

    /// 配信モードを指定して配信する
    async fn send_with_options(
        &self,
        request: DeliveryRequest,
        mode: DeliveryMode,
    ) -> Result<(), NotificationError>;
}

/// キューとトランスポートを束ねた [`MailClient`] 実装
pub struct QueuedMailClient {
    queue:     Arc<MailQueue>,
    transport: Arc<dyn Transport>,
}

impl QueuedMailClient {
    /// `transport` は同期配信で使う。通常は `queue` と同じものを渡す
    pub fn new(queue: Arc<MailQueue>, transport: Arc<dyn Transport>) -> Self {
        Self { queue, transport }
    }
}

#[async_trait]
impl MailClient for QueuedMailClient {
    async fn send(&self, request: DeliveryRequest) -> Result<(), NotificationError> {
        self.send_with_options(request, DeliveryMode::AsyncInMemory)
            .await
    }

    async fn send_with_options(
        &self,
        request: DeliveryRequest,
        mode: DeliveryMode,
    ) -> Result<(), NotificationError> {
        match mode {
            DeliveryMode::Sync => {
                tracing::debug!(template_id = %request.template_id, "同期配信します");
                self.transport.deliver(&request).await
            }
            DeliveryMode::AsyncInMemory => {
                let job = MailJob::new(request, Utc::now());
                self.queue.enqueue(job).await
            }
            DeliveryMode::AsyncPersistent => {
                tracing::warn!(mode = %mode, "未対応の配信モードが指定されました");
                Err(NotificationError::UnsupportedDeliveryMode(mode))
            }
        }
    }
}
