//! # メールキュー
//!
//! 有界のインメモリキューと固定数のワーカーで配信ジョブを非同期に処理する。
//!
//! ## 状態遷移
//!
//! ```text
//! Stopped ──start()──▶ Running ──stop()──▶ Stopped
//! ```
//!
//! - `start()` / `stop()` は冪等。内部のロックで直列化される
//! - 停止したキューは再度 `start()` できる（同じ容量・ワーカー数の新しいチャネルを作る）
//!
//! ## 設計方針
//!
//! - **バックプレッシャー**: `enqueue()` は最大 `enqueue_timeout`（既定 100ms）だけ待ち、
//!   それでも空きがなければ [`NotificationError::QueueFull`] を返す
//! - **グレースフルドレイン**: `stop()` は新規投入を締め切り、キューに残ったジョブを
//!   すべて処理し終えてワーカーが終了するまで待つ
//! - **キューではリトライしない**: リトライは [`Transport`] の責務。
//!   失敗したジョブはログと統計に残して破棄する
//! - **永続化なし**: プロセスが落ちればキュー内のジョブは失われる

use std::{
    sync::{
        Arc,
        Mutex as StdMutex,
        PoisonError,
        RwLock,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use courier_domain::notification::{MailJob, NotificationError};
use courier_shared::{event_log::event, log_business_event};
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, error::SendTimeoutError},
    },
    task::JoinHandle,
    time::Instant,
};
use tracing::Instrument;

use super::Transport;

/// デフォルトのワーカー数
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// デフォルトのキュー容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// キュー投入時の最大待機時間
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// キューの構成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// ワーカー数（0 の場合は [`DEFAULT_WORKER_COUNT`]）
    pub worker_count:    usize,
    /// キュー容量（0 の場合は [`DEFAULT_QUEUE_CAPACITY`]）
    pub capacity:        usize,
    /// 満杯時に `enqueue()` が待つ最大時間
    pub enqueue_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            worker_count:    DEFAULT_WORKER_COUNT,
            capacity:        DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }
}

impl QueueOptions {
    fn normalized(self) -> Self {
        Self {
            worker_count: if self.worker_count == 0 {
                DEFAULT_WORKER_COUNT
            } else {
                self.worker_count
            },
            capacity: if self.capacity == 0 {
                DEFAULT_QUEUE_CAPACITY
            } else {
                self.capacity
            },
            enqueue_timeout: self.enqueue_timeout,
        }
    }
}

/// キューの統計値のスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// 投入を受け付けたジョブ数
    pub accepted:             u64,
    /// 投入を拒否したジョブ数（未起動・満杯）
    pub rejected:             u64,
    /// 配信に成功したジョブ数
    pub delivered:            u64,
    /// 配信に失敗したジョブ数
    pub failed:               u64,
    /// キューで待機中のジョブ数
    pub queued:               usize,
    /// 稼働中のワーカー数
    pub active_workers:       usize,
    /// 直近に処理したジョブの処理時間
    pub last_processing_time: Option<Duration>,
}

/// ワーカーとキューで共有する統計カウンタ
#[derive(Debug, Default)]
struct QueueMetrics {
    accepted:             AtomicU64,
    rejected:             AtomicU64,
    delivered:            AtomicU64,
    failed:               AtomicU64,
    active_workers:       AtomicUsize,
    last_processing_time: StdMutex<Option<Duration>>,
}

impl QueueMetrics {
    fn record_processing_time(&self, elapsed: Duration) {
        *self
            .last_processing_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(elapsed);
    }

    fn last_processing_time(&self) -> Option<Duration> {
        *self
            .last_processing_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// ワーカーの稼働数を管理するガード
///
/// 起動時に数え、ワーカータスクの終了（panic を含む）で戻す。
struct ActiveWorkerGuard(Arc<QueueMetrics>);

impl ActiveWorkerGuard {
    fn new(metrics: Arc<QueueMetrics>) -> Self {
        metrics.active_workers.fetch_add(1, Ordering::SeqCst);
        Self(metrics)
    }
}

impl Drop for ActiveWorkerGuard {
    fn drop(&mut self) {
        self.0.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<MailJob>>>;

/// メールキュー
///
/// 全ワーカーで 1 本の有界 FIFO チャネルを共有する。
/// 各ジョブを処理するのは、それを取り出した 1 ワーカーだけ。
pub struct MailQueue {
    transport: Arc<dyn Transport>,
    options:   QueueOptions,
    /// 稼働中のみ `Some`。`enqueue()` はここから送信側を複製する
    sender:    RwLock<Option<mpsc::Sender<MailJob>>>,
    /// 稼働中のワーカー。`start()` / `stop()` の直列化も兼ねる
    workers:   Mutex<Vec<JoinHandle<()>>>,
    metrics:   Arc<QueueMetrics>,
}

impl MailQueue {
    /// 停止状態のキューを作成する
    pub fn new(transport: Arc<dyn Transport>, options: QueueOptions) -> Self {
        Self {
            transport,
            options: options.normalized(),
            sender: RwLock::new(None),
            workers: Mutex::new(Vec::new()),
            metrics: Arc::new(QueueMetrics::default()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.options.worker_count
    }

    pub fn capacity(&self) -> usize {
        self.options.capacity
    }

    /// ジョブを受け付けられる状態かどうか
    pub fn is_running(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// ワーカーを起動する
    ///
    /// すでに稼働中の場合は何もしない。
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            tracing::debug!("メールキューはすでに稼働中です");
            return;
        }

        let (sender, receiver) = mpsc::channel(self.options.capacity);
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..self.options.worker_count {
            let worker = run_worker(
                ActiveWorkerGuard::new(self.metrics.clone()),
                receiver.clone(),
                self.transport.clone(),
                self.metrics.clone(),
            )
            .instrument(tracing::info_span!("mail_worker", worker_id));
            workers.push(tokio::spawn(worker));
        }

        *self.sender.write().unwrap_or_else(PoisonError::into_inner) = Some(sender);

        tracing::info!(
            worker_count = self.options.worker_count,
            capacity = self.options.capacity,
            "メールキューを起動しました"
        );
    }

    /// 新規投入を締め切り、キューに残ったジョブを処理し終えるまで待つ
    ///
    /// 停止中の場合は何もしない。
    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        if workers.is_empty() {
            return;
        }

        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let queued = sender.as_ref().map_or(0, queued_jobs);
        drop(sender);

        tracing::info!(
            queued,
            "メールキューを停止します。残りのジョブを処理しています"
        );

        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "メールワーカーが異常終了しました");
            }
        }

        tracing::info!("メールキューを停止しました");
    }

    /// ジョブを投入する
    ///
    /// # エラー
    ///
    /// - [`NotificationError::QueueNotRunning`]: 未起動または停止済み
    /// - [`NotificationError::QueueFull`]: `enqueue_timeout` 待っても空きがない
    pub async fn enqueue(&self, job: MailJob) -> Result<(), NotificationError> {
        let sender = self
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(sender) = sender else {
            return Err(self.reject(&job, NotificationError::QueueNotRunning));
        };

        let job_id = job.id().clone();
        let template_id = job.request().template_id.clone();

        match sender.send_timeout(job, self.options.enqueue_timeout).await {
            Ok(()) => {
                self.metrics.accepted.fetch_add(1, Ordering::SeqCst);
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_ENQUEUED,
                    event.entity_type = event::entity_type::MAIL_JOB,
                    event.entity_id = %job_id,
                    event.result = event::result::SUCCESS,
                    template_id = %template_id,
                    "配信ジョブをキューに投入しました"
                );
                Ok(())
            }
            Err(SendTimeoutError::Timeout(job)) => {
                Err(self.reject(&job, NotificationError::QueueFull))
            }
            Err(SendTimeoutError::Closed(job)) => {
                Err(self.reject(&job, NotificationError::QueueNotRunning))
            }
        }
    }

    /// 統計値のスナップショットを返す
    pub fn stats(&self) -> QueueStats {
        let queued = self
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, queued_jobs);

        QueueStats {
            accepted: self.metrics.accepted.load(Ordering::SeqCst),
            rejected: self.metrics.rejected.load(Ordering::SeqCst),
            delivered: self.metrics.delivered.load(Ordering::SeqCst),
            failed: self.metrics.failed.load(Ordering::SeqCst),
            queued,
            active_workers: self.metrics.active_workers.load(Ordering::SeqCst),
            last_processing_time: self.metrics.last_processing_time(),
        }
    }

    fn reject(&self, job: &MailJob, error: NotificationError) -> NotificationError {
        self.metrics.rejected.fetch_add(1, Ordering::SeqCst);
        log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_REJECTED,
            event.entity_type = event::entity_type::MAIL_JOB,
            event.entity_id = %job.id(),
            event.result = event::result::FAILURE,
            template_id = %job.request().template_id,
            error = %error,
            "配信ジョブの投入を拒否しました"
        );
        error
    }
}

fn queued_jobs(sender: &mpsc::Sender<MailJob>) -> usize {
    sender.max_capacity() - sender.capacity()
}

/// ワーカーループ
///
/// チャネルが閉じられ、かつ空になるまでジョブを取り出して処理する。
async fn run_worker(
    _guard: ActiveWorkerGuard,
    receiver: SharedReceiver,
    transport: Arc<dyn Transport>,
    metrics: Arc<QueueMetrics>,
) {
    tracing::debug!("メールワーカーを起動しました");

    loop {
        // ロックは取り出しの間だけ保持し、配信中は他のワーカーが取り出せるようにする
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        process_job(job, transport.clone(), &metrics).await;
    }

    tracing::debug!("メールワーカーを終了しました");
}

/// 1 件のジョブを配信する
///
/// 配信は別タスクで実行する。配信中に panic してもワーカーは止まらず、
/// そのジョブだけが失敗として記録される。
async fn process_job(mut job: MailJob, transport: Arc<dyn Transport>, metrics: &QueueMetrics) {
    job.start_processing(Utc::now());
    let started = Instant::now();

    let request = job.request().clone();
    let delivery = async move { transport.deliver(&request).await }.in_current_span();
    let result = tokio::spawn(delivery)
        .await
        .unwrap_or_else(|e| Err(NotificationError::DeliveryAborted(e.to_string())));

    let elapsed = started.elapsed();
    metrics.record_processing_time(elapsed);

    match result {
        Ok(()) => {
            job.mark_sent(Utc::now());
            metrics.delivered.fetch_add(1, Ordering::SeqCst);
            log_business_event!(
                event.category = event::category::NOTIFICATION,
                event.action = event::action::NOTIFICATION_SENT,
                event.entity_type = event::entity_type::MAIL_JOB,
                event.entity_id = %job.id(),
                event.result = event::result::SUCCESS,
                template_id = %job.request().template_id,
                recipient = %job.request().recipient_email,
                status = %job.status(),
                attempts = job.attempts(),
                elapsed_ms = millis(elapsed),
                "配信ジョブを処理しました"
            );
        }
        Err(e) => {
            job.mark_failed(Utc::now());
            metrics.failed.fetch_add(1, Ordering::SeqCst);
            log_business_event!(
                event.category = event::category::NOTIFICATION,
                event.action = event::action::NOTIFICATION_FAILED,
                event.entity_type = event::entity_type::MAIL_JOB,
                event.entity_id = %job.id(),
                event.result = event::result::FAILURE,
                template_id = %job.request().template_id,
                recipient = %job.request().recipient_email,
                status = %job.status(),
                attempts = job.attempts(),
                elapsed_ms = millis(elapsed),
                error = %e,
                "配信ジョブの処理に失敗しました"
            );
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
