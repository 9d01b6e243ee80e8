//! 統合テスト用ヘルパー
//!
//! ワーカーの進行をテストから制御できるトランスポートと、配信依頼のファクトリ、
//! ログ出力の取り込みを提供する。

#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use courier_domain::notification::{DeliveryRequest, NotificationError, USER_WELCOME_TEMPLATE};
use courier_mail_service::usecase::notification::{MailQueue, QueueOptions, Transport};
use tokio::sync::Semaphore;
use tracing::subscriber::DefaultGuard;

/// ゲートが開くまで配信を止めるトランスポート
///
/// `release(n)` で n 件分の配信を進められる。配信した宛先は順に記録される。
pub struct GatedTransport {
    gate:      Semaphore,
    started:   AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

impl GatedTransport {
    /// ゲートを閉じた状態で作成する
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            gate:      Semaphore::new(0),
            started:   AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    /// ゲートを開けた状態で作成する
    pub fn open() -> Arc<Self> {
        let transport = Self::closed();
        transport.release(Semaphore::MAX_PERMITS);
        transport
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// 配信を開始した（ゲート待ちを含む）件数
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// 配信を完了した宛先
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    /// `n` 件の配信が開始されるまで待つ
    pub async fn wait_started(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("配信が開始されませんでした");
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<(), NotificationError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .expect("ゲートが閉じられました")
            .forget();
        self.delivered
            .lock()
            .unwrap()
            .push(request.recipient_email.clone());
        Ok(())
    }
}

/// サンドボックスの配信依頼
pub fn request(recipient: &str) -> DeliveryRequest {
    DeliveryRequest::new(
        USER_WELCOME_TEMPLATE,
        "Geek",
        recipient,
        "",
        serde_json::json!({ "username": "geek" }),
        true,
    )
}

/// `n` 件分の宛先
pub fn recipients(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("user{i}@example.com")).collect()
}

pub fn queue(transport: Arc<dyn Transport>, worker_count: usize, capacity: usize) -> Arc<MailQueue> {
    Arc::new(MailQueue::new(
        transport,
        QueueOptions {
            worker_count,
            capacity,
            ..QueueOptions::default()
        },
    ))
}

/// キューが投入を締め切るまで待つ
pub async fn wait_until_stopped(queue: &MailQueue) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("キューが停止しませんでした");
}

/// テスト中に出力されたログを取り込むバッファ
///
/// [`LogCapture::install`] が返すガードの生存中、現在のスレッドのログを取り込む。
/// `#[tokio::test]` はカレントスレッドランタイムなので、ワーカーのログも含まれる。
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// 取り込んだログ（1 イベント 1 行）
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// 指定したアクションのビジネスイベント行
    pub fn events(&self, action: &str) -> Vec<String> {
        let needle = format!("event.action=\"{action}\"");
        self.lines()
            .into_iter()
            .filter(|line| line.contains(&needle))
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
