//! # テスト用モック送信実装
//!
//! トランスポート・キューのテストで使用するインメモリの送信実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! courier-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::sync::{
    Arc,
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use courier_domain::notification::{EmailMessage, NotificationError};

use crate::notification::NotificationSender;

// ===== MockNotificationSender =====

/// [`MockNotificationSender`] と [`PanickingNotificationSender`] の送信元
pub const MOCK_FROM_HEADER: &str = "Courier Test <test@example.com>";

/// 指定回数だけ失敗し、その後は成功する送信実装
///
/// 送信を試みたメッセージはすべて記録される。
#[derive(Clone, Default)]
pub struct MockNotificationSender {
    failures_remaining: Arc<Mutex<Option<usize>>>,
    attempts:           Arc<AtomicUsize>,
    delivered:          Arc<Mutex<Vec<EmailMessage>>>,
}

impl MockNotificationSender {
    /// 常に成功する
    pub fn new() -> Self {
        Self::default()
    }

    /// 最初の `n` 回は失敗し、以降は成功する
    pub fn failing_times(n: usize) -> Self {
        let sender = Self::default();
        *sender.failures_remaining.lock().unwrap() = Some(n);
        sender
    }

    /// 常に失敗する
    pub fn always_failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    /// 送信試行回数
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// 送信に成功したメッセージ
    pub fn delivered(&self) -> Vec<EmailMessage> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if let Some(n) = remaining.as_mut().filter(|n| **n > 0) {
                *n -= 1;
                return Err(NotificationError::SendFailed(format!(
                    "モック送信失敗 (attempt {attempt})"
                )));
            }
        }

        self.delivered.lock().unwrap().push(email.clone());
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "mock"
    }

    fn from_header(&self) -> Option<String> {
        Some(MOCK_FROM_HEADER.to_string())
    }
}

// ===== PanickingNotificationSender =====

/// 呼ばれたら panic する送信実装
///
/// サンドボックスモードでネットワークに触れないことの検証に使う。
#[derive(Debug, Clone, Default)]
pub struct PanickingNotificationSender;

#[async_trait]
impl NotificationSender for PanickingNotificationSender {
    async fn send_email(&self, _email: &EmailMessage) -> Result<(), NotificationError> {
        panic!("PanickingNotificationSender::send_email が呼ばれました");
    }

    fn channel(&self) -> &'static str {
        "panicking"
    }

    fn from_header(&self) -> Option<String> {
        Some(MOCK_FROM_HEADER.to_string())
    }
}
