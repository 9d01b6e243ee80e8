//! メールキューの統合テスト
//!
//! 起動・停止のライフサイクル、バックプレッシャー、グレースフルドレインを検証する。

mod helpers;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use courier_domain::notification::{MailJob, NotificationError};
use courier_infra::mock::PanickingNotificationSender;
use courier_mail_service::usecase::notification::{MailTransport, RetryPolicy, TemplateRenderer};
use helpers::{GatedTransport, queue, recipients, request, wait_until_stopped};
use pretty_assertions::assert_eq;
use tokio::time::Instant;

fn job(recipient: &str) -> MailJob {
    MailJob::new(request(recipient), Utc::now())
}

#[tokio::test]
async fn test_enqueue_起動前はqueue_not_runningを返す() {
    // Arrange
    let sut = queue(GatedTransport::open(), 2, 5);

    // Act
    let result = sut.enqueue(job("geek@example.com")).await;

    // Assert
    assert!(matches!(result, Err(NotificationError::QueueNotRunning)));
}

#[tokio::test]
async fn test_enqueue_停止後はqueue_not_runningを返す() {
    // Arrange
    let sut = queue(GatedTransport::open(), 2, 5);
    sut.start().await;
    sut.stop().await;

    // Act
    let result = sut.enqueue(job("geek@example.com")).await;

    // Assert
    assert!(matches!(result, Err(NotificationError::QueueNotRunning)));
    assert_eq!(sut.stats().rejected, 1);
}

#[tokio::test]
async fn test_enqueue_満杯なら待機時間の後にqueue_fullを返す() {
    // Arrange: 1 ワーカーが 1 件目で止まり、容量 1 のキューが 2 件目で埋まる
    let transport = GatedTransport::closed();
    let sut = queue(transport.clone(), 1, 1);
    sut.start().await;

    sut.enqueue(job("first@example.com")).await.unwrap();
    transport.wait_started(1).await;
    sut.enqueue(job("second@example.com")).await.unwrap();

    // Act
    let started = Instant::now();
    let result = sut.enqueue(job("third@example.com")).await;
    let elapsed = started.elapsed();

    // Assert
    assert!(matches!(result, Err(NotificationError::QueueFull)));
    assert!(elapsed >= Duration::from_millis(100), "elapsed = {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "elapsed = {elapsed:?}");

    transport.release(2);
    sut.stop().await;
    assert_eq!(
        transport.delivered(),
        vec![
            "first@example.com".to_string(),
            "second@example.com".to_string(),
        ]
    );
    let stats = sut.stats();
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.rejected, 1);
}

#[tokio::test]
async fn test_stop_キューに残ったジョブを処理し終えてから戻る() {
    // Arrange
    let transport = GatedTransport::closed();
    let sut = queue(transport.clone(), 1, 10);
    sut.start().await;

    let recipients = recipients(5);
    for recipient in &recipients {
        sut.enqueue(job(recipient)).await.unwrap();
    }
    transport.wait_started(1).await;
    assert_eq!(sut.stats().queued, 4);

    // Act
    let stopping = {
        let sut = sut.clone();
        tokio::spawn(async move { sut.stop().await })
    };
    wait_until_stopped(&sut).await;
    assert!(!stopping.is_finished());
    transport.release(recipients.len());
    stopping.await.unwrap();

    // Assert
    assert_eq!(transport.delivered(), recipients);
    let stats = sut.stats();
    assert_eq!(stats.delivered, 5);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.active_workers, 0);
}

#[tokio::test]
async fn test_2ワーカー容量5で5件投入するとすべて1回ずつ配信される() {
    // Arrange
    let transport = GatedTransport::open();
    let sut = queue(transport.clone(), 2, 5);
    sut.start().await;
    assert_eq!(sut.stats().active_workers, 2);

    // Act
    let recipients = recipients(5);
    for recipient in &recipients {
        sut.enqueue(job(recipient)).await.unwrap();
    }
    sut.stop().await;

    // Assert
    let mut delivered = transport.delivered();
    delivered.sort();
    let mut expected = recipients;
    expected.sort();
    assert_eq!(delivered, expected);

    let stats = sut.stats();
    assert_eq!(stats.accepted, 5);
    assert_eq!(stats.delivered, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.active_workers, 0);
}

#[tokio::test]
async fn test_並行して投入された受理済みジョブはすべて処理される() {
    // Arrange
    let transport = GatedTransport::open();
    let sut = queue(transport.clone(), 3, 4);
    sut.start().await;

    // Act
    let producers: Vec<_> = recipients(20)
        .into_iter()
        .map(|recipient| {
            let sut = sut.clone();
            tokio::spawn(async move { sut.enqueue(job(&recipient)).await })
        })
        .collect();
    let mut accepted = 0;
    for producer in producers {
        if producer.await.unwrap().is_ok() {
            accepted += 1;
        }
    }
    sut.stop().await;

    // Assert
    let stats = sut.stats();
    assert_eq!(stats.accepted, accepted);
    assert_eq!(stats.delivered, accepted);
    assert_eq!(stats.accepted + stats.rejected, 20);
    assert_eq!(transport.delivered().len() as u64, accepted);
}

#[tokio::test]
async fn test_サンドボックスのジョブは送信手段に触れずに処理される() {
    // Arrange
    let transport = Arc::new(MailTransport::new(
        Arc::new(TemplateRenderer::new().unwrap()),
        Arc::new(PanickingNotificationSender),
        RetryPolicy::default(),
    ));
    let sut = queue(transport, 2, 5);
    sut.start().await;

    // Act
    sut.enqueue(job("geek@example.com")).await.unwrap();
    sut.stop().await;

    // Assert
    let stats = sut.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 0);
}
