mod common;

use chrono::Utc;
use common::{RecordingSink, SpyService};
use receipt_verifier::domain::anomaly::Anomaly;
use receipt_verifier::domain::fingerprint::fingerprint_receipt;
use receipt_verifier::domain::record::TransactionRecord;
use receipt_verifier::domain::task::{
    Branch, StartOutcome, TaskOutcome, TaskReceiver, TaskState, VerificationTask,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

async fn task_for(record: TransactionRecord, receipt: &[u8]) -> (VerificationTask, TaskReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = VerificationTask::new(Arc::new(RwLock::new(record)), Arc::from(receipt.to_vec()), tx).await;
    (task, rx)
}

fn record() -> TransactionRecord {
    TransactionRecord::new("coins.100", "1000000001", Utc::now()).unwrap()
}

async fn start(task: &mut VerificationTask, service: &Arc<SpyService>) -> StartOutcome {
    task.start(service.clone(), Duration::ZERO, &RecordingSink::default())
        .await
}

#[tokio::test]
async fn test_new_record_creates_order() {
    let service = Arc::new(SpyService::new());
    let (mut task, mut rx) = task_for(record(), b"receipt-one").await;

    assert_eq!(
        start(&mut task, &service).await,
        StartOutcome::Dispatched(Branch::CreateOrder)
    );
    rx.recv().await.unwrap();

    let calls = service.create_order_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].product_identifier, "coins.100");
    assert_eq!(calls[0].fingerprint, fingerprint_receipt(b"receipt-one"));
    assert!(service.validation_calls().is_empty());
}

#[tokio::test]
async fn test_unchanged_receipt_with_order_validates() {
    let service = Arc::new(SpyService::new());
    let mut r = record();
    r.assign_order("ORD1", "$0.99", fingerprint_receipt(b"receipt-one"));
    let (mut task, mut rx) = task_for(r, b"receipt-one").await;

    assert_eq!(
        start(&mut task, &service).await,
        StartOutcome::Dispatched(Branch::Validate)
    );
    let event = rx.recv().await.unwrap();
    assert!(matches!(event.outcome, TaskOutcome::ReceiptValid(_)));

    assert_eq!(service.validation_calls().len(), 1);
    assert!(service.create_order_calls().is_empty());
}

#[tokio::test]
async fn test_changed_receipt_creates_new_order() {
    let service = Arc::new(SpyService::new());
    let mut r = record();
    r.assign_order("ORD1", "$0.99", fingerprint_receipt(b"receipt-one"));
    let (mut task, mut rx) = task_for(r, b"receipt-one-renewed").await;

    assert_eq!(
        start(&mut task, &service).await,
        StartOutcome::Dispatched(Branch::CreateOrder)
    );
    rx.recv().await.unwrap();

    assert_eq!(service.create_order_calls().len(), 1);
    assert!(service.validation_calls().is_empty());
}

#[tokio::test]
async fn test_missing_or_empty_order_never_validates() {
    let receipt = b"receipt-one";
    let fp = fingerprint_receipt(receipt);

    let mut variants = vec![record()];
    let mut empty_order = record();
    empty_order.assign_order("", "$0.99", fp.clone());
    variants.push(empty_order);
    let mut empty_fingerprint = record();
    empty_fingerprint.assign_order("ORD1", "$0.99", "");
    variants.push(empty_fingerprint);

    for r in variants {
        let service = Arc::new(SpyService::new());
        let (mut task, _rx) = task_for(r, receipt).await;
        assert_eq!(
            start(&mut task, &service).await,
            StartOutcome::Dispatched(Branch::CreateOrder)
        );
    }
}

#[tokio::test]
async fn test_cancelled_task_sends_nothing() {
    let service = Arc::new(SpyService::new());
    let (mut task, mut rx) = task_for(record(), b"receipt-one").await;

    task.cancel();
    task.cancel();
    assert_eq!(task.state(), TaskState::Cancelled);

    for _ in 0..3 {
        assert_eq!(
            start(&mut task, &service).await,
            StartOutcome::Rejected(TaskState::Cancelled)
        );
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(rx.try_recv().is_err());
    assert!(service.create_order_calls().is_empty());
    assert!(service.validation_calls().is_empty());
}

#[tokio::test]
async fn test_empty_receipt_is_reported_and_still_dispatched() {
    let service = Arc::new(SpyService::new());
    let sink = RecordingSink::default();
    let (mut task, mut rx) = task_for(record(), b"").await;

    let outcome = task.start(service.clone(), Duration::ZERO, &sink).await;
    assert_eq!(outcome, StartOutcome::Dispatched(Branch::CreateOrder));
    rx.recv().await.unwrap();

    assert_eq!(
        sink.anomalies(),
        vec![Anomaly::EmptyReceipt {
            transaction_identifier: "1000000001".to_string()
        }]
    );
    assert_eq!(service.create_order_calls().len(), 1);
}

#[tokio::test]
async fn test_order_failure_is_reported_as_retryable() {
    let service = Arc::new(SpyService::new().with_order_failures(1));
    let (mut task, mut rx) = task_for(record(), b"receipt-one").await;

    start(&mut task, &service).await;
    let event = rx.recv().await.unwrap();
    assert_eq!(event.outcome, TaskOutcome::OrderCreationFailed);
    // Failures leave the task waiting so the owner can re-queue it.
    assert_eq!(task.state(), TaskState::WaitingForResponse);
    assert!(task.accepts(&event));
}
