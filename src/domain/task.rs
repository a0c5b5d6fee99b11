//! Verification task: drives one transaction record through order creation
//! and/or receipt validation.
//!
//! A task never talks to its owner directly. Every dispatched request gets a
//! [`TaskResponder`] that emits exactly one [`TaskEvent`] on the result channel
//! once the remote call completes. The owner (normally the coordinator) is the
//! single subscriber of that channel and the only writer of record state.

use crate::domain::anomaly::{Anomaly, AnomalySink};
use crate::domain::fingerprint::{encode_receipt, fingerprint};
use crate::domain::ports::{
    CreateOrderRequest, ReceiptServiceRef, ValidateReceiptRequest, ValidationVerdict,
};
use crate::domain::record::TransactionRecord;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

pub type SharedRecord = Arc<RwLock<TransactionRecord>>;
pub type TaskSender = mpsc::UnboundedSender<TaskEvent>;
pub type TaskReceiver = mpsc::UnboundedReceiver<TaskEvent>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Init,
    WaitingForResponse,
    Finished,
    /// Absorbing: a cancelled task never dispatches again.
    Cancelled,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Init => "init",
            TaskState::WaitingForResponse => "waiting-for-response",
            TaskState::Finished => "finished",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Which request `start` chose to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    CreateOrder,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Dispatched(Branch),
    /// The task was in a state that does not allow starting.
    Rejected(TaskState),
    /// Another request for the same transaction is still outstanding.
    AlreadyInFlight,
}

/// Result of one dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    ReceiptValid(serde_json::Value),
    ReceiptInvalid {
        reason: String,
    },
    ValidationRequestFailed,
    OrderCreated {
        order_number: String,
        price_tag: String,
        fingerprint: String,
    },
    OrderCreationFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub transaction_identifier: String,
    pub product_identifier: String,
    /// Identifies the dispatch this event answers.
    pub request_id: u64,
    pub outcome: TaskOutcome,
}

/// Result handlers for one dispatched request.
///
/// Each handler consumes the responder, so a request is answered at most once.
#[derive(Debug)]
pub struct TaskResponder {
    transaction_identifier: String,
    product_identifier: String,
    request_id: u64,
    events: TaskSender,
}

impl TaskResponder {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    fn emit(self, outcome: TaskOutcome) {
        let event = TaskEvent {
            transaction_identifier: self.transaction_identifier,
            product_identifier: self.product_identifier,
            request_id: self.request_id,
            outcome,
        };
        if let Err(e) = self.events.send(event) {
            debug!(
                transaction = %e.0.transaction_identifier,
                "result channel closed, dropping task outcome"
            );
        }
    }

    pub fn on_validation_valid(self, payload: serde_json::Value) {
        info!(transaction = %self.transaction_identifier, "receipt validated: valid");
        self.emit(TaskOutcome::ReceiptValid(payload));
    }

    pub fn on_validation_invalid(self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(transaction = %self.transaction_identifier, %reason, "receipt validated: invalid");
        self.emit(TaskOutcome::ReceiptInvalid { reason });
    }

    pub fn on_validation_request_failed(self) {
        warn!(
            transaction = %self.transaction_identifier,
            "validation request failed, task will be re-queued"
        );
        self.emit(TaskOutcome::ValidationRequestFailed);
    }

    pub fn on_order_created(
        self,
        order_number: impl Into<String>,
        price_tag: impl Into<String>,
        fingerprint: impl Into<String>,
    ) {
        info!(transaction = %self.transaction_identifier, "order created");
        self.emit(TaskOutcome::OrderCreated {
            order_number: order_number.into(),
            price_tag: price_tag.into(),
            fingerprint: fingerprint.into(),
        });
    }

    pub fn on_order_creation_failed(self) {
        warn!(
            transaction = %self.transaction_identifier,
            "order creation failed, task will be re-queued"
        );
        self.emit(TaskOutcome::OrderCreationFailed);
    }
}

/// Orchestrates one transaction record through order creation and validation.
#[derive(Debug)]
pub struct VerificationTask {
    product_identifier: String,
    transaction_identifier: String,
    record: SharedRecord,
    receipt: Arc<[u8]>,
    state: TaskState,
    outstanding: Option<u64>,
    events: TaskSender,
}

impl VerificationTask {
    pub async fn new(record: SharedRecord, receipt: Arc<[u8]>, events: TaskSender) -> Self {
        let (product_identifier, transaction_identifier) = {
            let r = record.read().await;
            (
                r.product_identifier().to_string(),
                r.transaction_identifier().to_string(),
            )
        };
        Self {
            product_identifier,
            transaction_identifier,
            record,
            receipt,
            state: TaskState::Init,
            outstanding: None,
            events,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn product_identifier(&self) -> &str {
        &self.product_identifier
    }

    pub fn transaction_identifier(&self) -> &str {
        &self.transaction_identifier
    }

    pub fn record(&self) -> &SharedRecord {
        &self.record
    }

    pub fn receipt(&self) -> &[u8] {
        &self.receipt
    }

    pub fn replace_receipt(&mut self, receipt: Arc<[u8]>) {
        self.receipt = receipt;
    }

    /// Decides between order creation and validation and dispatches the request.
    ///
    /// Returns as soon as the request is spawned; the outcome arrives later on
    /// the result channel. The request waits `delay` before going out.
    pub async fn start(
        &mut self,
        service: ReceiptServiceRef,
        delay: Duration,
        sink: &dyn AnomalySink,
    ) -> StartOutcome {
        if matches!(self.state, TaskState::Cancelled | TaskState::Finished) {
            warn!(
                transaction = %self.transaction_identifier,
                state = %self.state,
                "ignoring start of a {} task", self.state
            );
            return StartOutcome::Rejected(self.state);
        }

        let receipt = encode_receipt(&self.receipt);
        if receipt.is_empty() {
            sink.report(Anomaly::EmptyReceipt {
                transaction_identifier: self.transaction_identifier.clone(),
            });
        }
        let candidate = fingerprint(&receipt);

        let (branch, order_number) = {
            let record = self.record.read().await;
            let unchanged = record.has_order()
                && record
                    .receipt_fingerprint()
                    .is_some_and(|stored| !stored.is_empty() && stored == candidate);
            let branch = if unchanged {
                Branch::Validate
            } else {
                Branch::CreateOrder
            };
            (branch, record.order_number().map(str::to_string))
        };

        self.state = TaskState::WaitingForResponse;
        let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        self.outstanding = Some(request_id);
        let responder = TaskResponder {
            transaction_identifier: self.transaction_identifier.clone(),
            product_identifier: self.product_identifier.clone(),
            request_id,
            events: self.events.clone(),
        };

        match branch {
            Branch::Validate => {
                info!(transaction = %self.transaction_identifier, "submitting receipt for validation");
                let request = ValidateReceiptRequest {
                    transaction_identifier: self.transaction_identifier.clone(),
                    order_number,
                    receipt,
                    fingerprint: candidate,
                };
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match service.validate_receipt(request).await {
                        Ok(ValidationVerdict::Valid(payload)) => {
                            responder.on_validation_valid(payload)
                        }
                        Ok(ValidationVerdict::Invalid { reason }) => {
                            responder.on_validation_invalid(reason)
                        }
                        Err(e) => {
                            debug!(error = %e, "validation request error");
                            responder.on_validation_request_failed()
                        }
                    }
                });
            }
            Branch::CreateOrder => {
                info!(transaction = %self.transaction_identifier, "requesting order creation");
                let request = CreateOrderRequest {
                    product_identifier: self.product_identifier.clone(),
                    transaction_identifier: self.transaction_identifier.clone(),
                    fingerprint: candidate,
                };
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let fingerprint = request.fingerprint.clone();
                    match service.create_order(request).await {
                        Ok(order) => responder.on_order_created(
                            order.order_number,
                            order.price_tag,
                            fingerprint,
                        ),
                        Err(e) => {
                            debug!(error = %e, "order creation error");
                            responder.on_order_creation_failed()
                        }
                    }
                });
            }
        }

        StartOutcome::Dispatched(branch)
    }

    /// Moves the task to `Cancelled` whatever its current state.
    ///
    /// An already dispatched request is not aborted; its outcome is stale from now on.
    pub fn cancel(&mut self) {
        if self.state != TaskState::Cancelled {
            debug!(transaction = %self.transaction_identifier, from = %self.state, "task cancelled");
        }
        self.state = TaskState::Cancelled;
        self.outstanding = None;
    }

    /// Marks the outstanding request as conclusively answered.
    pub fn finish(&mut self) {
        if self.state == TaskState::WaitingForResponse {
            self.state = TaskState::Finished;
            self.outstanding = None;
        }
    }

    /// Whether `event` answers this task's current outstanding request.
    pub fn accepts(&self, event: &TaskEvent) -> bool {
        self.state == TaskState::WaitingForResponse
            && self.outstanding == Some(event.request_id)
            && event.transaction_identifier == self.transaction_identifier
    }
}

impl PartialEq for VerificationTask {
    fn eq(&self, other: &Self) -> bool {
        self.transaction_identifier == other.transaction_identifier
            && self.product_identifier == other.product_identifier
    }
}

impl Eq for VerificationTask {}
