use crate::config::{InvalidReceiptPolicy, VerifierConfig};
use crate::domain::anomaly::{Anomaly, AnomalySinkRef};
use crate::domain::ports::{PurchaseQueueBox, ReceiptServiceRef, RecordStore, RecordStoreBox};
use crate::domain::record::TransactionRecord;
use crate::domain::task::{
    SharedRecord, StartOutcome, TaskEvent, TaskOutcome, TaskReceiver, TaskSender, TaskState,
    VerificationTask,
};
use crate::domain::transaction::PendingTransaction;
use crate::error::{Result, VerifyError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Summary of loading persisted records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    /// Keys of entries that failed to decode.
    pub rejected: Vec<String>,
}

/// What the coordinator did with one task event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The event answered a cancelled, finished or superseded request.
    Discarded,
    /// Order fields were stored and the task was started again.
    OrderRecorded(StartOutcome),
    /// A failed request was counted and re-dispatched.
    Requeued { attempts: u32 },
    /// A failed request was counted and the retry budget is spent.
    GaveUp { attempts: u32 },
    /// The service accepted the receipt.
    Validated { removed: bool },
    /// The service rejected the receipt.
    Rejected { removed: bool },
}

/// Owns the verification tasks and is the single subscriber of their results.
///
/// At most one request per transaction is outstanding at any time; the
/// coordinator alone mutates and persists records.
pub struct TaskCoordinator {
    store: RecordStoreBox,
    service: ReceiptServiceRef,
    queue: PurchaseQueueBox,
    config: VerifierConfig,
    sink: AnomalySinkRef,
    records: HashMap<String, SharedRecord>,
    receipts: HashMap<String, Arc<[u8]>>,
    tasks: HashMap<String, VerificationTask>,
    in_flight: HashSet<String>,
    events_tx: TaskSender,
    events_rx: TaskReceiver,
}

impl TaskCoordinator {
    pub fn new(
        store: RecordStoreBox,
        service: ReceiptServiceRef,
        queue: PurchaseQueueBox,
        config: VerifierConfig,
        sink: AnomalySinkRef,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store,
            service,
            queue,
            config,
            sink,
            records: HashMap::new(),
            receipts: HashMap::new(),
            tasks: HashMap::new(),
            in_flight: HashSet::new(),
            events_tx,
            events_rx,
        }
    }

    /// Loads every persisted record. A record that fails to decode is
    /// reported and skipped.
    pub async fn load(&mut self) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for entry in self.store.load_all().await? {
            match entry.record {
                Ok(record) => {
                    self.records.insert(
                        record.transaction_identifier().to_string(),
                        Arc::new(RwLock::new(record)),
                    );
                    report.loaded += 1;
                }
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "skipping unreadable record");
                    report.rejected.push(entry.key);
                }
            }
        }
        info!(
            loaded = report.loaded,
            rejected = report.rejected.len(),
            "records loaded"
        );
        Ok(report)
    }

    /// Registers a transaction reported by the purchase queue and starts its task.
    ///
    /// A record already known for the transaction is kept; only the receipt is refreshed.
    pub async fn observe(&mut self, pending: PendingTransaction) -> Result<StartOutcome> {
        let tx_id = pending.transaction_identifier.clone();
        if !self.records.contains_key(&tx_id) {
            let record = pending.to_record()?;
            self.store.save(&record).await?;
            self.records
                .insert(tx_id.clone(), Arc::new(RwLock::new(record)));
        }
        self.receipts.insert(tx_id.clone(), pending.receipt);
        self.start_task(&tx_id).await
    }

    /// Starts (or restarts) the task of a known transaction unless a request is outstanding.
    pub async fn start_task(&mut self, transaction_identifier: &str) -> Result<StartOutcome> {
        let record = self
            .records
            .get(transaction_identifier)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownTransaction(transaction_identifier.to_string()))?;
        let receipt = self
            .receipts
            .get(transaction_identifier)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownTransaction(transaction_identifier.to_string()))?;

        if record.read().await.is_validated_by_service() {
            info!(transaction = %transaction_identifier, "record already validated, finalizing");
            self.finalize(transaction_identifier).await?;
            return Ok(StartOutcome::Rejected(TaskState::Finished));
        }

        if !self.in_flight.insert(transaction_identifier.to_string()) {
            debug!(transaction = %transaction_identifier, "request already in flight");
            return Ok(StartOutcome::AlreadyInFlight);
        }

        let reusable = self
            .tasks
            .get(transaction_identifier)
            .is_some_and(|t| !matches!(t.state(), TaskState::Cancelled | TaskState::Finished));
        if !reusable {
            let task = VerificationTask::new(record, Arc::clone(&receipt), self.events_tx.clone()).await;
            self.tasks.insert(transaction_identifier.to_string(), task);
        }

        let outcome = match self.tasks.get_mut(transaction_identifier) {
            Some(task) => {
                task.replace_receipt(receipt);
                task.start(Arc::clone(&self.service), Duration::ZERO, self.sink.as_ref())
                    .await
            }
            None => StartOutcome::Rejected(TaskState::Init),
        };
        if !matches!(outcome, StartOutcome::Dispatched(_)) {
            self.in_flight.remove(transaction_identifier);
        }
        Ok(outcome)
    }

    /// Cancels the task of a transaction and releases its in-flight slot.
    ///
    /// Returns false when no task exists.
    pub fn cancel(&mut self, transaction_identifier: &str) -> bool {
        self.in_flight.remove(transaction_identifier);
        match self.tasks.get_mut(transaction_identifier) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Waits for the next task event.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events_rx.recv().await
    }

    /// Applies one task outcome to its record.
    pub async fn handle_event(&mut self, event: TaskEvent) -> Result<Disposition> {
        let tx_id = event.transaction_identifier.clone();
        let Some(task) = self.tasks.get_mut(&tx_id) else {
            debug!(transaction = %tx_id, "outcome for unknown task discarded");
            return Ok(Disposition::Discarded);
        };
        if !task.accepts(&event) {
            info!(
                transaction = %tx_id,
                state = %task.state(),
                request = event.request_id,
                "stale outcome discarded"
            );
            return Ok(Disposition::Discarded);
        }
        let record = Arc::clone(task.record());

        match event.outcome {
            TaskOutcome::OrderCreated {
                order_number,
                price_tag,
                fingerprint,
            } => {
                let mut updated = record.read().await.clone();
                updated.assign_order(order_number, price_tag, fingerprint);
                if let Err(e) = Self::commit(self.store.as_ref(), &record, updated).await {
                    self.park(&tx_id);
                    return Err(e);
                }
                if let Some(receipt) = self.receipts.get(&tx_id) {
                    task.replace_receipt(Arc::clone(receipt));
                }
                let outcome = task
                    .start(Arc::clone(&self.service), Duration::ZERO, self.sink.as_ref())
                    .await;
                if !matches!(outcome, StartOutcome::Dispatched(_)) {
                    self.in_flight.remove(&tx_id);
                }
                Ok(Disposition::OrderRecorded(outcome))
            }
            TaskOutcome::OrderCreationFailed | TaskOutcome::ValidationRequestFailed => {
                let mut updated = record.read().await.clone();
                let anomaly =
                    updated.increment_verification_attempts(self.config.attempt_warning_threshold);
                let attempts = updated.verification_attempt_count();
                if let Err(e) = Self::commit(self.store.as_ref(), &record, updated).await {
                    self.park(&tx_id);
                    return Err(e);
                }
                if let Some(anomaly) = anomaly {
                    self.sink.report(anomaly);
                }

                if !self.config.retry.should_retry(attempts) {
                    warn!(transaction = %tx_id, attempts, "retry budget spent, parking task");
                    self.park(&tx_id);
                    return Ok(Disposition::GaveUp { attempts });
                }

                let delay = self.config.retry.delay_for_attempt(attempts);
                debug!(transaction = %tx_id, attempts, ?delay, "re-queuing task");
                if let Some(receipt) = self.receipts.get(&tx_id) {
                    task.replace_receipt(Arc::clone(receipt));
                }
                let outcome = task
                    .start(Arc::clone(&self.service), delay, self.sink.as_ref())
                    .await;
                if !matches!(outcome, StartOutcome::Dispatched(_)) {
                    self.in_flight.remove(&tx_id);
                }
                Ok(Disposition::Requeued { attempts })
            }
            TaskOutcome::ReceiptValid(payload) => {
                debug!(transaction = %tx_id, %payload, "validation payload");
                if let Err(e) = Self::conclude(self.store.as_ref(), &record).await {
                    self.park(&tx_id);
                    return Err(e);
                }
                task.finish();
                self.in_flight.remove(&tx_id);
                let removed = self.finalize(&tx_id).await?;
                Ok(Disposition::Validated { removed })
            }
            TaskOutcome::ReceiptInvalid { reason } => {
                if let Err(e) = Self::conclude(self.store.as_ref(), &record).await {
                    self.park(&tx_id);
                    return Err(e);
                }
                task.finish();
                self.in_flight.remove(&tx_id);
                let removed = match self.config.invalid_receipt_policy {
                    InvalidReceiptPolicy::Escalate => {
                        self.sink.report(Anomaly::ReceiptRejected {
                            transaction_identifier: tx_id.clone(),
                            reason,
                        });
                        false
                    }
                    InvalidReceiptPolicy::Discard => self.finalize(&tx_id).await?,
                };
                Ok(Disposition::Rejected { removed })
            }
        }
    }

    /// Processes events until no request is outstanding.
    pub async fn run_until_idle(&mut self) -> Result<Vec<Disposition>> {
        let mut dispositions = Vec::new();
        while !self.in_flight.is_empty() {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            dispositions.push(self.handle_event(event).await?);
        }
        Ok(dispositions)
    }

    /// Deletes validated records whose platform transaction is no longer open.
    pub async fn reconcile(&mut self) -> Result<usize> {
        let open: HashSet<String> = self.queue.open_transactions().await?.into_iter().collect();
        let mut finalized = Vec::new();
        for (tx_id, record) in &self.records {
            if !self.in_flight.contains(tx_id)
                && !open.contains(tx_id)
                && record.read().await.is_validated_by_service()
            {
                finalized.push(tx_id.clone());
            }
        }
        for tx_id in &finalized {
            self.forget(tx_id).await?;
        }
        if !finalized.is_empty() {
            info!(removed = finalized.len(), "reconciled validated records");
        }
        Ok(finalized.len())
    }

    pub async fn record(&self, transaction_identifier: &str) -> Option<TransactionRecord> {
        match self.records.get(transaction_identifier) {
            Some(record) => Some(record.read().await.clone()),
            None => None,
        }
    }

    pub fn task_state(&self, transaction_identifier: &str) -> Option<TaskState> {
        self.tasks.get(transaction_identifier).map(|t| t.state())
    }

    pub fn is_in_flight(&self, transaction_identifier: &str) -> bool {
        self.in_flight.contains(transaction_identifier)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Snapshot of every known record.
    pub async fn records(&self) -> Vec<TransactionRecord> {
        let mut records = Vec::with_capacity(self.records.len());
        for record in self.records.values() {
            records.push(record.read().await.clone());
        }
        records
    }

    async fn conclude(store: &dyn RecordStore, record: &SharedRecord) -> Result<()> {
        let mut updated = record.read().await.clone();
        updated.mark_validated_by_service();
        Self::commit(store, record, updated).await
    }

    /// Persists `updated`, then publishes it to the shared record. On a failed
    /// write the shared record keeps matching the store.
    async fn commit(
        store: &dyn RecordStore,
        record: &SharedRecord,
        updated: TransactionRecord,
    ) -> Result<()> {
        store.save(&updated).await?;
        *record.write().await = updated;
        Ok(())
    }

    /// Cancels the task and frees its in-flight slot; a later start builds a fresh task.
    fn park(&mut self, transaction_identifier: &str) {
        if let Some(task) = self.tasks.get_mut(transaction_identifier) {
            task.cancel();
        }
        self.in_flight.remove(transaction_identifier);
    }

    /// Finishes the platform transaction if needed and drops the record once
    /// the platform no longer lists it as open.
    async fn finalize(&mut self, transaction_identifier: &str) -> Result<bool> {
        let is_open = |open: Vec<String>| open.iter().any(|t| t == transaction_identifier);

        if is_open(self.queue.open_transactions().await?) {
            self.queue.finish_transaction(transaction_identifier).await?;
            if is_open(self.queue.open_transactions().await?) {
                debug!(transaction = %transaction_identifier, "platform transaction still open");
                return Ok(false);
            }
        }
        self.forget(transaction_identifier).await?;
        Ok(true)
    }

    async fn forget(&mut self, transaction_identifier: &str) -> Result<()> {
        self.store.delete(transaction_identifier).await?;
        self.records.remove(transaction_identifier);
        self.receipts.remove(transaction_identifier);
        self.tasks.remove(transaction_identifier);
        self.in_flight.remove(transaction_identifier);
        debug!(transaction = %transaction_identifier, "record removed");
        Ok(())
    }
}
