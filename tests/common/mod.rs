#![allow(dead_code)]

use async_trait::async_trait;
use receipt_verifier::domain::anomaly::{Anomaly, AnomalySink};
use receipt_verifier::domain::ports::{
    CreateOrderRequest, CreatedOrder, ReceiptService, ValidateReceiptRequest, ValidationVerdict,
};
use receipt_verifier::error::RemoteError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Receipt service that records every call and can be told to fail.
pub struct SpyService {
    create_orders: Mutex<Vec<CreateOrderRequest>>,
    validations: Mutex<Vec<ValidateReceiptRequest>>,
    order_failures: AtomicU32,
    validation_failures: AtomicU32,
    verdict: ValidationVerdict,
}

impl Default for SpyService {
    fn default() -> Self {
        Self {
            create_orders: Mutex::default(),
            validations: Mutex::default(),
            order_failures: AtomicU32::new(0),
            validation_failures: AtomicU32::new(0),
            verdict: ValidationVerdict::Valid(serde_json::json!({"status": 0})),
        }
    }
}

impl SpyService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` order creations fail.
    pub fn with_order_failures(self, n: u32) -> Self {
        self.order_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` validations fail.
    pub fn with_validation_failures(self, n: u32) -> Self {
        self.validation_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_verdict(mut self, verdict: ValidationVerdict) -> Self {
        self.verdict = verdict;
        self
    }

    pub fn create_order_calls(&self) -> Vec<CreateOrderRequest> {
        self.create_orders.lock().unwrap().clone()
    }

    pub fn validation_calls(&self) -> Vec<ValidateReceiptRequest> {
        self.validations.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ReceiptService for SpyService {
    async fn create_order(&self, request: CreateOrderRequest) -> Result<CreatedOrder, RemoteError> {
        let order_number = format!("ORD-{}", request.transaction_identifier);
        self.create_orders.lock().unwrap().push(request);
        if Self::take_failure(&self.order_failures) {
            return Err(RemoteError::Timeout);
        }
        Ok(CreatedOrder {
            order_number,
            price_tag: "$0.99".to_string(),
        })
    }

    async fn validate_receipt(
        &self,
        request: ValidateReceiptRequest,
    ) -> Result<ValidationVerdict, RemoteError> {
        self.validations.lock().unwrap().push(request);
        if Self::take_failure(&self.validation_failures) {
            return Err(RemoteError::Server {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.verdict.clone())
    }
}

/// Anomaly sink that keeps everything it receives.
#[derive(Default)]
pub struct RecordingSink {
    anomalies: Mutex<Vec<Anomaly>>,
}

impl RecordingSink {
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.anomalies.lock().unwrap().clone()
    }
}

impl AnomalySink for RecordingSink {
    fn report(&self, anomaly: Anomaly) {
        self.anomalies.lock().unwrap().push(anomaly);
    }
}
