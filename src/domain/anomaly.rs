use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A non-fatal condition that must reach an operator or telemetry sink.
///
/// Anomalies never stop processing; they are reported and the caller carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// The verification attempt count went past the configured warning threshold.
    AttemptThresholdExceeded {
        transaction_identifier: String,
        attempts: u32,
        threshold: u32,
    },
    /// The receipt attached to a task encoded to an empty string.
    EmptyReceipt { transaction_identifier: String },
    /// The service affirmatively rejected a receipt.
    ReceiptRejected {
        transaction_identifier: String,
        reason: String,
    },
}

impl Anomaly {
    pub fn transaction_identifier(&self) -> &str {
        match self {
            Anomaly::AttemptThresholdExceeded {
                transaction_identifier,
                ..
            }
            | Anomaly::EmptyReceipt {
                transaction_identifier,
            }
            | Anomaly::ReceiptRejected {
                transaction_identifier,
                ..
            } => transaction_identifier,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::AttemptThresholdExceeded {
                transaction_identifier,
                attempts,
                threshold,
            } => write!(
                f,
                "transaction {transaction_identifier}: {attempts} verification attempts exceeds warning threshold {threshold}"
            ),
            Anomaly::EmptyReceipt {
                transaction_identifier,
            } => write!(f, "transaction {transaction_identifier}: receipt is empty"),
            Anomaly::ReceiptRejected {
                transaction_identifier,
                reason,
            } => write!(
                f,
                "transaction {transaction_identifier}: receipt rejected by service: {reason}"
            ),
        }
    }
}

/// Destination for anomaly signals.
pub trait AnomalySink: Send + Sync {
    fn report(&self, anomaly: Anomaly);
}

pub type AnomalySinkRef = Arc<dyn AnomalySink>;

/// Reports anomalies as `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnomalySink;

impl AnomalySink for TracingAnomalySink {
    fn report(&self, anomaly: Anomaly) {
        warn!(
            transaction = anomaly.transaction_identifier(),
            "anomaly: {}", anomaly
        );
    }
}
