use crate::domain::anomaly::Anomaly;
use crate::error::{Result, VerifyError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Durable state of one purchase transaction and its verification bookkeeping.
///
/// The identifying fields are fixed at construction. Everything else is
/// updated by the coordinator while it reacts to task outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    product_identifier: String,
    transaction_identifier: String,
    transaction_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    price_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    receipt_fingerprint: Option<String>,
    verification_attempt_count: u32,
    is_validated_by_service: bool,
}

impl TransactionRecord {
    /// Creates a fresh record with no order, no fingerprint and zero attempts.
    ///
    /// Fails if either identifier is empty.
    pub fn new(
        product_identifier: impl Into<String>,
        transaction_identifier: impl Into<String>,
        transaction_date: DateTime<Utc>,
    ) -> Result<Self> {
        let record = Self {
            product_identifier: product_identifier.into(),
            transaction_identifier: transaction_identifier.into(),
            transaction_date,
            order_number: None,
            price_tag: None,
            receipt_fingerprint: None,
            verification_attempt_count: 0,
            is_validated_by_service: false,
        };
        record
            .check_identifiers()
            .map_err(VerifyError::InvalidRecord)?;
        Ok(record)
    }

    fn check_identifiers(&self) -> std::result::Result<(), String> {
        if self.product_identifier.trim().is_empty() {
            return Err("product identifier must not be empty".to_string());
        }
        if self.transaction_identifier.trim().is_empty() {
            return Err("transaction identifier must not be empty".to_string());
        }
        Ok(())
    }

    pub fn product_identifier(&self) -> &str {
        &self.product_identifier
    }

    pub fn transaction_identifier(&self) -> &str {
        &self.transaction_identifier
    }

    pub fn transaction_date(&self) -> DateTime<Utc> {
        self.transaction_date
    }

    pub fn order_number(&self) -> Option<&str> {
        self.order_number.as_deref()
    }

    pub fn price_tag(&self) -> Option<&str> {
        self.price_tag.as_deref()
    }

    pub fn receipt_fingerprint(&self) -> Option<&str> {
        self.receipt_fingerprint.as_deref()
    }

    pub fn verification_attempt_count(&self) -> u32 {
        self.verification_attempt_count
    }

    pub fn is_validated_by_service(&self) -> bool {
        self.is_validated_by_service
    }

    /// True when a non-empty order number has been assigned.
    pub fn has_order(&self) -> bool {
        self.order_number.as_deref().is_some_and(|n| !n.is_empty())
    }

    /// Stores the fields returned by a successful order creation.
    pub fn assign_order(
        &mut self,
        order_number: impl Into<String>,
        price_tag: impl Into<String>,
        fingerprint: impl Into<String>,
    ) {
        self.order_number = Some(order_number.into());
        self.price_tag = Some(price_tag.into());
        self.receipt_fingerprint = Some(fingerprint.into());
    }

    /// Sets the attempt count, returning an anomaly when it rises past `warning_threshold`.
    ///
    /// Lowering the count or setting the same value never reports.
    pub fn set_verification_attempt_count(
        &mut self,
        count: u32,
        warning_threshold: u32,
    ) -> Option<Anomaly> {
        let previous = std::mem::replace(&mut self.verification_attempt_count, count);
        let rising = count > warning_threshold && count > previous;
        rising.then(|| Anomaly::AttemptThresholdExceeded {
            transaction_identifier: self.transaction_identifier.clone(),
            attempts: count,
            threshold: warning_threshold,
        })
    }

    /// Adds one verification attempt. See [`Self::set_verification_attempt_count`].
    pub fn increment_verification_attempts(&mut self, warning_threshold: u32) -> Option<Anomaly> {
        let next = self.verification_attempt_count.saturating_add(1);
        self.set_verification_attempt_count(next, warning_threshold)
    }

    pub fn mark_validated_by_service(&mut self) {
        self.is_validated_by_service = true;
    }

    /// Serializes the record for the durable store.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| VerifyError::Encoding(e.to_string()))
    }

    /// Restores a record from its durable encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let record: Self =
            serde_json::from_slice(bytes).map_err(|e| VerifyError::Decoding(e.to_string()))?;
        record.check_identifiers().map_err(VerifyError::Decoding)?;
        Ok(record)
    }
}

// Duplicate detection: identifiers plus fingerprint, with both-absent fingerprints matching.
impl PartialEq for TransactionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.product_identifier == other.product_identifier
            && self.transaction_identifier == other.transaction_identifier
            && self.receipt_fingerprint == other.receipt_fingerprint
    }
}

impl Eq for TransactionRecord {}

impl Hash for TransactionRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.product_identifier.hash(state);
        self.transaction_identifier.hash(state);
        self.receipt_fingerprint.hash(state);
    }
}
