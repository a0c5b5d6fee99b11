use crate::domain::record::TransactionRecord;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A transaction reported by the platform purchase queue, with its receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub product_identifier: String,
    pub transaction_identifier: String,
    pub transaction_date: DateTime<Utc>,
    pub receipt: Arc<[u8]>,
}

impl PendingTransaction {
    pub fn new(
        product_identifier: impl Into<String>,
        transaction_identifier: impl Into<String>,
        transaction_date: DateTime<Utc>,
        receipt: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            product_identifier: product_identifier.into(),
            transaction_identifier: transaction_identifier.into(),
            transaction_date,
            receipt: receipt.into(),
        }
    }

    /// Builds the fresh record tracking this transaction.
    pub fn to_record(&self) -> Result<TransactionRecord> {
        TransactionRecord::new(
            self.product_identifier.clone(),
            self.transaction_identifier.clone(),
            self.transaction_date,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_record_copies_identity() {
        let date = Utc::now();
        let pending = PendingTransaction::new("p", "t", date, b"receipt".to_vec());
        let record = pending.to_record().unwrap();
        assert_eq!(record.product_identifier(), "p");
        assert_eq!(record.transaction_identifier(), "t");
        assert_eq!(record.transaction_date(), date);
    }

    #[test]
    fn test_to_record_rejects_missing_identifier() {
        let pending = PendingTransaction::new("p", "", Utc::now(), Vec::new());
        assert!(pending.to_record().is_err());
    }
}
