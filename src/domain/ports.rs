use super::record::TransactionRecord;
use crate::error::{RemoteError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry read back from the durable store.
///
/// Each entry decodes independently so one malformed record never hides the others.
#[derive(Debug)]
pub struct LoadedRecord {
    pub key: String,
    pub record: Result<TransactionRecord>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(&self, record: &TransactionRecord) -> Result<()>;
    async fn delete(&self, transaction_identifier: &str) -> Result<()>;
    async fn load_all(&self) -> Result<Vec<LoadedRecord>>;
}

pub type RecordStoreBox = Box<dyn RecordStore>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub product_identifier: String,
    pub transaction_identifier: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_number: String,
    pub price_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReceiptRequest {
    pub transaction_identifier: String,
    pub order_number: Option<String>,
    /// Base64-encoded receipt.
    pub receipt: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationVerdict {
    Valid(serde_json::Value),
    Invalid { reason: String },
}

/// Remote order and validation service.
#[async_trait]
pub trait ReceiptService: Send + Sync {
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> std::result::Result<CreatedOrder, RemoteError>;

    async fn validate_receipt(
        &self,
        request: ValidateReceiptRequest,
    ) -> std::result::Result<ValidationVerdict, RemoteError>;
}

pub type ReceiptServiceRef = Arc<dyn ReceiptService>;

/// Platform purchase queue as seen by the coordinator.
#[async_trait]
pub trait PurchaseQueue: Send + Sync {
    /// Identifiers of transactions the platform has not finished yet.
    async fn open_transactions(&self) -> Result<Vec<String>>;
    async fn finish_transaction(&self, transaction_identifier: &str) -> Result<()>;
}

pub type PurchaseQueueBox = Box<dyn PurchaseQueue>;
