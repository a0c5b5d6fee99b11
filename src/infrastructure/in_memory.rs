use crate::domain::ports::{LoadedRecord, PurchaseQueue, RecordStore};
use crate::domain::record::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory record store.
///
/// Keeps the encoded bytes rather than the records themselves, so it goes
/// through the same serialization contract as a persistent backend.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryRecordStore {
    /// Creates a new, empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes raw bytes under `key`, bypassing encoding.
    pub async fn put_raw(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.records.write().await.insert(key.into(), bytes);
    }

    pub async fn contains(&self, transaction_identifier: &str) -> bool {
        self.records.read().await.contains_key(transaction_identifier)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, record: &TransactionRecord) -> Result<()> {
        let bytes = record.encode()?;
        let mut records = self.records.write().await;
        records.insert(record.transaction_identifier().to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, transaction_identifier: &str) -> Result<()> {
        self.records.write().await.remove(transaction_identifier);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<LoadedRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .map(|(key, bytes)| LoadedRecord {
                key: key.clone(),
                record: TransactionRecord::decode(bytes),
            })
            .collect())
    }
}

/// Purchase queue backed by a set of open transaction identifiers.
///
/// Finishing a transaction removes it from the open set.
#[derive(Default, Clone)]
pub struct InMemoryPurchaseQueue {
    open: Arc<RwLock<BTreeSet<String>>>,
    finished: Arc<RwLock<Vec<String>>>,
}

impl InMemoryPurchaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open<I, S>(transactions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            open: Arc::new(RwLock::new(transactions.into_iter().map(Into::into).collect())),
            finished: Arc::default(),
        }
    }

    pub async fn open(&self, transaction_identifier: impl Into<String>) {
        self.open.write().await.insert(transaction_identifier.into());
    }

    /// Transactions finished through this queue, in call order.
    pub async fn finished(&self) -> Vec<String> {
        self.finished.read().await.clone()
    }
}

#[async_trait]
impl PurchaseQueue for InMemoryPurchaseQueue {
    async fn open_transactions(&self) -> Result<Vec<String>> {
        Ok(self.open.read().await.iter().cloned().collect())
    }

    async fn finish_transaction(&self, transaction_identifier: &str) -> Result<()> {
        self.open.write().await.remove(transaction_identifier);
        self.finished
            .write()
            .await
            .push(transaction_identifier.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;
    use chrono::Utc;

    fn record(tx: &str) -> TransactionRecord {
        TransactionRecord::new("coins.100", tx, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_record_store() {
        let store = InMemoryRecordStore::new();
        let mut r = record("t1");
        r.assign_order("ORD1", "$0.99", "F");

        store.save(&r).await.unwrap();
        assert!(store.contains("t1").await);

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].key, "t1");
        assert_eq!(loaded[0].record.as_ref().unwrap(), &r);

        store.delete("t1").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_save_overwrites_by_transaction_identifier() {
        let store = InMemoryRecordStore::new();
        let mut r = record("t1");
        store.save(&r).await.unwrap();
        r.assign_order("ORD1", "$0.99", "F");
        store.save(&r).await.unwrap();

        assert_eq!(store.len().await, 1);
        let loaded = store.load_all().await.unwrap();
        assert_eq!(
            loaded[0].record.as_ref().unwrap().order_number(),
            Some("ORD1")
        );
    }

    #[tokio::test]
    async fn test_load_all_isolates_corrupt_entries() {
        let store = InMemoryRecordStore::new();
        store.save(&record("t1")).await.unwrap();
        store.put_raw("t2", b"{garbage".to_vec()).await;
        store.save(&record("t3")).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded[0].record.is_ok());
        assert!(matches!(loaded[1].record, Err(VerifyError::Decoding(_))));
        assert!(loaded[2].record.is_ok());
    }

    #[tokio::test]
    async fn test_purchase_queue_finish_closes_transaction() {
        let queue = InMemoryPurchaseQueue::with_open(["t1", "t2"]);
        queue.finish_transaction("t1").await.unwrap();

        assert_eq!(queue.open_transactions().await.unwrap(), vec!["t2".to_string()]);
        assert_eq!(queue.finished().await, vec!["t1".to_string()]);
    }
}
