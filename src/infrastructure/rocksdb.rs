use crate::domain::ports::{LoadedRecord, RecordStore};
use crate::domain::record::TransactionRecord;
use crate::error::{Result, VerifyError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding encoded transaction records keyed by transaction identifier.
pub const CF_RECORDS: &str = "records";

impl From<rocksdb::Error> for VerifyError {
    fn from(e: rocksdb::Error) -> Self {
        VerifyError::StorageError(e.into_string())
    }
}

/// A persistent record store implementation using RocksDB.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "records" column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_records = ColumnFamilyDescriptor::new(CF_RECORDS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_records])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn records_cf(&self) -> Result<&ColumnFamily> {
        self.db.cf_handle(CF_RECORDS).ok_or_else(|| {
            VerifyError::InternalError(Box::new(std::io::Error::other(
                "Records column family not found",
            )))
        })
    }

    /// Writes raw bytes under `key`, bypassing encoding.
    pub fn put_raw(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let cf = self.records_cf()?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RocksDBStore {
    async fn save(&self, record: &TransactionRecord) -> Result<()> {
        let cf = self.records_cf()?;
        let value = record.encode()?;
        self.db
            .put_cf(cf, record.transaction_identifier().as_bytes(), value)?;
        Ok(())
    }

    async fn delete(&self, transaction_identifier: &str) -> Result<()> {
        let cf = self.records_cf()?;
        self.db.delete_cf(cf, transaction_identifier.as_bytes())?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<LoadedRecord>> {
        let cf = self.records_cf()?;
        let mut records = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            records.push(LoadedRecord {
                key: String::from_utf8_lossy(&key).into_owned(),
                record: TransactionRecord::decode(&value),
            });
        }

        Ok(records)
    }
}
