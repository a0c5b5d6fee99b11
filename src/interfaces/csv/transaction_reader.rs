use crate::domain::transaction::PendingTransaction;
use crate::error::{Result, VerifyError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct PendingRow {
    product: String,
    transaction: String,
    date: DateTime<Utc>,
    /// Base64-encoded receipt.
    receipt: String,
}

/// Reads pending transactions from a CSV source.
///
/// Expected columns: `product, transaction, date, receipt`, with the date in
/// RFC 3339 and the receipt base64-encoded.
pub struct TransactionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransactionReader<R> {
    /// Creates a new `TransactionReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads pending transactions.
    pub fn transactions(self) -> impl Iterator<Item = Result<PendingTransaction>> {
        self.reader.into_deserialize().map(|row| {
            let row: PendingRow = row?;
            let receipt = STANDARD
                .decode(row.receipt.as_bytes())
                .map_err(|e| VerifyError::Decoding(format!("receipt: {e}")))?;
            Ok(PendingTransaction::new(
                row.product,
                row.transaction,
                row.date,
                receipt,
            ))
        })
    }
}
