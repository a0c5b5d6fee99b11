use crate::domain::record::TransactionRecord;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct RecordRow<'a> {
    product: &'a str,
    transaction: &'a str,
    date: String,
    order_number: &'a str,
    price_tag: &'a str,
    fingerprint: &'a str,
    attempts: u32,
    validated: bool,
}

impl<'a> From<&'a TransactionRecord> for RecordRow<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        Self {
            product: record.product_identifier(),
            transaction: record.transaction_identifier(),
            date: record.transaction_date().to_rfc3339(),
            order_number: record.order_number().unwrap_or_default(),
            price_tag: record.price_tag().unwrap_or_default(),
            fingerprint: record.receipt_fingerprint().unwrap_or_default(),
            attempts: record.verification_attempt_count(),
            validated: record.is_validated_by_service(),
        }
    }
}

/// Writes transaction records as CSV, one row per record.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the records sorted by transaction date and flushes.
    ///
    /// The header row is written even when there are no records.
    pub fn write_records<'a, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a TransactionRecord>,
    {
        let mut records: Vec<&TransactionRecord> = records.into_iter().collect();
        records.sort_by(|a, b| {
            a.transaction_date()
                .cmp(&b.transaction_date())
                .then_with(|| a.transaction_identifier().cmp(b.transaction_identifier()))
        });

        if records.is_empty() {
            self.writer.write_record([
                "product",
                "transaction",
                "date",
                "order_number",
                "price_tag",
                "fingerprint",
                "attempts",
                "validated",
            ])?;
        }
        for record in records {
            self.writer.serialize(RecordRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
