use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use receipt_verifier::application::coordinator::TaskCoordinator;
use receipt_verifier::config::VerifierConfig;
use receipt_verifier::domain::anomaly::TracingAnomalySink;
use receipt_verifier::domain::ports::{RecordStore, RecordStoreBox};
use receipt_verifier::domain::record::TransactionRecord;
use receipt_verifier::infrastructure::in_memory::{InMemoryPurchaseQueue, InMemoryRecordStore};
use receipt_verifier::infrastructure::offline::OfflineReceiptService;
#[cfg(feature = "storage-rocksdb")]
use receipt_verifier::infrastructure::rocksdb::RocksDBStore;
use receipt_verifier::interfaces::csv::record_writer::RecordWriter;
use receipt_verifier::interfaces::csv::transaction_reader::TransactionReader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// JSON configuration file. Environment variables still override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record pending transactions from a CSV file and print the stored records
    Import {
        /// CSV with columns product, transaction, date, receipt
        input: PathBuf,
    },
    /// Run verification tasks for the transactions in a CSV file and print the stored records.
    ///
    /// No receipt service transport is built in, so every request fails and
    /// tasks retry until the configured budget is spent.
    Verify {
        /// CSV with columns product, transaction, date, receipt
        input: PathBuf,
    },
    /// Print every stored record as CSV
    List,
    /// Remove validated records whose platform transaction is no longer open
    Reconcile {
        /// Transaction identifiers the platform still lists as open
        #[arg(long = "open", value_delimiter = ',')]
        open: Vec<String>,
    },
}

fn open_store(db_path: Option<PathBuf>) -> Result<RecordStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryRecordStore::new()))
        }
        None => Ok(Box::new(InMemoryRecordStore::new())),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<VerifierConfig> {
    let config = match path {
        Some(path) => VerifierConfig::from_file(path).into_diagnostic()?,
        None => VerifierConfig::default(),
    };
    config.with_env_overrides().into_diagnostic()
}

/// Decodable records keyed by transaction identifier; unreadable entries are logged.
async fn stored_records(store: &dyn RecordStore) -> Result<BTreeMap<String, TransactionRecord>> {
    let mut records = BTreeMap::new();
    for entry in store.load_all().await.into_diagnostic()? {
        match entry.record {
            Ok(record) => {
                records.insert(entry.key, record);
            }
            Err(e) => error!(key = %entry.key, "Error reading record: {}", e),
        }
    }
    Ok(records)
}

fn print_records<'a>(records: impl IntoIterator<Item = &'a TransactionRecord>) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = RecordWriter::new(stdout.lock());
    writer.write_records(records).into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let store = open_store(cli.db_path)?;

    match cli.command {
        Command::Import { input } => {
            let mut records = stored_records(store.as_ref()).await?;
            let file = File::open(input).into_diagnostic()?;
            let reader = TransactionReader::new(file);
            for pending in reader.transactions() {
                let record = match pending.and_then(|p| p.to_record()) {
                    Ok(record) => record,
                    Err(e) => {
                        error!("Error reading transaction: {}", e);
                        continue;
                    }
                };
                if records.contains_key(record.transaction_identifier()) {
                    info!(
                        transaction = record.transaction_identifier(),
                        "transaction already recorded"
                    );
                    continue;
                }
                store.save(&record).await.into_diagnostic()?;
                records.insert(record.transaction_identifier().to_string(), record);
            }
            print_records(records.values())
        }
        Command::Verify { input } => {
            let file = File::open(input).into_diagnostic()?;
            let mut pending = Vec::new();
            for transaction in TransactionReader::new(file).transactions() {
                match transaction {
                    Ok(transaction) => pending.push(transaction),
                    Err(e) => error!("Error reading transaction: {}", e),
                }
            }

            let queue = InMemoryPurchaseQueue::with_open(
                pending.iter().map(|p| p.transaction_identifier.clone()),
            );
            let mut coordinator = TaskCoordinator::new(
                store,
                Arc::new(OfflineReceiptService),
                Box::new(queue),
                config,
                Arc::new(TracingAnomalySink),
            );
            coordinator.load().await.into_diagnostic()?;
            for transaction in pending {
                let tx_id = transaction.transaction_identifier.clone();
                match coordinator.observe(transaction).await {
                    Ok(outcome) => info!(transaction = %tx_id, ?outcome, "task started"),
                    Err(e) => error!(transaction = %tx_id, "Error starting task: {}", e),
                }
            }
            let dispositions = coordinator.run_until_idle().await.into_diagnostic()?;
            info!(events = dispositions.len(), "verification idle");
            print_records(&coordinator.records().await)
        }
        Command::List => {
            let records = stored_records(store.as_ref()).await?;
            print_records(records.values())
        }
        Command::Reconcile { open } => {
            let mut coordinator = TaskCoordinator::new(
                store,
                Arc::new(OfflineReceiptService),
                Box::new(InMemoryPurchaseQueue::with_open(open)),
                config,
                Arc::new(TracingAnomalySink),
            );
            let report = coordinator.load().await.into_diagnostic()?;
            if !report.rejected.is_empty() {
                warn!(rejected = ?report.rejected, "some records could not be read");
            }
            let removed = coordinator.reconcile().await.into_diagnostic()?;
            println!("removed {removed} of {} records", report.loaded);
            Ok(())
        }
    }
}
