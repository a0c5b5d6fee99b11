use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerifyError>;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Decoding error: {0}")]
    Decoding(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Internal error: {0}")]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Failure of a remote order or validation call.
///
/// Every variant is transient from the task's point of view and ends up as a
/// `*Failed` outcome on the result channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,
    #[error("connectivity failure: {0}")]
    Connectivity(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}
