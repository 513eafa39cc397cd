use mailping_email::EmailError;
use mailping_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("imap operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("imap worker failed: {0}")]
    Worker(String),
}
