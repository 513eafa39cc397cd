use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification endpoint returned status {0}")]
    Status(reqwest::StatusCode),
}
