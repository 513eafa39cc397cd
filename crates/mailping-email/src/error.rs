use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("imap connect error: {0}")]
    Connect(String),
    #[error("fatal connection error: {0}")]
    FatalConnection(String),
    #[error("imap session error: {0}")]
    Session(String),
    #[error("imap protocol error: {0}")]
    Protocol(String),
}

impl EmailError {
    /// The transport is gone and a fresh connection may succeed.
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}
