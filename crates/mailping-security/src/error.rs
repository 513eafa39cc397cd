use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("no IMAP password for {0}: set MAILPING_PASSWORD or store it in the keychain")]
    MissingSecret(String),
}
