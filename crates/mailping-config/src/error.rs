use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to resolve app directories")]
    MissingDirectories,
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("toml serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("{0} is required in the account configuration")]
    MissingSetting(&'static str),
    #[error("no account configured for {0}")]
    UnknownAccount(String),
    #[error("invalid address pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid time of day {0:?}")]
    InvalidTime(String),
    #[error("invalid notification endpoint {0:?}")]
    InvalidEndpoint(String),
}
