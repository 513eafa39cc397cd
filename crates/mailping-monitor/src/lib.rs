mod error;
mod monitor;

pub use error::MonitorError;
pub use monitor::{backoff_delay, FailureBudget, Monitor, MonitorSettings};
