mod dispatcher;
mod error;
mod quiet;
mod sink;

pub use dispatcher::{Dispatcher, Notification, FAILURE_MESSAGE, PRODUCT, SUMMARY_LIMIT};
pub use error::NotifyError;
pub use quiet::{is_quiet, is_quiet_hours};
pub use sink::{HttpSink, NotificationSink};
