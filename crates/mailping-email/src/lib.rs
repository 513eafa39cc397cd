mod backend;
mod classify;
mod connection;
mod error;
mod header;
mod scanner;

pub use backend::{ImapSessionFactory, ImapSettings, MailSession, SessionFactory, FETCH_QUERY};
pub use classify::{classify, is_eligible, Verdict};
pub use connection::{ConnectionHealth, ConnectionManager};
pub use error::EmailError;
pub use header::{decode_header_block, decode_header_line};
pub use scanner::{parse_fetch_response, parse_sender, FetchedMessage, InboxScanner, Sender};
