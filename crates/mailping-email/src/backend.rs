use crate::EmailError;
use mailping_core::MailboxConfig;
use rustls_connector::{RustlsConnector, TlsStream};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Header-only fetch: UID plus the two fields the summary needs. `PEEK`
/// leaves `\Seen` untouched.
pub const FETCH_QUERY: &str = "(UID BODY.PEEK[HEADER.FIELDS (SUBJECT FROM)])";

/// An authenticated IMAP session with the watched mailbox already selected.
pub trait MailSession: Send {
    fn noop(&mut self) -> Result<(), EmailError>;

    /// Sequence numbers of unseen messages, ascending.
    fn search_unseen(&mut self) -> Result<Vec<u32>, EmailError>;

    /// Raw untagged response to [`FETCH_QUERY`] for one sequence number.
    fn fetch_headers(&mut self, seq: u32) -> Result<Vec<u8>, EmailError>;

    fn logout(&mut self);
}

/// Opens sessions: TLS connect, login, select.
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn MailSession>, EmailError>;
}

#[derive(Clone)]
pub struct ImapSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub label: String,
    /// Socket connect, read and write timeout. Zero leaves the socket
    /// blocking indefinitely.
    pub timeout: Duration,
}

impl ImapSettings {
    pub fn from_config(config: &MailboxConfig, password: String, timeout: Duration) -> Self {
        Self {
            host: config.server.clone(),
            port: config.port,
            username: config.address.clone(),
            password,
            label: config.label.clone(),
            timeout,
        }
    }
}

impl std::fmt::Debug for ImapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("label", &self.label)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ImapSessionFactory {
    settings: ImapSettings,
}

impl ImapSessionFactory {
    pub fn new(settings: ImapSettings) -> Self {
        Self { settings }
    }
}

impl SessionFactory for ImapSessionFactory {
    fn open(&self) -> Result<Box<dyn MailSession>, EmailError> {
        let settings = &self.settings;
        tracing::info!(host = %settings.host, port = settings.port, "connecting to imap server");

        let stream = connect_tls(&settings.host, settings.port, settings.timeout)?;
        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|err| EmailError::Connect(format!("imap greeting: {err}")))?;

        let mut session = client
            .login(&settings.username, &settings.password)
            .map_err(|err| EmailError::FatalConnection(format!("imap login failed: {}", err.0)))?;
        tracing::debug!(account = %settings.username, "logged in");

        tracing::info!(label = %settings.label, "selecting mailbox");
        session.select(&settings.label).map_err(|err| {
            EmailError::FatalConnection(format!("imap select {} failed: {err}", settings.label))
        })?;

        Ok(Box::new(ImapSession { inner: session }))
    }
}

/// Implicit TLS over a socket whose reads and writes give up after
/// `timeout`, so a silent peer surfaces as an I/O error instead of parking
/// the calling thread.
fn connect_tls(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>, EmailError> {
    let tcp = connect_tcp(host, port, timeout)?;
    let connector = RustlsConnector::new_with_native_certs()
        .map_err(|err| EmailError::Connect(format!("loading native certificates: {err}")))?;
    connector
        .connect(host, tcp)
        .map_err(|err| EmailError::Connect(format!("tls handshake with {host}: {err}")))
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, EmailError> {
    let connect_error = |err: std::io::Error| EmailError::Connect(format!("{host}:{port}: {err}"));

    if timeout.is_zero() {
        return TcpStream::connect((host, port)).map_err(connect_error);
    }

    let mut last_error = None;
    for addr in (host, port).to_socket_addrs().map_err(connect_error)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => {
                tcp.set_read_timeout(Some(timeout)).map_err(connect_error)?;
                tcp.set_write_timeout(Some(timeout)).map_err(connect_error)?;
                return Ok(tcp);
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(match last_error {
        Some(err) => connect_error(err),
        None => EmailError::Connect(format!("{host}:{port}: no addresses resolved")),
    })
}

struct ImapSession {
    inner: imap::Session<TlsStream<TcpStream>>,
}

impl MailSession for ImapSession {
    fn noop(&mut self) -> Result<(), EmailError> {
        self.inner
            .noop()
            .map_err(|err| imap_error_to_email("noop", err))
    }

    fn search_unseen(&mut self) -> Result<Vec<u32>, EmailError> {
        let found = self
            .inner
            .search("UNSEEN")
            .map_err(|err| imap_error_to_email("search", err))?;
        let mut sequence = found.into_iter().collect::<Vec<u32>>();
        sequence.sort_unstable();
        Ok(sequence)
    }

    fn fetch_headers(&mut self, seq: u32) -> Result<Vec<u8>, EmailError> {
        self.inner
            .run_command_and_read_response(format!("FETCH {seq} {FETCH_QUERY}"))
            .map_err(|err| imap_error_to_email("fetch", err))
    }

    fn logout(&mut self) {
        if let Err(err) = self.inner.logout() {
            tracing::debug!(error = %err, "imap logout failed");
        }
    }
}

fn imap_error_to_email(command: &str, error: imap::Error) -> EmailError {
    match error {
        imap::Error::Io(_) | imap::Error::ConnectionLost => {
            EmailError::Session(format!("{command}: {error}"))
        }
        other => EmailError::Protocol(format!("{command}: {other}")),
    }
}
