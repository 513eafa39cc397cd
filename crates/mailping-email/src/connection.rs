use crate::{EmailError, MailSession, SessionFactory};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    Unconnected,
    Connected,
    Broken,
}

/// Owns the IMAP session and hands out a live one per call.
///
/// Each [`ConnectionManager::with_session`] call reconnects at most once:
/// either because the liveness probe failed, or because the operation hit a
/// session error on a session that was not freshly re-established.
pub struct ConnectionManager {
    factory: Arc<dyn SessionFactory>,
    session: Option<Box<dyn MailSession>>,
    health: ConnectionHealth,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            session: None,
            health: ConnectionHealth::Unconnected,
        }
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health
    }

    pub fn with_session<T, F>(&mut self, mut op: F) -> Result<T, EmailError>
    where
        F: FnMut(&mut dyn MailSession) -> Result<T, EmailError>,
    {
        let mut reconnected = false;

        if let Some(session) = self.session.as_mut() {
            if let Err(err) = session.noop() {
                tracing::info!(error = %err, "imap session probe failed, reconnecting");
                self.mark_broken();
                reconnected = true;
            }
        }

        if self.session.is_none() {
            self.connect()?;
        }

        match self.run(&mut op) {
            Ok(value) => Ok(value),
            Err(err) if err.is_session_error() && !reconnected => {
                tracing::info!(error = %err, "imap session dropped mid-command, retrying once");
                self.mark_broken();
                self.connect()?;
                self.run(&mut op).inspect_err(|err| {
                    if err.is_session_error() {
                        self.mark_broken();
                    }
                })
            }
            Err(err) => {
                if err.is_session_error() {
                    self.mark_broken();
                }
                Err(err)
            }
        }
    }

    /// Logs out and forgets the session.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.logout();
        }
        self.health = ConnectionHealth::Unconnected;
    }

    fn connect(&mut self) -> Result<(), EmailError> {
        match self.factory.open() {
            Ok(session) => {
                self.session = Some(session);
                self.health = ConnectionHealth::Connected;
                Ok(())
            }
            Err(err) => {
                self.session = None;
                self.health = ConnectionHealth::Unconnected;
                Err(err)
            }
        }
    }

    fn mark_broken(&mut self) {
        self.session = None;
        self.health = ConnectionHealth::Broken;
    }

    fn run<T, F>(&mut self, op: &mut F) -> Result<T, EmailError>
    where
        F: FnMut(&mut dyn MailSession) -> Result<T, EmailError>,
    {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EmailError::Session("no open session".to_string()))?;
        op(session.as_mut())
    }
}
