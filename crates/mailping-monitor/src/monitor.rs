use crate::MonitorError;
use chrono::{Local, NaiveTime};
use mailping_core::{MailboxConfig, ScanResult, Watermark};
use mailping_email::{ConnectionManager, EmailError, InboxScanner, MailSession, SessionFactory};
use mailping_notify::{Dispatcher, NotificationSink, FAILURE_MESSAGE};
use mailping_storage::WatermarkStore;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    /// Upper bound on one blocking IMAP round (probe, reconnect and command).
    pub operation_timeout: Duration,
    pub max_backoff: Option<Duration>,
    pub max_failure_reports: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(60),
            max_backoff: None,
            max_failure_reports: 1,
        }
    }
}

/// `attempt²` seconds, optionally capped.
pub fn backoff_delay(attempt: u32, max: Option<Duration>) -> Duration {
    let attempt = u64::from(attempt);
    let delay = Duration::from_secs(attempt.saturating_mul(attempt));
    match max {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// Limits failure reports to `limit` per incident. An incident is a run of
/// failed cycles and ends with the next successful one.
#[derive(Debug, Clone, Copy)]
pub struct FailureBudget {
    limit: u32,
    sent: u32,
}

impl FailureBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, sent: 0 }
    }

    pub fn try_spend(&mut self) -> bool {
        if self.sent >= self.limit {
            return false;
        }
        self.sent += 1;
        true
    }

    pub fn reset(&mut self) {
        self.sent = 0;
    }
}

/// One watched mailbox: scan, dispatch, checkpoint, sleep, forever.
pub struct Monitor {
    account: String,
    settings: MonitorSettings,
    factory: Arc<dyn SessionFactory>,
    connection: Option<ConnectionManager>,
    scanner: Arc<InboxScanner>,
    dispatcher: Dispatcher,
    sink: Arc<dyn NotificationSink>,
    store: Arc<dyn WatermarkStore>,
    watermark: Watermark,
    /// `watermark` has moved past what the store holds.
    unsaved: bool,
}

impl Monitor {
    /// Loads the persisted watermark, seeding `{0, config.badge}` for a
    /// mailbox that has never been checkpointed.
    pub async fn new(
        config: &MailboxConfig,
        settings: MonitorSettings,
        factory: Arc<dyn SessionFactory>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn WatermarkStore>,
    ) -> Result<Self, MonitorError> {
        let watermark = match store.load(&config.address).await? {
            Some(watermark) => watermark,
            None => config.initial_watermark(),
        };
        tracing::info!(
            account = %config.address,
            last_uid = watermark.last_uid,
            badge = watermark.badge,
            "loaded watermark"
        );

        Ok(Self {
            account: config.address.clone(),
            settings,
            factory,
            connection: None,
            scanner: Arc::new(InboxScanner::new(config)),
            dispatcher: Dispatcher::new(config),
            sink,
            store,
            watermark,
            unsaved: false,
        })
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Polls until `shutdown` resolves. Errors never end the loop: each one is
    /// logged, reported within the failure budget and followed by a backoff.
    pub async fn run<S>(&mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut retries: u32 = 0;
        let mut budget = FailureBudget::new(self.settings.max_failure_reports);
        tracing::info!(account = %self.account, "monitoring mailbox");

        loop {
            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run_cycle() => outcome,
            };

            let delay = match outcome {
                Ok(()) => {
                    if retries > 0 {
                        tracing::info!(attempts = retries, "monitoring recovered");
                    }
                    retries = 0;
                    budget.reset();
                    self.settings.poll_interval
                }
                Err(err) => {
                    retries = retries.saturating_add(1);
                    tracing::error!(
                        critical = true,
                        account = %self.account,
                        attempt = retries,
                        "monitor cycle failed: {err}"
                    );
                    if budget.try_spend() {
                        self.report_failure().await;
                    }
                    let delay = backoff_delay(retries, self.settings.max_backoff);
                    tracing::info!(delay_secs = delay.as_secs(), "backing off");
                    delay
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(account = %self.account, "monitor stopping");
        self.close().await;
    }

    /// One scan, dispatch and checkpoint, in that order. The checkpoint is
    /// only written once dispatch has been attempted, so a crash in between
    /// re-notifies on restart rather than dropping the message. The in-memory
    /// watermark advances before the save, so a failed save is retried by a
    /// later cycle without dispatching the same messages again.
    pub async fn run_cycle(&mut self) -> Result<(), MonitorError> {
        let scan = self.scan().await?;
        let next = self.settle(&scan, Local::now().time()).await;
        if next != self.watermark {
            self.watermark = next;
            self.unsaved = true;
        }
        self.checkpoint().await
    }

    pub async fn list_addresses(&mut self) -> Result<BTreeSet<String>, MonitorError> {
        let scanner = Arc::clone(&self.scanner);
        self.with_connection(move |session| scanner.list_sender_addresses(session))
            .await
    }

    /// Logs out of the current session, if any.
    pub async fn close(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let task = tokio::task::spawn_blocking(move || connection.close());
        if tokio::time::timeout(self.settings.operation_timeout, task)
            .await
            .is_err()
        {
            tracing::debug!("imap logout timed out");
        }
    }

    async fn scan(&mut self) -> Result<ScanResult, MonitorError> {
        let prior = self.watermark;
        let scanner = Arc::clone(&self.scanner);
        self.with_connection(move |session| scanner.scan(session, &prior))
            .await
    }

    /// Dispatches the scan and returns the watermark to persist. The badge
    /// only moves when delivery succeeded, so a failed push is retried by the
    /// next cycle; `last_uid` moves regardless.
    async fn settle(&self, scan: &ScanResult, now: NaiveTime) -> Watermark {
        let mut next = Watermark {
            last_uid: self.watermark.last_uid.max(scan.new_high_watermark),
            badge: self.watermark.badge,
        };

        if let Some(notification) = self.dispatcher.dispatch(scan, self.watermark.badge, now) {
            match self
                .dispatcher
                .deliver(self.sink.as_ref(), &notification)
                .await
            {
                Ok(()) => next.badge = scan.unseen_count,
                Err(err) => {
                    tracing::warn!(account = %self.account, "notification delivery failed: {err}");
                }
            }
        }

        next
    }

    async fn checkpoint(&mut self) -> Result<(), MonitorError> {
        if !self.unsaved {
            return Ok(());
        }
        self.store.save(&self.account, &self.watermark).await?;
        tracing::debug!(
            last_uid = self.watermark.last_uid,
            badge = self.watermark.badge,
            "watermark saved"
        );
        self.unsaved = false;
        Ok(())
    }

    async fn report_failure(&self) {
        let notification = self.dispatcher.failure(FAILURE_MESSAGE);
        if let Err(err) = self
            .dispatcher
            .deliver(self.sink.as_ref(), &notification)
            .await
        {
            tracing::warn!("failure report not delivered: {err}");
        }
    }

    /// Runs `op` against a live session on the blocking pool. When the
    /// timeout fires the session is abandoned with its worker thread and the
    /// next call starts from a fresh connection.
    async fn with_connection<T, F>(&mut self, op: F) -> Result<T, MonitorError>
    where
        T: Send + 'static,
        F: FnMut(&mut dyn MailSession) -> Result<T, EmailError> + Send + 'static,
    {
        let mut connection = self
            .connection
            .take()
            .unwrap_or_else(|| ConnectionManager::new(Arc::clone(&self.factory)));

        let task = tokio::task::spawn_blocking(move || {
            let result = connection.with_session(op);
            (connection, result)
        });

        match tokio::time::timeout(self.settings.operation_timeout, task).await {
            Ok(Ok((connection, result))) => {
                self.connection = Some(connection);
                Ok(result?)
            }
            Ok(Err(err)) => Err(MonitorError::Worker(err.to_string())),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.settings.operation_timeout.as_secs(),
                    "imap operation timed out, dropping connection"
                );
                Err(MonitorError::Timeout(self.settings.operation_timeout))
            }
        }
    }
}
