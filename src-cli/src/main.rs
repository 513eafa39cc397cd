mod cli;

use anyhow::{Context, Result};
use cli::Cli;
use mailping_config::{ConfigManager, MonitorConfig};
use mailping_email::{ImapSessionFactory, ImapSettings};
use mailping_monitor::{Monitor, MonitorSettings};
use mailping_notify::HttpSink;
use mailping_security::SecretStore;
use mailping_storage::SqliteWatermarkStore;
use std::future::Future;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const KEYCHAIN_SERVICE: &str = "io.mailping.daemon";

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// What setup left to do once it finished.
enum Mode {
    Listed,
    Watch(Monitor),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::parse_or_exit_code() {
        Ok(cli) => cli,
        Err(code) => return code,
    };
    init_tracing(cli.log_level());

    // One listener covers setup and the monitor loop, so Ctrl-C always
    // exits through here with status 1.
    let interrupt = interrupted();
    tokio::pin!(interrupt);

    let mode = match until_interrupted(prepare(cli), interrupt.as_mut()).await {
        Some(Ok(mode)) => mode,
        Some(Err(err)) => {
            tracing::error!("{err:#}");
            return ExitCode::FAILURE;
        }
        None => {
            tracing::warn!("interrupted");
            return ExitCode::FAILURE;
        }
    };

    match mode {
        Mode::Listed => ExitCode::SUCCESS,
        Mode::Watch(mut monitor) => {
            monitor.run(interrupt).await;
            tracing::warn!("interrupted");
            ExitCode::FAILURE
        }
    }
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

/// `None` when `interrupt` resolves before `work` does.
async fn until_interrupted<T, W, I>(work: W, interrupt: I) -> Option<T>
where
    W: Future<Output = T>,
    I: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = interrupt => None,
        value = work => Some(value),
    }
}

async fn prepare(cli: Cli) -> Result<Mode> {
    let manager = ConfigManager::new(cli.config.clone())?;
    let config = manager
        .load()
        .with_context(|| format!("failed to load {}", manager.config_path().display()))?;
    let mailbox = config.resolve_mailbox(cli.account.as_deref())?;
    tracing::debug!(?mailbox, "resolved mailbox");

    let settings = monitor_settings(&config.monitor);
    let password = SecretStore::new(KEYCHAIN_SERVICE)
        .imap_password(&mailbox.address)
        .context("no imap password available")?;
    let factory = Arc::new(ImapSessionFactory::new(ImapSettings::from_config(
        &mailbox,
        password,
        settings.operation_timeout,
    )));

    let db_path = manager.data_dir().join(&config.storage.file_name);
    let store = Arc::new(
        SqliteWatermarkStore::connect(&db_path)
            .await
            .with_context(|| format!("failed to open {}", db_path.display()))?,
    );

    let sink = Arc::new(HttpSink::new(
        mailbox.endpoint.clone(),
        settings.operation_timeout,
    )?);
    let mut monitor = Monitor::new(&mailbox, settings, factory, sink, store).await?;

    if cli.list_addresses {
        let addresses = monitor.list_addresses().await;
        monitor.close().await;
        let mut stdout = std::io::stdout().lock();
        for address in addresses? {
            writeln!(stdout, "{address}")?;
        }
        return Ok(Mode::Listed);
    }

    Ok(Mode::Watch(monitor))
}

fn monitor_settings(config: &MonitorConfig) -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_secs(config.poll_interval_secs),
        operation_timeout: Duration::from_secs(config.operation_timeout_secs),
        max_backoff: config.max_backoff_secs.map(Duration::from_secs),
        max_failure_reports: config.max_failure_reports,
    }
}
