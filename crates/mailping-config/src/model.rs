use crate::ConfigError;
use chrono::NaiveTime;
use mailping_core::{AddressPattern, MailboxConfig, QuietHours};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SERVER: &str = "imap.gmail.com";
pub const DEFAULT_PORT: u16 = 993;
pub const DEFAULT_LABEL: &str = "INBOX";
pub const DEFAULT_RINGTONE: &str = "default";
pub const DEFAULT_ENDPOINT: &str = "http://igmail.idemfactor.com/ppush.php";

const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_account: Option<String>,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub operation_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_backoff_secs: Option<u64>,
    pub max_failure_reports: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            operation_timeout_secs: 60,
            max_backoff_secs: None,
            max_failure_reports: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_name: "mailping.sqlite3".to_string(),
        }
    }
}

/// One `[[accounts]]` entry as written on disk. Every field is optional here;
/// [`AccountConfig::resolve`] applies defaults and rejects missing required ones.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ringtone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_summary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_end: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("address", &self.address)
            .field("receipt", &self.receipt.as_ref().map(|_| "[REDACTED]"))
            .field("server", &self.server)
            .field("port", &self.port)
            .field("label", &self.label)
            .field("badge", &self.badge)
            .field("url", &self.url)
            .field("ringtone", &self.ringtone)
            .field("send_summary", &self.send_summary)
            .field("quiet_start", &self.quiet_start)
            .field("quiet_end", &self.quiet_end)
            .field("allow", &self.allow)
            .field("deny", &self.deny)
            .finish()
    }
}

impl AppConfig {
    /// Picks the account named on the command line, then `default_account`,
    /// then the first entry.
    pub fn resolve_mailbox(&self, account: Option<&str>) -> Result<MailboxConfig, ConfigError> {
        let entry = match account.or(self.default_account.as_deref()) {
            Some(address) => self
                .accounts
                .iter()
                .find(|entry| entry.address.as_deref() == Some(address))
                .ok_or_else(|| ConfigError::UnknownAccount(address.to_string()))?,
            None => self
                .accounts
                .first()
                .ok_or(ConfigError::MissingSetting("address"))?,
        };

        entry.resolve()
    }
}

impl AccountConfig {
    pub fn resolve(&self) -> Result<MailboxConfig, ConfigError> {
        let address = self
            .address
            .clone()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingSetting("address"))?;
        let receipt = self
            .receipt
            .clone()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingSetting("receipt"))?;

        let raw_endpoint = self.url.as_deref().unwrap_or(DEFAULT_ENDPOINT);
        let endpoint = Url::parse(raw_endpoint)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ConfigError::InvalidEndpoint(raw_endpoint.to_string()))?;

        let ringtone = match self.ringtone.as_deref() {
            None => Some(DEFAULT_RINGTONE.to_string()),
            Some("") => None,
            Some(value) => Some(value.to_string()),
        };

        let quiet_hours = QuietHours {
            start: self.quiet_start.as_deref().map(parse_time_of_day).transpose()?,
            end: self.quiet_end.as_deref().map(parse_time_of_day).transpose()?,
        };

        Ok(MailboxConfig {
            address,
            server: self
                .server
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            label: self.label.clone().unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            badge: self.badge.unwrap_or(0),
            endpoint,
            receipt,
            ringtone,
            send_summary: self.send_summary.unwrap_or(true),
            quiet_hours,
            allow: compile_patterns(&self.allow)?,
            deny: compile_patterns(&self.deny)?,
        })
    }
}

pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ConfigError::InvalidTime(raw.to_string()))
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<AddressPattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            AddressPattern::compile(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            default_account: None,
            monitor: MonitorConfig::default(),
            storage: StorageConfig::default(),
            accounts: Vec::new(),
        }
    }
}
