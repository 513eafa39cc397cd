use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

pub const NO_FROM: &str = "No From";
pub const NO_SUBJECT: &str = "No Subject";

/// Dedup checkpoint for one mailbox.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Watermark {
    pub last_uid: u32,
    pub badge: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageSummary {
    pub uid: u32,
    pub from: String,
    pub subject: String,
}

impl MessageSummary {
    pub fn new(uid: u32) -> Self {
        Self {
            uid,
            from: NO_FROM.to_string(),
            subject: NO_SUBJECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub unseen_count: u32,
    pub notifiable: Vec<MessageSummary>,
    pub new_high_watermark: u32,
}

/// Time-of-day window during which summaries are withheld. Both bounds must be
/// set for the window to have any effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuietHours {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

/// Sender pattern anchored at the start of the address.
#[derive(Clone)]
pub struct AddressPattern {
    source: String,
    regex: Regex,
}

impl AddressPattern {
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})"))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn matches(&self, address: &str) -> bool {
        self.regex.is_match(address)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for AddressPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AddressPattern").field(&self.source).finish()
    }
}

/// Immutable settings for one watched mailbox, resolved once at startup.
#[derive(Clone)]
pub struct MailboxConfig {
    pub address: String,
    pub server: String,
    pub port: u16,
    pub label: String,
    /// Seed badge used when no watermark has been persisted yet.
    pub badge: u32,
    pub endpoint: Url,
    pub receipt: String,
    pub ringtone: Option<String>,
    pub send_summary: bool,
    pub quiet_hours: QuietHours,
    pub allow: Vec<AddressPattern>,
    pub deny: Vec<AddressPattern>,
}

impl MailboxConfig {
    pub fn initial_watermark(&self) -> Watermark {
        Watermark {
            last_uid: 0,
            badge: self.badge,
        }
    }
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("address", &self.address)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("label", &self.label)
            .field("badge", &self.badge)
            .field("endpoint", &self.endpoint.as_str())
            .field("receipt", &"[REDACTED]")
            .field("ringtone", &self.ringtone)
            .field("send_summary", &self.send_summary)
            .field("quiet_hours", &self.quiet_hours)
            .field("allow", &self.allow)
            .field("deny", &self.deny)
            .finish()
    }
}
