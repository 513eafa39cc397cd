use crate::{is_quiet_hours, NotificationSink, NotifyError};
use chrono::NaiveTime;
use mailping_core::{MailboxConfig, QuietHours, ScanResult};

pub const PRODUCT: &str = "iGmail";
pub const FAILURE_MESSAGE: &str = "Unable to monitor inbox";
pub const SUMMARY_LIMIT: usize = 180;

/// Payload posted to the push endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Notification {
    pub email: String,
    pub txid: String,
    pub badge: Option<u32>,
    pub msg: Option<String>,
    pub ringtone: Option<String>,
}

impl Notification {
    pub fn form_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("email", self.email.clone()),
            ("txid", self.txid.clone()),
            ("igmail", PRODUCT.to_string()),
        ];
        if let Some(badge) = self.badge {
            pairs.push(("badge", badge.to_string()));
        }
        if let Some(msg) = &self.msg {
            pairs.push(("msg", msg.clone()));
        }
        if let Some(ringtone) = &self.ringtone {
            pairs.push(("ringtone", ringtone.clone()));
        }
        pairs
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("email", &self.email)
            .field("txid", &"[REDACTED]")
            .field("badge", &self.badge)
            .field("msg", &self.msg)
            .field("ringtone", &self.ringtone)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    address: String,
    receipt: String,
    ringtone: Option<String>,
    send_summary: bool,
    quiet_hours: QuietHours,
}

impl Dispatcher {
    pub fn new(config: &MailboxConfig) -> Self {
        Self {
            address: config.address.clone(),
            receipt: config.receipt.clone(),
            ringtone: config.ringtone.clone(),
            send_summary: config.send_summary,
            quiet_hours: config.quiet_hours,
        }
    }

    /// Decides what, if anything, a scan should push. Nothing when the unseen
    /// count equals `prior_badge`; otherwise a badge update, plus a summary of
    /// the first notifiable message when summaries are enabled and `now` is
    /// outside quiet hours.
    pub fn dispatch(
        &self,
        scan: &ScanResult,
        prior_badge: u32,
        now: NaiveTime,
    ) -> Option<Notification> {
        if scan.unseen_count == prior_badge {
            tracing::debug!(badge = prior_badge, "nothing to push");
            return None;
        }

        let mut notification = self.base();
        notification.badge = Some(scan.unseen_count);

        let quiet = is_quiet_hours(&self.quiet_hours, now);
        if quiet {
            tracing::debug!("squelching summary during quiet hours");
        }

        if let Some(first) = scan.notifiable.first() {
            if !quiet && self.send_summary {
                let summary = format!("From: {}||Subject: {}", first.from, first.subject);
                notification.msg = Some(summary.chars().take(SUMMARY_LIMIT).collect());
                notification.ringtone = self.ringtone.clone();
            }
        }

        Some(notification)
    }

    /// Failure reports ignore quiet hours and carry no badge.
    pub fn failure(&self, message: &str) -> Notification {
        let mut notification = self.base();
        notification.msg = Some(message.to_string());
        notification
    }

    /// A non-empty diagnostic from the sink is logged, not treated as an error.
    pub async fn deliver(
        &self,
        sink: &dyn NotificationSink,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            badge = ?notification.badge,
            summary = notification.msg.is_some(),
            "pushing notification"
        );
        let diagnostic = sink.send(notification).await?;
        if !diagnostic.trim().is_empty() {
            tracing::warn!(response = %diagnostic.trim(), "notification endpoint replied");
        }
        Ok(())
    }

    fn base(&self) -> Notification {
        Notification {
            email: self.address.clone(),
            txid: self.receipt.clone(),
            badge: None,
            msg: None,
            ringtone: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mailping_core::{AddressPattern, MessageSummary};
    use std::sync::Mutex;
    use url::Url;

    fn config() -> MailboxConfig {
        MailboxConfig {
            address: "me@example.com".to_string(),
            server: "imap.example.com".to_string(),
            port: 993,
            label: "INBOX".to_string(),
            badge: 0,
            endpoint: Url::parse("http://push.example.com/ppush.php").expect("url"),
            receipt: "TX-1".to_string(),
            ringtone: Some("default".to_string()),
            send_summary: true,
            quiet_hours: QuietHours {
                start: NaiveTime::from_hms_opt(22, 0, 0),
                end: NaiveTime::from_hms_opt(6, 0, 0),
            },
            allow: Vec::<AddressPattern>::new(),
            deny: Vec::new(),
        }
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).expect("time")
    }

    fn scan(unseen_count: u32, notifiable: Vec<MessageSummary>) -> ScanResult {
        ScanResult {
            unseen_count,
            new_high_watermark: notifiable.iter().map(|msg| msg.uid).max().unwrap_or(0),
            notifiable,
        }
    }

    fn message(uid: u32, from: &str, subject: &str) -> MessageSummary {
        MessageSummary {
            uid,
            from: from.to_string(),
            subject: subject.to_string(),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
        reply: String,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, notification: &Notification) -> Result<String, NotifyError> {
            self.sent.lock().expect("lock").push(notification.clone());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn unchanged_badge_is_a_no_op() {
        let dispatcher = Dispatcher::new(&config());
        let result = scan(2, vec![message(5, "Ann", "hi")]);
        assert_eq!(dispatcher.dispatch(&result, 2, noon()), None);
    }

    #[test]
    fn badge_and_summary_from_first_message() {
        let dispatcher = Dispatcher::new(&config());
        let result = scan(3, vec![message(7, "Ann", "Lunch"), message(8, "Bob", "Later")]);
        let notification = dispatcher.dispatch(&result, 1, noon()).expect("notification");
        assert_eq!(notification.badge, Some(3));
        assert_eq!(notification.msg.as_deref(), Some("From: Ann||Subject: Lunch"));
        assert_eq!(notification.ringtone.as_deref(), Some("default"));
        assert_eq!(notification.email, "me@example.com");
        assert_eq!(notification.txid, "TX-1");
    }

    #[test]
    fn badge_only_when_nothing_notifiable() {
        let dispatcher = Dispatcher::new(&config());
        let notification = dispatcher
            .dispatch(&scan(0, Vec::new()), 4, noon())
            .expect("badge reset");
        assert_eq!(notification.badge, Some(0));
        assert_eq!(notification.msg, None);
        assert_eq!(notification.ringtone, None);
    }

    #[test]
    fn quiet_hours_suppress_summary_not_badge() {
        let dispatcher = Dispatcher::new(&config());
        let late = NaiveTime::from_hms_opt(23, 30, 0).expect("time");
        let notification = dispatcher
            .dispatch(&scan(1, vec![message(9, "Ann", "hi")]), 0, late)
            .expect("notification");
        assert_eq!(notification.badge, Some(1));
        assert_eq!(notification.msg, None);
    }

    #[test]
    fn disabled_summaries_send_badge_only() {
        let mut config = config();
        config.send_summary = false;
        let dispatcher = Dispatcher::new(&config);
        let notification = dispatcher
            .dispatch(&scan(1, vec![message(9, "Ann", "hi")]), 0, noon())
            .expect("notification");
        assert_eq!(notification.msg, None);
    }

    #[test]
    fn summary_is_truncated_to_limit() {
        let dispatcher = Dispatcher::new(&config());
        let subject = "é".repeat(300);
        let notification = dispatcher
            .dispatch(&scan(1, vec![message(9, "Ann", &subject)]), 0, noon())
            .expect("notification");
        let msg = notification.msg.expect("summary");
        assert_eq!(msg.chars().count(), SUMMARY_LIMIT);
        assert!(msg.starts_with("From: Ann||Subject: é"));
    }

    #[test]
    fn failure_report_ignores_quiet_hours() {
        let dispatcher = Dispatcher::new(&config());
        let notification = dispatcher.failure(FAILURE_MESSAGE);
        assert_eq!(notification.msg.as_deref(), Some(FAILURE_MESSAGE));
        assert_eq!(notification.badge, None);
    }

    #[test]
    fn form_pairs_use_wire_names() {
        let notification = Notification {
            email: "me@example.com".to_string(),
            txid: "TX-1".to_string(),
            badge: Some(2),
            msg: Some("From: Ann||Subject: hi".to_string()),
            ringtone: Some("bell".to_string()),
        };
        let keys = notification
            .form_pairs()
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["email", "txid", "igmail", "badge", "msg", "ringtone"]);
        assert!(!format!("{notification:?}").contains("TX-1"));
    }

    #[tokio::test]
    async fn deliver_calls_sink_once() {
        let dispatcher = Dispatcher::new(&config());
        let sink = RecordingSink {
            reply: "invalid receipt".to_string(),
            ..RecordingSink::default()
        };
        let notification = dispatcher.failure(FAILURE_MESSAGE);
        dispatcher
            .deliver(&sink, &notification)
            .await
            .expect("diagnostic is not an error");
        assert_eq!(sink.sent.lock().expect("lock").len(), 1);
    }
}
