use crate::{classify, decode_header_block, EmailError, MailSession, Verdict};
use mailping_core::{AddressPattern, MailboxConfig, MessageSummary, ScanResult, Watermark};
use regex::bytes::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn uid_regex() -> &'static Regex {
    static UID: OnceLock<Regex> = OnceLock::new();
    UID.get_or_init(|| Regex::new(r"UID (\d+)").expect("valid uid regex"))
}

fn literal_regex() -> &'static Regex {
    static LITERAL: OnceLock<Regex> = OnceLock::new();
    LITERAL.get_or_init(|| Regex::new(r"\{(\d+)\}\r\n").expect("valid literal regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub uid: u32,
    pub headers: Vec<u8>,
}

/// Pulls the `UID <digits>` token and the header literal out of a raw FETCH
/// response. The UID is only searched for outside the literal so header text
/// cannot be mistaken for it.
pub fn parse_fetch_response(seq: u32, raw: &[u8]) -> Result<FetchedMessage, EmailError> {
    let literal = literal_regex().captures(raw).and_then(|caps| {
        let marker = caps.get(0)?;
        let len = std::str::from_utf8(caps.get(1)?.as_bytes())
            .ok()?
            .parse::<usize>()
            .ok()?;
        let start = marker.end();
        let end = start.saturating_add(len).min(raw.len());
        Some((marker.start(), start, end))
    });

    let (outside_before, outside_after, headers) = match literal {
        Some((marker_start, start, end)) => (&raw[..marker_start], &raw[end..], raw[start..end].to_vec()),
        None => (raw, &raw[raw.len()..], Vec::new()),
    };

    let uid = find_uid(outside_before)
        .or_else(|| find_uid(outside_after))
        .ok_or_else(|| EmailError::Protocol(format!("no UID for message {seq}")))?;

    Ok(FetchedMessage { uid, headers })
}

fn find_uid(text: &[u8]) -> Option<u32> {
    let caps = uid_regex().captures(text)?;
    std::str::from_utf8(caps.get(1)?.as_bytes())
        .ok()?
        .parse()
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub display: String,
    pub address: String,
}

/// `Display Name <addr>` yields the bracketed address and the text before it;
/// anything else is used whole for both.
pub fn parse_sender(value: &str) -> Sender {
    let value = value.trim();
    if let Some(rest) = value.strip_suffix('>') {
        if let Some(open) = rest.rfind('<') {
            let display = rest[..open].trim();
            let address = rest[open + 1..].trim();
            return Sender {
                display: if display.is_empty() { value } else { display }.to_string(),
                address: address.to_string(),
            };
        }
    }

    Sender {
        display: value.to_string(),
        address: value.to_string(),
    }
}

fn summarize(message: &FetchedMessage) -> (MessageSummary, Option<String>) {
    let mut summary = MessageSummary::new(message.uid);
    let mut address = None;

    for (name, value) in decode_header_block(&message.headers) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if name.eq_ignore_ascii_case("From") {
            let sender = parse_sender(value);
            summary.from = sender.display;
            address = Some(sender.address);
        } else if name.eq_ignore_ascii_case("Subject") {
            summary.subject = value.to_string();
        }
    }

    (summary, address)
}

#[derive(Debug, Clone)]
pub struct InboxScanner {
    allow: Vec<AddressPattern>,
    deny: Vec<AddressPattern>,
}

impl InboxScanner {
    pub fn new(config: &MailboxConfig) -> Self {
        Self::with_rules(config.allow.clone(), config.deny.clone())
    }

    pub fn with_rules(allow: Vec<AddressPattern>, deny: Vec<AddressPattern>) -> Self {
        Self { allow, deny }
    }

    /// Collects unseen messages newer than `prior.last_uid` that pass the
    /// sender rules. `new_high_watermark` covers every scanned UID, filtered
    /// or not, and never drops below `prior.last_uid`.
    pub fn scan(
        &self,
        session: &mut dyn MailSession,
        prior: &Watermark,
    ) -> Result<ScanResult, EmailError> {
        let sequence = session.search_unseen()?;
        tracing::debug!(unseen = sequence.len(), "searched unseen messages");

        let mut result = ScanResult {
            unseen_count: u32::try_from(sequence.len()).unwrap_or(u32::MAX),
            notifiable: Vec::new(),
            new_high_watermark: prior.last_uid,
        };

        for seq in sequence {
            let raw = session.fetch_headers(seq)?;
            let fetched = parse_fetch_response(seq, &raw)?;
            result.new_high_watermark = result.new_high_watermark.max(fetched.uid);

            if fetched.uid <= prior.last_uid {
                tracing::debug!(seq, uid = fetched.uid, "skipping already seen message");
                continue;
            }

            let (summary, address) = summarize(&fetched);
            match classify(address.as_deref(), &self.allow, &self.deny) {
                Verdict::Eligible => {
                    tracing::debug!(seq, uid = summary.uid, from = %summary.from, "message is notifiable");
                    result.notifiable.push(summary);
                }
                Verdict::Denied => {
                    tracing::debug!(seq, uid = summary.uid, sender = ?address, "sender deny-listed");
                }
                Verdict::NotAllowed => {
                    tracing::debug!(seq, uid = summary.uid, sender = ?address, "sender not allow-listed");
                }
            }
        }

        tracing::debug!(
            unseen = result.unseen_count,
            notifiable = result.notifiable.len(),
            high_watermark = result.new_high_watermark,
            "scan complete"
        );
        Ok(result)
    }

    /// Distinct sender addresses across all unseen messages, ignoring the
    /// watermark and the sender rules.
    pub fn list_sender_addresses(
        &self,
        session: &mut dyn MailSession,
    ) -> Result<BTreeSet<String>, EmailError> {
        let mut addresses = BTreeSet::new();
        for seq in session.search_unseen()? {
            let raw = session.fetch_headers(seq)?;
            let fetched = parse_fetch_response(seq, &raw)?;
            if let (_, Some(address)) = summarize(&fetched) {
                addresses.insert(address);
            }
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn fetch_response(seq: u32, uid: u32, headers: &str) -> Vec<u8> {
        format!(
            "* {seq} FETCH (UID {uid} BODY[HEADER.FIELDS (SUBJECT FROM)] {{{}}}\r\n{headers})\r\n",
            headers.len()
        )
        .into_bytes()
    }

    #[derive(Default)]
    struct FakeMailbox {
        messages: BTreeMap<u32, Vec<u8>>,
        fail_fetch: bool,
    }

    impl FakeMailbox {
        fn with(messages: &[(u32, &str)]) -> Self {
            let messages = messages
                .iter()
                .enumerate()
                .map(|(index, (uid, headers))| {
                    let seq = index as u32 + 1;
                    (seq, fetch_response(seq, *uid, headers))
                })
                .collect();
            Self {
                messages,
                fail_fetch: false,
            }
        }
    }

    impl MailSession for FakeMailbox {
        fn noop(&mut self) -> Result<(), EmailError> {
            Ok(())
        }

        fn search_unseen(&mut self) -> Result<Vec<u32>, EmailError> {
            Ok(self.messages.keys().copied().collect())
        }

        fn fetch_headers(&mut self, seq: u32) -> Result<Vec<u8>, EmailError> {
            if self.fail_fetch {
                return Err(EmailError::Protocol("NO fetch failed".to_string()));
            }
            self.messages
                .get(&seq)
                .cloned()
                .ok_or_else(|| EmailError::Protocol(format!("no message {seq}")))
        }

        fn logout(&mut self) {}
    }

    fn rules(allow: &[&str], deny: &[&str]) -> InboxScanner {
        let compile = |raw: &[&str]| {
            raw.iter()
                .map(|pattern| AddressPattern::compile(pattern).expect("valid pattern"))
                .collect::<Vec<_>>()
        };
        InboxScanner::with_rules(compile(allow), compile(deny))
    }

    #[test]
    fn extracts_uid_and_headers() {
        let raw = fetch_response(3, 4821, "Subject: hi\r\nFrom: a@b.com\r\n\r\n");
        let fetched = parse_fetch_response(3, &raw).expect("parsed");
        assert_eq!(fetched.uid, 4821);
        assert_eq!(fetched.headers, b"Subject: hi\r\nFrom: a@b.com\r\n\r\n");
    }

    #[test]
    fn uid_after_literal_is_found() {
        let headers = "Subject: UID 7 leaked\r\n\r\n";
        let raw = format!(
            "* 1 FETCH (BODY[HEADER.FIELDS (SUBJECT FROM)] {{{}}}\r\n{headers} UID 99)\r\n",
            headers.len()
        );
        let fetched = parse_fetch_response(1, raw.as_bytes()).expect("parsed");
        assert_eq!(fetched.uid, 99);
    }

    #[test]
    fn missing_uid_is_protocol_error() {
        let raw = b"* 1 FETCH (FLAGS (\\Recent))\r\n";
        assert!(matches!(
            parse_fetch_response(1, raw),
            Err(EmailError::Protocol(_))
        ));
    }

    #[test]
    fn sender_with_display_name() {
        let sender = parse_sender("\"Ann Lee\" <ann@example.com> ");
        assert_eq!(sender.display, "\"Ann Lee\"");
        assert_eq!(sender.address, "ann@example.com");
    }

    #[test]
    fn bare_sender_is_used_whole() {
        let sender = parse_sender("ann@example.com");
        assert_eq!(sender.display, "ann@example.com");
        assert_eq!(sender.address, "ann@example.com");

        let bracketed = parse_sender("<ann@example.com>");
        assert_eq!(bracketed.display, "<ann@example.com>");
        assert_eq!(bracketed.address, "ann@example.com");
    }

    #[test]
    fn skips_messages_at_or_below_watermark() {
        let mut mailbox = FakeMailbox::with(&[
            (99, "Subject: old\r\nFrom: a@x.com\r\n\r\n"),
            (100, "Subject: edge\r\nFrom: a@x.com\r\n\r\n"),
            (101, "Subject: new\r\nFrom: a@x.com\r\n\r\n"),
        ]);
        let prior = Watermark {
            last_uid: 100,
            badge: 0,
        };

        let result = rules(&[], &[]).scan(&mut mailbox, &prior).expect("scan");
        assert_eq!(result.unseen_count, 3);
        assert_eq!(
            result.notifiable.iter().map(|msg| msg.uid).collect::<Vec<_>>(),
            vec![101]
        );
        assert_eq!(result.new_high_watermark, 101);
    }

    #[test]
    fn watermark_never_drops_below_prior() {
        let mut mailbox = FakeMailbox::with(&[(5, "Subject: x\r\n\r\n")]);
        let prior = Watermark {
            last_uid: 40,
            badge: 1,
        };
        let result = rules(&[], &[]).scan(&mut mailbox, &prior).expect("scan");
        assert!(result.notifiable.is_empty());
        assert_eq!(result.new_high_watermark, 40);

        let mut empty = FakeMailbox::default();
        let result = rules(&[], &[]).scan(&mut empty, &prior).expect("scan");
        assert_eq!(result.unseen_count, 0);
        assert_eq!(result.new_high_watermark, 40);
    }

    #[test]
    fn second_scan_with_updated_watermark_is_empty() {
        let mut mailbox = FakeMailbox::with(&[
            (11, "Subject: one\r\nFrom: a@x.com\r\n\r\n"),
            (12, "Subject: two\r\nFrom: b@x.com\r\n\r\n"),
        ]);
        let scanner = rules(&[], &[]);

        let first = scanner
            .scan(&mut mailbox, &Watermark::default())
            .expect("first scan");
        assert_eq!(first.notifiable.len(), 2);

        let updated = Watermark {
            last_uid: first.new_high_watermark,
            badge: first.unseen_count,
        };
        let second = scanner.scan(&mut mailbox, &updated).expect("second scan");
        assert!(second.notifiable.is_empty());
        assert_eq!(second.unseen_count, 2);
        assert_eq!(second.new_high_watermark, first.new_high_watermark);
    }

    #[test]
    fn deny_listed_sender_still_advances_watermark() {
        let mut mailbox = FakeMailbox::with(&[
            (101, "Subject: spam\r\nFrom: Spammer <x@evil.com>\r\n\r\n"),
            (102, "Subject: Lunch\r\nFrom: Ann <ann@example.com>\r\n\r\n"),
        ]);
        let prior = Watermark {
            last_uid: 100,
            badge: 2,
        };

        let result = rules(&[], &["x@.*"])
            .scan(&mut mailbox, &prior)
            .expect("scan");
        assert_eq!(result.unseen_count, 2);
        assert_eq!(result.new_high_watermark, 102);
        assert_eq!(
            result.notifiable,
            vec![MessageSummary {
                uid: 102,
                from: "Ann".to_string(),
                subject: "Lunch".to_string(),
            }]
        );
    }

    #[test]
    fn allow_list_filters_by_bracketed_address() {
        let mut mailbox = FakeMailbox::with(&[
            (1, "From: Boss <boss@corp.com>\r\nSubject: review\r\n\r\n"),
            (2, "From: Other <other@corp.com>\r\nSubject: hi\r\n\r\n"),
            (3, "Subject: anonymous\r\n\r\n"),
        ]);
        let result = rules(&["boss@"], &[])
            .scan(&mut mailbox, &Watermark::default())
            .expect("scan");
        assert_eq!(
            result.notifiable.iter().map(|msg| msg.uid).collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(result.new_high_watermark, 3);
    }

    #[test]
    fn defaults_when_headers_absent() {
        let mut mailbox = FakeMailbox::with(&[(8, "\r\n")]);
        let result = rules(&[], &[])
            .scan(&mut mailbox, &Watermark::default())
            .expect("scan");
        assert_eq!(result.notifiable, vec![MessageSummary::new(8)]);
        assert_eq!(result.notifiable[0].from, "No From");
        assert_eq!(result.notifiable[0].subject, "No Subject");
    }

    #[test]
    fn decodes_encoded_headers() {
        let mut mailbox = FakeMailbox::with(&[(
            4,
            "Subject: =?UTF-8?B?SGVsbG8gV29ybGQ=?=\r\nFrom: =?UTF-8?Q?Jos=C3=A9?= <jose@example.com>\r\n\r\n",
        )]);
        let result = rules(&[], &[])
            .scan(&mut mailbox, &Watermark::default())
            .expect("scan");
        assert_eq!(result.notifiable[0].subject, "Hello World");
        assert_eq!(result.notifiable[0].from, "José");
    }

    #[test]
    fn fetch_failure_ends_scan() {
        let mut mailbox = FakeMailbox::with(&[(1, "Subject: x\r\n\r\n")]);
        mailbox.fail_fetch = true;
        let result = rules(&[], &[]).scan(&mut mailbox, &Watermark::default());
        assert!(matches!(result, Err(EmailError::Protocol(_))));
    }

    #[test]
    fn lists_distinct_sender_addresses() {
        let mut mailbox = FakeMailbox::with(&[
            (1, "From: Ann <ann@example.com>\r\n\r\n"),
            (2, "From: ann@example.com\r\n\r\n"),
            (3, "From: Bob <bob@example.com>\r\n\r\n"),
            (4, "Subject: nobody\r\n\r\n"),
        ]);
        let addresses = rules(&[], &["ann@"])
            .list_sender_addresses(&mut mailbox)
            .expect("list");
        assert_eq!(
            addresses.into_iter().collect::<Vec<_>>(),
            vec!["ann@example.com".to_string(), "bob@example.com".to_string()]
        );
    }
}
