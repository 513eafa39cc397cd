use mailping_core::AddressPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Denied,
    NotAllowed,
}

/// Deny patterns are checked first. A non-empty allow list then admits only
/// addresses matching one of its patterns. A missing address is tested as the
/// empty string against the deny list and never satisfies the allow list.
pub fn classify(address: Option<&str>, allow: &[AddressPattern], deny: &[AddressPattern]) -> Verdict {
    let candidate = address.unwrap_or_default();
    if deny.iter().any(|pattern| pattern.matches(candidate)) {
        return Verdict::Denied;
    }

    if allow.is_empty() {
        return Verdict::Eligible;
    }

    match address {
        Some(address) if allow.iter().any(|pattern| pattern.matches(address)) => Verdict::Eligible,
        _ => Verdict::NotAllowed,
    }
}

pub fn is_eligible(address: Option<&str>, allow: &[AddressPattern], deny: &[AddressPattern]) -> bool {
    classify(address, allow, deny) == Verdict::Eligible
}
