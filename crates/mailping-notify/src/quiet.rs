use chrono::NaiveTime;
use mailping_core::QuietHours;

/// Strict on both bounds: `now == start` and `now == end` are not quiet.
/// `start >= end` is a window wrapping midnight.
pub fn is_quiet(now: NaiveTime, start: Option<NaiveTime>, end: Option<NaiveTime>) -> bool {
    let (Some(start), Some(end)) = (start, end) else {
        return false;
    };

    if start < end {
        start < now && now < end
    } else {
        now > start || now < end
    }
}

pub fn is_quiet_hours(window: &QuietHours, now: NaiveTime) -> bool {
    is_quiet(now, window.start, window.end)
}

#[cfg(test)]
mod tests {
    use super::is_quiet;
    use chrono::NaiveTime;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn wrapping_window() {
        let (start, end) = (Some(at(22, 0)), Some(at(6, 0)));
        assert!(is_quiet(at(23, 30), start, end));
        assert!(is_quiet(at(3, 0), start, end));
        assert!(!is_quiet(at(12, 0), start, end));
    }

    #[test]
    fn bounds_are_not_quiet() {
        let (start, end) = (Some(at(22, 0)), Some(at(6, 0)));
        assert!(!is_quiet(at(22, 0), start, end));
        assert!(!is_quiet(at(6, 0), start, end));
    }

    #[test]
    fn same_day_window() {
        let (start, end) = (Some(at(9, 0)), Some(at(17, 0)));
        assert!(is_quiet(at(12, 0), start, end));
        assert!(!is_quiet(at(9, 0), start, end));
        assert!(!is_quiet(at(17, 0), start, end));
        assert!(!is_quiet(at(20, 0), start, end));
    }

    #[test]
    fn unset_bound_is_never_quiet() {
        assert!(!is_quiet(at(23, 0), Some(at(22, 0)), None));
        assert!(!is_quiet(at(23, 0), None, Some(at(6, 0))));
        assert!(!is_quiet(at(23, 0), None, None));
    }

    #[test]
    fn equal_bounds_wrap_whole_day_except_the_instant() {
        let bound = Some(at(8, 0));
        assert!(is_quiet(at(7, 59), bound, bound));
        assert!(is_quiet(at(8, 1), bound, bound));
        assert!(!is_quiet(at(8, 0), bound, bound));
    }
}
