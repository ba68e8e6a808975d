use chrono::{DateTime, Duration, Utc};

pub fn now_ts() -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

pub fn millis(ms: u64) -> Duration {
    Duration::milliseconds(ms.min(i64::MAX as u64) as i64)
}

pub fn secs(s: u64) -> Duration {
    millis(s.saturating_mul(1000))
}

/// Next "not before" time for a throttle measured from `now`, so drift is absorbed.
/// Saturates at the latest representable time instead of overflowing.
pub fn next_due(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    now.checked_add_signed(period).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn next_due_saturates_on_huge_periods() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
        assert_eq!(next_due(now, secs(2)), now + Duration::seconds(2));
        assert_eq!(next_due(now, secs(u64::MAX)), DateTime::<Utc>::MAX_UTC);
        assert_eq!(next_due(now, millis(u64::MAX)), DateTime::<Utc>::MAX_UTC);
    }
}
