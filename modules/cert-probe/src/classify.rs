use certmon_core::AlertLevel;
use std::time::Duration;
use time::OffsetDateTime;

/// Classify a leaf certificate's expiry against `now` and the alert window.
///
/// Both comparisons are strict: a certificate expiring exactly at `now` is
/// Warning, one expiring exactly at `now + threshold` raises nothing. A window
/// end past the representable range covers every future expiry.
pub fn classify(not_after: OffsetDateTime, now: OffsetDateTime, threshold: Duration) -> Option<AlertLevel> {
    if not_after < now {
        return Some(AlertLevel::Critical);
    }
    let window_end = time::Duration::try_from(threshold).ok().and_then(|t| now.checked_add(t));
    match window_end {
        Some(end) if not_after >= end => None,
        _ => Some(AlertLevel::Warning),
    }
}
