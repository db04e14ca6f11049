//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Shared primitives and utilities for the core runtime."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::Instant;

/// Capture an instant suitable for guard and TTL comparisons.
///
/// Backed by the tokio clock so paused-time tests can advance it.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Deadlines further out than this are clamped; a TTL that long never lapses in practice.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + ttl`, clamped instead of overflowing the clock.
pub fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Remaining time until `deadline`, zero once it has passed.
pub fn remaining(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

/// Convert a duration into milliseconds for structured log fields.
pub fn duration_to_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_saturates_at_zero() {
        let now = Instant::now();
        assert_eq!(remaining(now, now + Duration::from_secs(5)), Duration::ZERO);
        assert_eq!(
            remaining(now + Duration::from_secs(5), now),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn deadline_clamps_huge_ttls() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_secs(60)),
            now + Duration::from_secs(60)
        );
        let clamped = deadline_after(now, Duration::from_secs(u64::MAX));
        assert!(clamped > now + Duration::from_secs(86_400 * 365));
    }

    #[test]
    fn millis_conversion() {
        assert!((duration_to_millis(Duration::from_micros(1500)) - 1.5).abs() < f64::EPSILON);
    }
}
