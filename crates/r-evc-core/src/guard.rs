//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Per-vehicle coordination and fleet lifecycle management."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Time-bounded assertion protecting an optimistic value from stale reads.
//!
//! Armed with an expected value, the guard rejects contradicting candidates
//! until either a matching candidate arrives or the TTL lapses. Both outcomes
//! clear it, so a field can never stay suppressed past its TTL.

use std::time::Duration;

use parking_lot::Mutex;
use r_evc_common::time::{deadline_after, monotonic_now, remaining};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Armed<T> {
    expected: T,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct Guard<T> {
    state: Mutex<Option<Armed<T>>>,
}

impl<T> Default for Guard<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }
}

impl<T: Clone + PartialEq> Guard<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the guard. A newer arm replaces any active one.
    pub fn arm(&self, expected: T, ttl: Duration) {
        *self.state.lock() = Some(Armed {
            expected,
            expires_at: deadline_after(monotonic_now(), ttl),
        });
    }

    pub fn accepts(&self, candidate: &T) -> bool {
        self.accepts_at(candidate, monotonic_now())
    }

    /// Decide whether `candidate` may overwrite the guarded field at `now`.
    pub fn accepts_at(&self, candidate: &T, now: Instant) -> bool {
        let mut state = self.state.lock();
        let Some(armed) = state.as_ref() else {
            return true;
        };
        if now >= armed.expires_at || *candidate == armed.expected {
            *state = None;
            return true;
        }
        false
    }

    pub fn clear(&self) {
        self.state.lock().take();
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().is_some()
    }

    pub fn expected(&self) -> Option<T> {
        self.state.lock().as_ref().map(|armed| armed.expected.clone())
    }

    /// Time left before the armed value stops suppressing reads.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.state
            .lock()
            .as_ref()
            .map(|armed| remaining(armed.expires_at, monotonic_now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn unarmed_accepts_everything() {
        let guard = Guard::<bool>::new();
        assert!(guard.accepts(&true));
        assert!(guard.accepts(&false));
        assert!(!guard.is_armed());
    }

    #[test]
    fn contradiction_before_expiry_is_rejected() {
        let guard = Guard::new();
        let start = Instant::now();
        guard.arm(true, TTL);
        assert!(!guard.accepts_at(&false, start + Duration::from_secs(30)));
        assert!(guard.is_armed());
        assert_eq!(guard.expected(), Some(true));
    }

    #[test]
    fn confirmation_clears() {
        let guard = Guard::new();
        guard.arm(true, TTL);
        assert!(guard.accepts(&true));
        assert!(!guard.is_armed());
        assert!(guard.accepts(&false));
    }

    #[test]
    fn expiry_accepts_and_clears() {
        let guard = Guard::new();
        let start = Instant::now();
        guard.arm(true, TTL);
        assert!(guard.accepts_at(&false, start + Duration::from_secs(61)));
        assert!(!guard.is_armed());
    }

    #[test]
    fn rearm_overwrites_expectation() {
        let guard = Guard::new();
        guard.arm(true, TTL);
        guard.arm(false, TTL);
        assert!(!guard.accepts(&true));
        assert!(guard.accepts(&false));
    }

    #[test]
    fn huge_ttl_arms_without_overflow() {
        let guard = Guard::new();
        guard.arm(true, Duration::from_secs(u64::MAX));
        assert!(!guard.accepts(&false));
        assert!(guard.time_remaining().is_some_and(|left| left > TTL));
    }

    #[test]
    fn clear_disarms() {
        let guard = Guard::new();
        guard.arm(true, TTL);
        guard.clear();
        assert!(guard.accepts(&false));
    }
}
