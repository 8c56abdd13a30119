//! Sliding-window rate budget with consume-on-success semantics.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter for upstream API calls.
///
/// Timestamps are recorded only after a successful call (`consume`), so an
/// upstream outage cannot exhaust the quota. An optional per-session window
/// applies on top of the global one; `remaining` reports the minimum of the
/// two. All window mutation happens under one lock, never across an await.
pub struct BudgetTracker {
    max_requests: usize,
    window: Duration,
    max_requests_per_session: Option<usize>,
    inner: Mutex<Windows>,
}

#[derive(Default)]
struct Windows {
    global: VecDeque<Instant>,
    per_session: HashMap<String, VecDeque<Instant>>,
}

fn prune(window: &mut VecDeque<Instant>, horizon: Duration, now: Instant) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) >= horizon {
            window.pop_front();
        } else {
            break;
        }
    }
}

impl BudgetTracker {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            max_requests_per_session: None,
            inner: Mutex::new(Windows::default()),
        }
    }

    pub fn with_session_limit(mut self, max_requests_per_session: usize) -> Self {
        self.max_requests_per_session = Some(max_requests_per_session);
        self
    }

    /// Requests remaining in the current window; with a session id, the
    /// minimum of global and session remaining.
    pub fn remaining(&self, session_id: Option<&str>) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        prune(&mut inner.global, self.window, now);
        let global = self.max_requests.saturating_sub(inner.global.len());

        let (Some(session_id), Some(session_max)) = (session_id, self.max_requests_per_session)
        else {
            return global;
        };
        let session = match inner.per_session.get_mut(session_id) {
            Some(window) => {
                prune(window, self.window, now);
                session_max.saturating_sub(window.len())
            }
            None => session_max,
        };
        global.min(session)
    }

    /// Non-mutating pre-flight check.
    pub fn is_available(&self, session_id: Option<&str>) -> bool {
        self.remaining(session_id) > 0
    }

    /// Atomic check-and-record. Succeeds iff both global and (optional)
    /// session windows have room. Call only after a successful upstream call.
    pub fn consume(&self, session_id: Option<&str>) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        prune(&mut inner.global, self.window, now);
        if inner.global.len() >= self.max_requests {
            return false;
        }

        if let (Some(session_id), Some(session_max)) = (session_id, self.max_requests_per_session) {
            let window = inner
                .per_session
                .entry(session_id.to_string())
                .or_default();
            prune(window, self.window, now);
            if window.len() >= session_max {
                return false;
            }
            window.push_back(now);
        }

        inner.global.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: consume-on-success: N successes then M failures leave
    /// remaining = initial − N, independent of M. (Failures never call
    /// consume; this asserts the non-mutating check does not record.)
    #[test]
    fn failures_do_not_consume() {
        let tracker = BudgetTracker::new(5, Duration::from_secs(60));
        assert!(tracker.consume(None));
        assert!(tracker.consume(None));
        for _ in 0..10 {
            assert!(tracker.is_available(None));
        }
        assert_eq!(tracker.remaining(None), 3);
    }

    /// **Scenario**: the window empties once entries age out.
    #[test]
    fn window_expiry_frees_budget() {
        let tracker = BudgetTracker::new(1, Duration::from_millis(20));
        assert!(tracker.consume(None));
        assert!(!tracker.consume(None));
        std::thread::sleep(Duration::from_millis(25));
        assert!(tracker.consume(None));
    }

    /// **Scenario**: per-session limit binds before the global one.
    #[test]
    fn session_limit_applies() {
        let tracker = BudgetTracker::new(10, Duration::from_secs(60)).with_session_limit(1);
        assert!(tracker.consume(Some("s1")));
        assert!(!tracker.consume(Some("s1")));
        assert!(tracker.consume(Some("s2")));
        assert_eq!(tracker.remaining(Some("s1")), 0);
        // Global still has room for sessionless callers.
        assert!(tracker.is_available(None));
    }

    /// **Scenario**: remaining reports the min of global and session.
    #[test]
    fn remaining_is_min_of_windows() {
        let tracker = BudgetTracker::new(2, Duration::from_secs(60)).with_session_limit(5);
        assert!(tracker.consume(Some("s1")));
        assert_eq!(tracker.remaining(Some("s1")), 1);
        assert!(tracker.consume(None));
        assert_eq!(tracker.remaining(Some("s1")), 0);
    }
}
