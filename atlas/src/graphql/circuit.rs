//! Three-state circuit breaker for upstream health protection.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Circuit breaker states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Three-state failure gate.
///
/// Closed: requests pass; consecutive failures counted, threshold trips to
/// Open. Open: `is_open` blocks until the recovery timeout elapses, then
/// transitions to HalfOpen and admits one probe. HalfOpen: success closes,
/// failure re-opens.
///
/// Only transient failures are recorded: a permanent error means a healthy
/// upstream returning a user-visible error, so callers must not report it
/// here.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }

    /// Whether requests should be blocked. Handles the Open → HalfOpen
    /// transition when the recovery timeout has elapsed, admitting one probe.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!(elapsed_secs = elapsed.as_secs_f64(), "circuit half-open, admitting probe");
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Records a successful call: resets the counter; a HalfOpen probe
    /// success closes the circuit.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            info!("circuit closing — probe succeeded");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    /// Records a transient failure: increments the counter and trips to Open
    /// at the threshold; a HalfOpen probe failure re-opens immediately.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            warn!("circuit re-opening — probe failed");
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.failure_count = self.failure_threshold;
            return;
        }
        inner.failure_count += 1;
        if inner.failure_count >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(failures = inner.failure_count, "circuit tripped");
        }
    }
}
