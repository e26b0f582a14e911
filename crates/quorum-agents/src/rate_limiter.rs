use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quorum_models::RateLimitsConfig;
use tokio::time::Instant;

/// Sliding-window admission control.
///
/// Keeps the timestamps of calls made within the trailing `window` and
/// admits a new call while fewer than `max_calls` are recorded. Callers
/// either check `can_call` before `record_call`, or use `try_acquire` to do
/// both under one lock.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, max_calls: usize, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn calls(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether a call would be admitted now. Does not record anything.
    pub fn can_call(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        calls.len() < self.max_calls
    }

    pub fn record_call(&self) {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        calls.push_back(now);
    }

    /// Time until the oldest in-window call expires, zero when a call is
    /// currently admitted.
    pub fn wait_time(&self) -> Duration {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        if calls.len() < self.max_calls {
            return Duration::ZERO;
        }
        match calls.front() {
            Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Check and record atomically. Returns false when denied.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        if calls.len() < self.max_calls {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Calls currently counted against the window.
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        let mut calls = self.calls();
        self.prune(&mut calls, now);
        calls.len()
    }

    pub fn reset(&self) {
        self.calls().clear();
    }
}

/// The two shared ceilings: outbound market-data/exchange calls and
/// decision-generation calls across all agents.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub api: Arc<RateLimiter>,
    pub decision: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitsConfig) -> Self {
        Self {
            api: Arc::new(RateLimiter::new(
                "api",
                config.api_max_calls,
                Duration::from_secs(config.api_window_seconds),
            )),
            decision: Arc::new(RateLimiter::new(
                "decision",
                config.decision_max_calls,
                Duration::from_secs(config.decision_window_seconds),
            )),
        }
    }
}
