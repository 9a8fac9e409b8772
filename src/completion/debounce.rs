//! Debounce gate for completion triggers.
//!
//! Every trigger records its time. A trigger that lands within `window` of
//! the previous one waits the full window (not the remaining delta) before it
//! may proceed, so a burst of keystrokes each wait a whole window. The first
//! trigger of a session passes immediately.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of passing a trigger through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The trigger may proceed.
    Proceed,
    /// The token fired while the trigger was waiting.
    Cancelled,
}

#[derive(Debug)]
pub struct DebounceGate {
    window: Mutex<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl DebounceGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window: Mutex::new(window),
            last_request: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        *self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_window(&self, window: Duration) {
        *self.window.lock().unwrap_or_else(|e| e.into_inner()) = window;
    }

    /// Record a trigger at `now` and return how long it must wait.
    pub fn record(&self, now: Instant) -> Option<Duration> {
        let window = self.window();
        let mut last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
        let previous = last.replace(now);
        match previous {
            Some(prev) if now.saturating_duration_since(prev) < window => Some(window),
            _ => None,
        }
    }

    /// Record a trigger, wait out the window if needed, then check `token`.
    ///
    /// The token is only consulted after the wait; cancellation does not cut
    /// the sleep short.
    pub async fn pass(&self, token: &CancellationToken) -> GateDecision {
        if let Some(wait) = self.record(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
        if token.is_cancelled() {
            GateDecision::Cancelled
        } else {
            GateDecision::Proceed
        }
    }
}
