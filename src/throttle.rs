//! Rate limiting for forwarded progress events.
//!
//! The throttle is deliberately decoupled from observers: it is owned by
//! the orchestrator's forwarding path, one instance per operation, so
//! observers stay stateless and the policy is testable on its own.

use std::time::{Duration, Instant};

/// Default minimum interval between forwarded `Progress` events.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(1000);

/// Decides whether a `Progress` event may be forwarded right now.
///
/// The first event is always admitted; afterwards an event passes only if
/// at least the window has elapsed since the last admitted one. A zero
/// window disables throttling.
#[derive(Debug)]
pub struct ProgressThrottle {
    window: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    /// Creates a throttle with the given window.
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// The configured window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admits or suppresses an event at the current instant.
    pub fn admit(&mut self) -> bool {
        self.admit_at(Instant::now())
    }

    /// Admits or suppresses an event at `now`.
    ///
    /// Split out from [`admit`](Self::admit) so the policy can be tested
    /// without sleeping.
    pub fn admit_at(&mut self, now: Instant) -> bool {
        let admitted = match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.window,
        };
        if admitted {
            self.last = Some(now);
        }
        admitted
    }

    /// Forgets the last admission, so the next event passes immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}
