//! Cancellable single-shot deadline.
//!
//! Callers pass the current time in, so the debouncer never reads a clock
//! itself and tests can step time explicitly.

use std::time::{Duration, Instant};

/// Default debounce delay.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Restartable delay that fires once after the last [`schedule`](Self::schedule).
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    /// Creates an idle debouncer.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Configured delay.
    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)starts the delay from `now`, replacing any pending deadline.
    pub fn schedule(&mut self, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.deadline = Some(deadline);
        deadline
    }

    /// Drops the pending deadline. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Pending deadline, if any.
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True while a deadline is pending.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fires if the deadline has passed; a fired deadline is cleared.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Time left until the deadline, zero if overdue, `None` if idle.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_fires_once_after_delay() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(100 * MS);
        d.schedule(t0);
        assert!(!d.fire_if_due(t0 + 99 * MS));
        assert!(d.fire_if_due(t0 + 100 * MS));
        assert!(!d.fire_if_due(t0 + 200 * MS));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_reschedule_pushes_deadline() {
        let t0 = Instant::now();
        let mut d = Debouncer::default();
        d.schedule(t0);
        d.schedule(t0 + 80 * MS);
        assert!(!d.fire_if_due(t0 + 120 * MS));
        assert_eq!(d.remaining(t0 + 120 * MS), Some(60 * MS));
        assert!(d.fire_if_due(t0 + 180 * MS));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut d = Debouncer::default();
        assert!(!d.cancel());
        d.schedule(t0);
        assert!(d.cancel());
        assert!(!d.fire_if_due(t0 + Duration::from_secs(1)));
        assert_eq!(d.remaining(t0), None);
    }
}
