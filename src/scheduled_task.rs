//! Deadline-driven one-shot tasks polled from the host's event loop.
//!
//! Used for the "saved" indicator that clears a fixed time after a commit.

use std::time::{Duration, Instant};

/// A one-shot task that fires once its deadline has passed.
///
/// The host event loop polls [`ScheduledTask::poll`]; nothing runs on a
/// background timer, so cancelling is just dropping the pending deadline.
#[derive(Debug, Clone)]
pub struct ScheduledTask<T> {
    /// How long after scheduling the task fires
    delay: Duration,
    /// Pending payload and the instant it becomes due
    pending: Option<(T, Instant)>,
}

impl<T> ScheduledTask<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    /// Schedule `payload`, replacing anything still pending
    pub fn schedule(&mut self, payload: T, now: Instant) {
        self.pending = Some((payload, now + self.delay));
    }

    /// Cancel the pending task, returning its payload
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(payload, _)| payload)
    }

    /// Cancel only if the pending payload matches
    pub fn cancel_if(&mut self, pred: impl FnOnce(&T) -> bool) -> bool {
        match &self.pending {
            Some((payload, _)) if pred(payload) => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Take the payload if its deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, due)) if now >= *due => self.pending.take().map(|(payload, _)| payload),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(payload, _)| payload)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time left before the task fires
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|(_, due)| due.saturating_duration_since(now))
    }
}
