use std::time::{Duration, Instant};

/// A one-shot deadline polled from the owner's update loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    deadline: Option<Instant>,
}

impl Countdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the countdown to fire `duration` after `now`.
    pub fn start(&mut self, now: Instant, duration: Duration) {
        self.deadline = Some(now + duration);
    }

    /// Disarm. Returns whether a countdown was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left, or `None` when not running.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// True exactly once: on the first poll at or after the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
