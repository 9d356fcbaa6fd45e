//! One-shot deadline timers owned by a peer.
//!
//! A timer does not schedule anything by itself: it records a deadline that
//! the pool's event loop sleeps towards, and reports expiry when polled.
//! Clearing a timer cancels it; a cleared or fired timer must be started
//! again explicitly for the next wait.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct Timer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Arm the timer.
    ///
    /// # Panics
    /// Panics if the timer is already running.
    pub fn start(&mut self, now: Instant) {
        assert!(self.deadline.is_none(), "timer already running");
        self.deadline = Some(now + self.timeout);
    }

    /// Arm the timer, replacing any running deadline.
    pub fn restart(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }

    pub fn running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` exactly once when the deadline has passed, disarming
    /// the timer.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
