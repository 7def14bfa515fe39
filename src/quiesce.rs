//! Debounced stability detection.
//!
//! A [`Debouncer`] arms a single-shot timer when observation starts and
//! pushes it back on every activity event. It reports [`Phase::Stable`] only
//! once a full delay has elapsed with no activity. The same machine decides
//! page quiescence (activity = DOM mutation batches) and network near-idle
//! (activity = outgoing requests).

use std::time::{Duration, Instant};

/// Detection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not observing yet; activity is ignored
    Idle,
    /// Timer armed; activity resets it
    Observing,
    /// Timer fired with no activity since the last reset
    Stable,
}

/// Single-shot debounce timer for one detection pass.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    phase: Phase,
    fire_at: Option<Instant>,
    resets: u64,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            phase: Phase::Idle,
            fire_at: None,
            resets: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Number of times activity pushed the timer back.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// When the timer will fire if nothing else happens.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Observing => self.fire_at,
            _ => None,
        }
    }

    /// Arm the timer. Has no effect unless the pass is still idle.
    pub fn start(&mut self, now: Instant) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Observing;
            self.fire_at = Some(now + self.delay);
        }
    }

    /// Record activity at `now`.
    ///
    /// Returns `true` when the timer was reset. Activity observed after the
    /// timer already expired does not revive the pass: the machine settles
    /// first and the late event is ignored.
    pub fn on_activity(&mut self, now: Instant) -> bool {
        if self.poll(now) != Phase::Observing {
            return false;
        }
        self.fire_at = Some(now + self.delay);
        self.resets += 1;
        true
    }

    /// Advance to `now`, transitioning to `Stable` if the timer elapsed.
    pub fn poll(&mut self, now: Instant) -> Phase {
        if let (Phase::Observing, Some(fire_at)) = (self.phase, self.fire_at) {
            if now >= fire_at {
                self.phase = Phase::Stable;
            }
        }
        self.phase
    }

    /// Time left before the timer fires, if armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline().map(|d| d.saturating_duration_since(now))
    }
}
