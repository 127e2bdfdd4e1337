//! Per-backend circuit breaker.
//!
//! CLOSED counts backend failures in a rolling window; reaching the
//! threshold opens the circuit. OPEN rejects everything until the reset
//! timeout has passed, after which exactly one trial request is let
//! through (HALF_OPEN). The trial's outcome closes or re-opens the circuit.
//!
//! Outcomes carry the [`Admission`] of their request. A request admitted
//! while CLOSED may finish after the circuit opened; its outcome is stale
//! and leaves OPEN and HALF_OPEN alone.
//!
//! Time is passed in explicitly so transitions are deterministic in tests.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// How a request was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    Trial,
}

#[derive(Debug)]
enum Inner {
    Closed { failures: VecDeque<Instant> },
    Open { until: Instant },
    HalfOpen { trial_in_flight: bool },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    reset_timeout: Duration,
    inner: Inner,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, window: Duration, reset_timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            reset_timeout,
            inner: Inner::Closed {
                failures: VecDeque::new(),
            },
        }
    }

    pub fn state(&self, now: Instant) -> CircuitState {
        match &self.inner {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { until } if now < *until => CircuitState::Open,
            Inner::Open { .. } | Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Whether a request could be admitted right now.
    pub fn is_available(&self, now: Instant) -> bool {
        match &self.inner {
            Inner::Closed { .. } => true,
            Inner::Open { until } => now >= *until,
            Inner::HalfOpen { trial_in_flight } => !trial_in_flight,
        }
    }

    /// Admit a request, claiming the trial slot if the circuit is half-open.
    pub fn try_acquire(&mut self, now: Instant) -> Option<Admission> {
        match &mut self.inner {
            Inner::Closed { .. } => Some(Admission::Normal),
            Inner::Open { until } if now < *until => None,
            Inner::Open { .. } => {
                self.inner = Inner::HalfOpen {
                    trial_in_flight: true,
                };
                Some(Admission::Trial)
            }
            Inner::HalfOpen { trial_in_flight } if !*trial_in_flight => {
                *trial_in_flight = true;
                Some(Admission::Trial)
            }
            Inner::HalfOpen { .. } => None,
        }
    }

    /// The backend answered. A trial success closes the circuit; a normal
    /// success clears the failure window while closed and is otherwise
    /// ignored.
    pub fn record_success(&mut self, admission: Admission) {
        match (&mut self.inner, admission) {
            (Inner::Closed { failures }, _) => failures.clear(),
            (Inner::HalfOpen { .. }, Admission::Trial) => {
                self.inner = Inner::Closed {
                    failures: VecDeque::new(),
                };
            }
            _ => {}
        }
    }

    /// The backend failed. Returns `true` if this opened the circuit.
    pub fn record_failure(&mut self, now: Instant, admission: Admission) -> bool {
        match (&mut self.inner, admission) {
            (Inner::Closed { failures }, _) => {
                failures.push_back(now);
                while failures
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > self.window)
                {
                    failures.pop_front();
                }
                if failures.len() >= self.threshold as usize {
                    self.open(now);
                    true
                } else {
                    false
                }
            }
            (Inner::HalfOpen { .. }, Admission::Trial) => {
                self.open(now);
                true
            }
            _ => false,
        }
    }

    /// Give back a trial slot whose request never completed.
    pub fn release_trial(&mut self) {
        if let Inner::HalfOpen { trial_in_flight } = &mut self.inner {
            *trial_in_flight = false;
        }
    }

    fn open(&mut self, now: Instant) {
        self.inner = Inner::Open {
            until: now + self.reset_timeout,
        };
    }
}
