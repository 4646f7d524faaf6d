use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use pacekeeper_limits_center::BreakerPolicy;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-endpoint failure-tracking state machine, shared across users.
/// Transitions happen only inside the store's atomic `update`, so two
/// workers racing on the same endpoint serialize.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            next_attempt_at: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BreakerCheck {
    Allow,
    /// Cooldown elapsed; this request is the half-open probe.
    AllowProbe,
    Deny {
        retry_after_secs: u64,
    },
}

impl CircuitBreaker {
    /// Admission-time check. Only the OPEN -> HALF_OPEN edge is
    /// time-gated.
    pub fn check(&mut self, now: DateTime<Utc>) -> BreakerCheck {
        match self.state {
            BreakerState::Closed => BreakerCheck::Allow,
            BreakerState::HalfOpen => BreakerCheck::AllowProbe,
            BreakerState::Open => match self.next_attempt_at {
                Some(at) if now >= at => {
                    self.state = BreakerState::HalfOpen;
                    self.consecutive_successes = 0;
                    BreakerCheck::AllowProbe
                }
                Some(at) => BreakerCheck::Deny {
                    retry_after_secs: (at - now).num_seconds().max(1) as u64,
                },
                // An open breaker without a deadline is a corrupt
                // record; treat the cooldown as elapsed.
                None => {
                    self.state = BreakerState::HalfOpen;
                    self.consecutive_successes = 0;
                    BreakerCheck::AllowProbe
                }
            },
        }
    }

    /// Returns true when this success closed the breaker.
    pub fn record_success(&mut self, policy: &BreakerPolicy) -> bool {
        self.consecutive_failures = 0;
        match self.state {
            BreakerState::Closed => false,
            BreakerState::Open => {
                // An outcome landed while open (e.g. a job already in
                // flight when the breaker tripped); treat it as a probe.
                self.state = BreakerState::HalfOpen;
                self.consecutive_successes = 1;
                self.maybe_close(policy)
            }
            BreakerState::HalfOpen => {
                self.consecutive_successes += 1;
                self.maybe_close(policy)
            }
        }
    }

    /// Returns true when this failure opened the breaker.
    pub fn record_failure(&mut self, policy: &BreakerPolicy, now: DateTime<Utc>) -> bool {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.last_failure_at = Some(now);
        let should_open = match self.state {
            // Any failure while half-open re-opens immediately.
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.consecutive_failures >= policy.failure_threshold,
            BreakerState::Open => false,
        };
        if should_open {
            self.state = BreakerState::Open;
            self.next_attempt_at = Some(now + Duration::seconds(policy.cooldown_secs as i64));
        }
        should_open
    }

    fn maybe_close(&mut self, policy: &BreakerPolicy) -> bool {
        if self.consecutive_successes >= policy.success_threshold {
            *self = CircuitBreaker::default();
            true
        } else {
            false
        }
    }
}
