//! Retry state machine for transient transport failures.
//!
//! [`RetryMachine`] is pure: it decides what happens after each attempt
//! without sleeping or doing I/O. [`run`] drives it against a real
//! operation.

use crate::TransportError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use vdr_types::VdrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, doubling from `base_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    BackingOff { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    Failed { attempts: u32 },
}

/// What the driver should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStep {
    Backoff(Duration),
    /// Transient failure, but the attempt budget is spent.
    GiveUp,
    /// Permanent failure; surface it unchanged.
    Abort,
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    fn attempt(&self) -> u32 {
        match self.state {
            RetryState::Attempting { attempt } | RetryState::BackingOff { attempt, .. } => attempt,
            RetryState::Succeeded { attempts }
            | RetryState::Exhausted { attempts }
            | RetryState::Failed { attempts } => attempts,
        }
    }

    pub fn on_success(&mut self) {
        self.state = RetryState::Succeeded {
            attempts: self.attempt(),
        };
    }

    pub fn on_failure(&mut self, err: &TransportError) -> RetryStep {
        let attempt = self.attempt();
        if !err.is_transient() {
            self.state = RetryState::Failed { attempts: attempt };
            return RetryStep::Abort;
        }
        if attempt >= self.policy.max_attempts {
            self.state = RetryState::Exhausted { attempts: attempt };
            return RetryStep::GiveUp;
        }
        let delay = self.policy.delay_after(attempt);
        self.state = RetryState::BackingOff { attempt, delay };
        RetryStep::Backoff(delay)
    }

    pub fn on_backoff_elapsed(&mut self) {
        if let RetryState::BackingOff { attempt, .. } = self.state {
            self.state = RetryState::Attempting {
                attempt: attempt + 1,
            };
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy gives up.
/// Exhaustion is reported as [`VdrError::NetworkTimeout`].
pub(crate) async fn run<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, VdrError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut machine = RetryMachine::new(policy);
    loop {
        match op().await {
            Ok(value) => {
                machine.on_success();
                return Ok(value);
            }
            Err(err) => match machine.on_failure(&err) {
                RetryStep::Backoff(delay) => {
                    debug!(%what, error = %err, ?delay, state = ?machine.state(), "retrying");
                    tokio::time::sleep(delay).await;
                    machine.on_backoff_elapsed();
                }
                RetryStep::GiveUp => {
                    warn!(%what, error = %err, "retry budget exhausted");
                    return Err(VdrError::NetworkTimeout(format!(
                        "{what} failed after {} attempts: {err}",
                        policy.max_attempts
                    )));
                }
                RetryStep::Abort => return Err(err.into()),
            },
        }
    }
}
