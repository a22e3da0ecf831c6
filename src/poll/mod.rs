//! Bounded retry-until-predicate waits over eventually consistent state.
//!
//! A mutating remote call is acknowledged before the resource reaches the
//! requested state. [`ConditionPoller::wait_for`] takes the state observed
//! right after the call and re-queries it at a fixed interval until a
//! predicate holds, the attempt budget runs out, or the wait is cancelled.

mod cancel;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use crate::gateway::GatewayError;

pub use cancel::CancelToken;

/// Refreshes attempted before a wait gives up, unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 600;

/// Pause between refreshes, unless configured otherwise.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Attempt budget and pacing for one class of wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Maximum number of refreshes after the initial check.
    pub max_attempts: u32,
    /// Pause before each refresh.
    pub interval: Duration,
}

impl PollPolicy {
    /// Builds a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Copy of this policy with a different attempt budget.
    #[must_use]
    pub const fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval: self.interval,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INTERVAL)
    }
}

/// Poll policies per operation class.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PollPolicies {
    /// Waiting for a new volume to become available.
    pub provisioning: PollPolicy,
    /// Waiting for an attachment to settle, in either direction.
    pub attachment: PollPolicy,
    /// Waiting for a snapshot to complete.
    pub snapshot: PollPolicy,
    /// Waiting for a deleted volume to disappear.
    pub deletion: PollPolicy,
}

impl PollPolicies {
    /// Uses `policy` for every operation class.
    #[must_use]
    pub const fn uniform(policy: PollPolicy) -> Self {
        Self {
            provisioning: policy,
            attachment: policy,
            snapshot: policy,
            deletion: policy,
        }
    }
}

/// What a wait is waiting for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    /// The subject reaching a state; disappearance is a failure.
    State,
    /// The subject going away; disappearance is success.
    Deletion,
}

/// Successful outcome of a wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Polled<T> {
    /// The predicate held for this observation.
    Ready(T),
    /// The subject disappeared while waiting for its deletion.
    Gone,
}

/// Reasons a wait ends without success.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError<T> {
    /// The attempt budget ran out.
    #[error("condition not met after {attempts} attempts")]
    Timeout {
        /// Refreshes performed.
        attempts: u32,
        /// Last observed state of the subject.
        last: T,
    },
    /// The wait was cancelled before the condition held.
    #[error("wait cancelled")]
    Cancelled,
    /// The subject disappeared while waiting for a state.
    #[error("subject disappeared while waiting")]
    NotFound,
    /// A refresh failed; refresh failures are not retried.
    #[error(transparent)]
    Remote(#[from] GatewayError),
}

/// Generic bounded poller shared by every lifecycle wait.
#[derive(Clone, Debug, Default)]
pub struct ConditionPoller {
    policy: PollPolicy,
    cancel: CancelToken,
}

impl ConditionPoller {
    /// Creates a poller with its own cancellation token.
    #[must_use]
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Waits until `ready` holds for the subject.
    ///
    /// `subject` is the state observed right after the mutating call and is
    /// checked without a refresh. Each later attempt sleeps for the policy
    /// interval, then calls `refresh`. A refresh yielding `Ok(None)` or
    /// [`GatewayError::NotFound`] means the subject is gone.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Timeout`] with the last observation once the
    /// budget is spent, [`PollError::Cancelled`] when the token fires during
    /// a pause, [`PollError::NotFound`] when a [`Target::State`] subject
    /// disappears, and [`PollError::Remote`] for any other refresh failure.
    pub async fn wait_for<T, R, F, Fut>(
        &self,
        subject: T,
        target: Target,
        mut ready: R,
        mut refresh: F,
    ) -> Result<Polled<T>, PollError<T>>
    where
        R: FnMut(&T) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, GatewayError>>,
    {
        if ready(&subject) {
            return Ok(Polled::Ready(subject));
        }

        let mut last = subject;
        for attempt in 1..=self.policy.max_attempts {
            self.pause().await?;
            match refresh().await {
                Ok(Some(current)) => {
                    if ready(&current) {
                        debug!(attempt, "condition met");
                        return Ok(Polled::Ready(current));
                    }
                    last = current;
                }
                Ok(None) | Err(GatewayError::NotFound { .. }) => {
                    debug!(attempt, ?target, "subject gone");
                    return match target {
                        Target::Deletion => Ok(Polled::Gone),
                        Target::State => Err(PollError::NotFound),
                    };
                }
                Err(err) => return Err(PollError::Remote(err)),
            }
        }

        Err(PollError::Timeout {
            attempts: self.policy.max_attempts,
            last,
        })
    }

    async fn pause<T>(&self) -> Result<(), PollError<T>> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PollError::Cancelled),
            () = sleep(self.policy.interval) => Ok(()),
        }
    }
}
