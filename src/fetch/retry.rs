//! Bounded retries for archive fetches.
//!
//! A fetch attempt ends in a [`FetchOutcome`]. Terminal failures (the
//! recording is not ready on the server) are returned immediately; transient
//! failures are retried with exponential backoff until the attempt budget is
//! spent, and the last failure is reported unchanged.
//!
//! # Example
//!
//! ```
//! use harvester_core::fetch::{FetchOutcome, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::with_max_attempts(3);
//! let outcome = FetchOutcome::transient("connection reset");
//!
//! match policy.should_retry(&outcome, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {reason}");
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY};
use super::FetchOutcome;

/// Default maximum delay cap (60 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry budget and backoff shape.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt.
    backoff_multiplier: f32,

    /// Whether random jitter is added to each delay.
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            jitter: true,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Disables jitter so delays are deterministic.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether the attempt that produced `outcome` should be retried.
    ///
    /// `attempt` is the 1-indexed attempt that just finished.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, outcome: &FetchOutcome, attempt: u32) -> RetryDecision {
        match outcome {
            FetchOutcome::Success(_) => {
                return RetryDecision::DoNotRetry {
                    reason: "fetch succeeded".to_string(),
                };
            }
            FetchOutcome::TerminalFailure(_) => {
                return RetryDecision::DoNotRetry {
                    reason: "terminal failure - retry would not help".to_string(),
                };
            }
            FetchOutcome::TransientFailure(_) => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter {
            Self::calculate_jitter()
        } else {
            Duration::ZERO
        };
        Duration::from_millis(capped_ms as u64) + jitter
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter() -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Result of a supervised fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    /// The final outcome: a success or the last failure, unchanged.
    pub outcome: FetchOutcome,
    /// Attempts made, including the first.
    pub attempts: u32,
}

/// Drives fetch attempts under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetrySupervisor {
    policy: RetryPolicy,
}

impl RetrySupervisor {
    /// Creates a supervisor with `policy`.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `attempt_fn` until it succeeds, fails terminally or the budget is spent.
    ///
    /// `attempt_fn` receives the 1-indexed attempt number. Each call must
    /// release everything it acquired before its future completes.
    pub async fn run<F, Fut>(&self, mut attempt_fn: F) -> RetryReport
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let mut attempt = 1;
        loop {
            let outcome = attempt_fn(attempt).await;
            match self.policy.should_retry(&outcome, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    if let FetchOutcome::TransientFailure(reason) = &outcome {
                        warn!(
                            attempt,
                            reason = %reason,
                            delay_ms = delay.as_millis(),
                            "fetch attempt failed, retrying"
                        );
                    }
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    if !outcome.is_success() {
                        info!(attempt, reason = %reason, "giving up on fetch");
                    }
                    return RetryReport {
                        outcome,
                        attempts: attempt,
                    };
                }
            }
        }
    }
}
