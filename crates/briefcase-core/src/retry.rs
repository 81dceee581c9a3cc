//! Bounded exponential-backoff retry for single-resource operations.
//!
//! The wrapper only looks at the outcome of each attempt. What counts as
//! success is decided by the operation itself.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder, Retryable};

use crate::{Error, Result};

/// Retries attempted after the first failure by default.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Sleep before the first retry by default.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(3);
/// Factor applied to the delay after every further failure by default.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Validated retry schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    max_retries: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryConfig {
    /// Build a schedule, rejecting values that would not back off.
    ///
    /// `max_retries` counts the attempts made after the first one.
    pub fn new(max_retries: i64, initial_delay: Duration, backoff_multiplier: f64) -> Result<Self> {
        if backoff_multiplier.is_nan() || backoff_multiplier <= 1.0 {
            return Err(Error::Config(format!(
                "backoff multiplier must be greater than 1 (got {backoff_multiplier})"
            )));
        }
        if max_retries < 0 {
            return Err(Error::Config(format!(
                "max retries must be 0 or greater (got {max_retries})"
            )));
        }
        let max_retries = u32::try_from(max_retries).map_err(|_| {
            Error::Config(format!("max retries is too large (got {max_retries})"))
        })?;
        if initial_delay.is_zero() {
            return Err(Error::Config(
                "initial retry delay must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            max_retries,
            initial_delay,
            backoff_multiplier,
        })
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub const fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Exponential schedule with no jitter and no delay cap.
    #[allow(clippy::cast_possible_truncation)]
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_factor(self.backoff_multiplier as f32)
            .with_max_times(usize::try_from(self.max_retries).unwrap_or(usize::MAX))
            .without_max_delay()
    }

    /// Delays slept between consecutive attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.backoff().build().collect()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// An attempt that produced nothing.
#[derive(Debug)]
struct AttemptFailed;

/// Run `operation` until it yields a value or the schedule is exhausted.
///
/// Returns the first `Some` produced. `None` means every attempt failed.
pub async fn retry_until_some<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let attempt = move || {
        let pending = operation();
        async move { pending.await.ok_or(AttemptFailed) }
    };

    attempt
        .retry(config.backoff())
        .notify(|_, delay| {
            tracing::debug!(
                "Attempt failed, retrying in {delay:?} (at most {} retries)",
                config.max_retries
            );
        })
        .await
        .ok()
}

/// Boolean form of [`retry_until_some`].
pub async fn retry<F, Fut>(config: &RetryConfig, mut operation: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    retry_until_some(config, || {
        let attempt = operation();
        async move { attempt.await.then_some(()) }
    })
    .await
    .is_some()
}
