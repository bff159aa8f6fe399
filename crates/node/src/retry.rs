//! Bounded exponential backoff for report delivery.
//!
//! ## Invariants
//!
//! 1. `attempts <= max_attempts`
//! 2. Every computed delay is `<= max_delay_ms`
//! 3. No overflow: f64 intermediate is clamped before the u64 cast
//! 4. No panic, no unwrap, no expect
//! 5. Deterministic: delay depends only on config and attempt number

use std::future::Future;

use tracing::debug;

/// Configuration for retry-with-backoff behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry (milliseconds).
    pub initial_delay_ms: u64,
    /// Upper bound for any computed delay (milliseconds).
    pub max_delay_ms: u64,
    /// Multiplicative factor applied per attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryResult<T> {
    /// The operation succeeded.
    Success {
        /// The successful return value.
        value: T,
        /// Number of attempts made (1 = succeeded on first try).
        attempts: u32,
    },
    /// The retry budget was exhausted.
    Exhausted {
        /// Display representation of the last error.
        last_error: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

/// Delay in milliseconds before the retry following `attempt` (1-indexed).
///
/// `min(initial_delay_ms * multiplier^(attempt-1), max_delay_ms)`, with
/// NaN/negative intermediates clamped to zero.
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1);
    let base = (config.initial_delay_ms as f64) * config.backoff_multiplier.powi(exponent as i32);

    let max = config.max_delay_ms as f64;
    let clamped = if base.is_nan() || base < 0.0 {
        0.0
    } else if base > max {
        max
    } else {
        base
    };

    clamped as u64
}

/// Executes an async operation with bounded exponential backoff.
///
/// Every failure is retried until the budget runs out; callers that need
/// to distinguish permanent errors should do so before retrying.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        match operation().await {
            Ok(value) => return RetryResult::Success { value, attempts },
            Err(e) => {
                let last_error = e.to_string();

                if attempts >= config.max_attempts {
                    return RetryResult::Exhausted { last_error, attempts };
                }

                let delay_ms = compute_delay(config, attempts);
                debug!(
                    "retry attempt {}/{} in {}ms: {}",
                    attempts, config.max_attempts, delay_ms, last_error
                );
                if delay_ms > 0 {
                    tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}
