//! Exponential backoff for rate-limited and temporarily unavailable upstreams.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::ProviderError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the delay before retry `retry` (0-indexed), before jitter:
    /// `min(max_delay, initial_delay * multiplier^retry)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Scales `delay` by a uniform factor in `[0.5, 1.0]`.
    pub fn jittered(&self, delay: Duration) -> Duration {
        let factor = rand::rng().random_range(0.5..=1.0);
        delay.mul_f64(factor)
    }

    fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let computed = self.jittered(self.backoff_delay(retry));
        match hint {
            Some(hint) => hint.max(computed).min(self.max_delay),
            None => computed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    RateLimited,
    Unavailable,
    Permanent,
}

impl RetryClass {
    pub fn is_retryable(self) -> bool {
        self != RetryClass::Permanent
    }
}

pub trait Retryable {
    fn retry_class(&self) -> RetryClass;

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Classifies a failure from its message alone.
pub fn classify_message(message: &str) -> RetryClass {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return RetryClass::RateLimited;
    }
    if lower.contains("503") || lower.contains("service unavailable") || lower.contains("temporarily unavailable") {
        return RetryClass::Unavailable;
    }
    RetryClass::Permanent
}

impl Retryable for ProviderError {
    fn retry_class(&self) -> RetryClass {
        match self.http_status() {
            Some(429) => RetryClass::RateLimited,
            Some(503) => RetryClass::Unavailable,
            Some(_) => RetryClass::Permanent,
            None => match self {
                ProviderError::MissingCredential { .. } | ProviderError::Config { .. } => {
                    RetryClass::Permanent
                }
                other => classify_message(&other.to_string()),
            },
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        ProviderError::retry_after(self)
    }
}

/// Runs `operation`, retrying transient failures per `policy`.
pub async fn with_retry<T, E, Op, Fut>(policy: &RetryPolicy, label: &str, operation: Op) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    with_retry_using(policy, label, operation, tokio::time::sleep).await
}

/// Same as [`with_retry`] with an injectable sleep.
pub async fn with_retry_using<T, E, Op, Fut, Sleep, SleepFut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: Op,
    mut sleep: Sleep,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
    Sleep: FnMut(Duration) -> SleepFut,
    SleepFut: Future<Output = ()>,
{
    let mut retry = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let class = err.retry_class();
        if !class.is_retryable() || retry >= policy.max_retries {
            return Err(err);
        }
        let delay = policy.delay_for(retry, err.retry_after());
        warn!(
            operation = label,
            attempt = retry + 1,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            class = ?class,
            error = %err,
            "retrying after transient failure"
        );
        sleep(delay).await;
        retry += 1;
    }
}
