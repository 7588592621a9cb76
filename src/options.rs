use std::time::Duration;

use rand::Rng;

/// Lower and upper bound of the exponential backoff jitter factor.
const JITTER_RANGE: (f64, f64) = (0.75, 1.25);

/// Exponent cap; keeps `2^attempt` from overflowing.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Wait strategy between retry attempts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Backoff {
    /// Constant delay of `base_ms`.
    Fixed,
    /// `base_ms * 2^attempt`, scaled by a random factor in `[0.75, 1.25]`.
    #[default]
    Exponential,
}

/// Controls how failed requests are retried.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub attempts: usize,
    pub backoff: Backoff,
    /// Base delay in milliseconds.
    pub base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            backoff: Backoff::Exponential,
            base_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            attempts: 0,
            ..Self::default()
        }
    }

    pub fn fixed(attempts: usize, base_ms: u64) -> Self {
        Self {
            attempts,
            backoff: Backoff::Fixed,
            base_ms,
        }
    }

    pub fn exponential(attempts: usize, base_ms: u64) -> Self {
        Self {
            attempts,
            backoff: Backoff::Exponential,
            base_ms,
        }
    }

    /// Delay to wait after the failed attempt with index `attempt`.
    pub fn delay(&self, attempt: usize) -> Duration {
        let jitter = match self.backoff {
            Backoff::Fixed => 1.0,
            Backoff::Exponential => rand::thread_rng().gen_range(JITTER_RANGE.0..=JITTER_RANGE.1),
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Same as [`RetryPolicy::delay`] with a caller-chosen jitter factor.
    ///
    /// `jitter` is clamped into `[0.75, 1.25]` and ignored for
    /// [`Backoff::Fixed`].
    pub fn delay_with_jitter(&self, attempt: usize, jitter: f64) -> Duration {
        match self.backoff {
            Backoff::Fixed => Duration::from_millis(self.base_ms),
            Backoff::Exponential => {
                let exp = attempt.min(MAX_BACKOFF_EXPONENT as usize) as u32;
                let unjittered = self.base_ms.saturating_mul(1u64 << exp);
                let factor = jitter.clamp(JITTER_RANGE.0, JITTER_RANGE.1);
                Duration::from_millis((unjittered as f64 * factor).round() as u64)
            }
        }
    }
}

/// Configures transport timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Optional overall deadline for one logical request, in milliseconds.
    ///
    /// A retry whose wait would end past the deadline is not attempted; the
    /// last response is then handled as if no retries remained.
    pub deadline_ms: Option<u64>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            deadline_ms: None,
        }
    }
}
