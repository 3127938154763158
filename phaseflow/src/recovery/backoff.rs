//! Backoff schedule for retryable phase failures.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default schedule in milliseconds: 1s, 2s, 4s, 8s.
pub const DEFAULT_BACKOFF_MS: [u64; 4] = [1_000, 2_000, 4_000, 8_000];

/// Jitter strategy applied on top of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the schedule exactly.
    #[default]
    None,
    /// Random from 0 to delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterStrategy {
    /// Applies jitter to a delay.
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => {
                if millis == 0 {
                    delay
                } else {
                    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
                }
            }
            Self::Equal => {
                let half = millis / 2;
                if half == 0 {
                    delay
                } else {
                    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
                }
            }
        }
    }
}

/// A fixed, attempt-indexed delay sequence.
///
/// Attempts past the end of the sequence reuse its last element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
    jitter: JitterStrategy,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_BACKOFF_MS)
    }
}

impl BackoffSchedule {
    /// Creates a schedule from explicit delays.
    #[must_use]
    pub fn new(steps: Vec<Duration>) -> Self {
        Self {
            steps,
            jitter: JitterStrategy::None,
        }
    }

    /// Creates a schedule from millisecond values.
    #[must_use]
    pub fn from_millis(steps: &[u64]) -> Self {
        Self::new(steps.iter().copied().map(Duration::from_millis).collect())
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// The un-jittered delay for a 0-based attempt.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt).unwrap_or(usize::MAX);
        self.steps
            .get(index)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// The delay for a 0-based attempt, with jitter applied.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.base_delay(attempt))
    }

    /// The configured steps.
    #[must_use]
    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}
