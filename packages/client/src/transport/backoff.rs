//! Reconnect strategies.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the random jitter added to each backoff delay.
pub const MAX_JITTER: Duration = Duration::from_millis(1000);

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// After this many failed attempts the client settles in `Disconnected`.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl BackoffConfig {
    /// `min(base * 2^attempt + jitter, max_delay)`
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let exponential = self.base_delay.saturating_mul(factor);
        exponential.saturating_add(jitter).min(self.max_delay)
    }

    /// Delay before reconnect attempt number `attempt` (0-based), with a
    /// random jitter in `0..1000ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..MAX_JITTER.as_millis() as u64);
        self.delay_with_jitter(attempt, Duration::from_millis(jitter))
    }
}

/// How the transport recovers from a dropped or stale stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStrategy {
    /// Exponential backoff with jitter and an attempt cap.
    Backoff(BackoffConfig),
    /// Fixed-interval retries without a cap, the way a browser `EventSource`
    /// reconnects on its own.
    Native { retry_interval: Duration },
}

impl Default for ReconnectStrategy {
    fn default() -> Self {
        ReconnectStrategy::Backoff(BackoffConfig::default())
    }
}

impl ReconnectStrategy {
    /// Delay before attempt `attempt`, or `None` once attempts are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            ReconnectStrategy::Backoff(config) => {
                (attempt < config.max_attempts).then(|| config.delay(attempt))
            }
            ReconnectStrategy::Native { retry_interval } => Some(*retry_interval),
        }
    }
}
