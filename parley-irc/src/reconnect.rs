//! Reconnect policy for the session loop.
//!
//! The session never gives up: every failed or lost connection is followed
//! by a fixed delay (plus optional jitter) and another attempt.

use async_trait::async_trait;
use parley_common::ReconnectConfig;
use rand::Rng;
use std::time::Duration;

/// Delay applied before each reconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
    jitter: Duration,
}

impl ReconnectPolicy {
    /// Fixed delay, no jitter.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    /// Add up to `jitter` of random extra delay to each attempt.
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::fixed(Duration::from_secs(config.delay_secs))
            .with_jitter(Duration::from_millis(config.jitter_ms))
    }

    pub const fn base_delay(&self) -> Duration {
        self.delay
    }

    /// Delay before the next attempt.
    pub fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let max_jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = rand::thread_rng().gen_range(0..=max_jitter_ms);
        self.delay + Duration::from_millis(extra)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

/// Waits between reconnect attempts. Swappable so tests need not sleep.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
