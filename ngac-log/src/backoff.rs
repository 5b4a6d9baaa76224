// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Exponential backoff with random jitter.
///
/// Starts at an initial value which gets multiplied on every increment, until it hits a ceiling.
/// A random jitter is added on top of every increment so that many replicas losing their
/// connection at the same time do not reconnect in lockstep.
#[derive(Debug)]
pub struct Backoff {
    value: Duration,
    config: BackoffConfig,
    rng: ChaCha20Rng,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Backoff will always begin with this initial value.
    pub initial_value: Duration,

    /// Factor the backoff value gets multiplied with on every increment.
    pub multiplier: u32,

    /// Maximum random value added on every increment.
    pub max_jitter: Duration,

    /// Maximum reachable backoff value.
    pub max_value: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_value: Duration::from_millis(100),
            multiplier: 2,
            max_jitter: Duration::from_millis(100),
            max_value: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    pub fn new(config: BackoffConfig, rng: ChaCha20Rng) -> Self {
        Self {
            value: config.initial_value,
            config,
            rng,
        }
    }

    /// Backoff with a random number generator seeded from the thread-local one.
    pub fn from_config(config: BackoffConfig) -> Self {
        Self::new(config, ChaCha20Rng::from_rng(&mut rand::rng()))
    }

    /// Current waiting time.
    pub fn value(&self) -> Duration {
        self.value
    }

    pub fn increment(&mut self) {
        if self.value >= self.config.max_value {
            self.value = self.config.max_value;
            return;
        }

        // Values beyond what `Duration` can hold are clamped to the ceiling.
        let jitter = self.random_jitter();
        let next = self
            .value
            .checked_mul(self.config.multiplier)
            .and_then(|value| value.checked_add(jitter))
            .unwrap_or(self.config.max_value);
        self.value = next.min(self.config.max_value);
    }

    pub async fn sleep(&self) {
        if self.value.is_zero() {
            return;
        }

        trace!("backoff {} milliseconds", self.value.as_millis());
        tokio::time::sleep(self.value).await;
    }

    pub fn reset(&mut self) {
        self.value = self.config.initial_value;
    }

    fn random_jitter(&mut self) -> Duration {
        let max = self.config.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }

        Duration::from_millis(self.rng.random_range(0..=max))
    }
}
