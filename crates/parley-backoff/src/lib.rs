//! Exponential backoff for Parley's reconnect loop.
//!
//! Each failed attempt asks [`ExpBackoff::next_delay`] how long to wait.
//! The base delay starts at `min_delay`, grows by `factor` after every
//! call, and never exceeds `max_delay`. A little random jitter is added on
//! top so a crowd of clients dropped by the same outage doesn't reconnect
//! in lockstep. A successful attempt calls [`ExpBackoff::reset`], and the
//! next disruption starts over from the minimum.
//!
//! ```text
//! min=100ms factor=2 max=5s:  100 → 200 → 400 → 800 → 1600 → 3200 → 5000 → 5000
//!                                                  reset() ↓
//!                                                         100 → 200 → ...
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Full configuration for [`ExpBackoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// First delay, and the value restored by `reset`.
    pub min_delay: Duration,
    /// Ceiling for the base delay (jitter may add a little on top).
    pub max_delay: Duration,
    /// Multiplier applied to the base delay after each attempt.
    pub factor: f64,
    /// Jitter as a fraction of the base delay (0.0–1.0). A value of 0.1
    /// adds up to 10% to each delay.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`ExpBackoff::new`]. Rules:
    /// - `factor` below 1.0 (or not finite) becomes the default 2.0.
    /// - `jitter` clamped to `0.0..=1.0`.
    /// - `max_delay` raised to `min_delay` if it is smaller.
    pub fn validated(mut self) -> Self {
        if !self.factor.is_finite() || self.factor < 1.0 {
            warn!(factor = self.factor, "backoff factor below 1.0, using 2.0");
            self.factor = 2.0;
        }
        if !self.jitter.is_finite() {
            self.jitter = 0.0;
        }
        self.jitter = self.jitter.clamp(0.0, 1.0);
        if self.max_delay < self.min_delay {
            warn!(
                min_ms = self.min_delay.as_millis() as u64,
                max_ms = self.max_delay.as_millis() as u64,
                "max_delay below min_delay, raising it"
            );
            self.max_delay = self.min_delay;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// ExpBackoff
// ---------------------------------------------------------------------------

/// Exponential backoff state: the current base delay and how many
/// attempts have failed since the last reset.
#[derive(Debug, Clone)]
pub struct ExpBackoff {
    config: BackoffConfig,
    delay: Duration,
    attempts: u64,
}

impl ExpBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let config = config.validated();
        Self {
            delay: config.min_delay,
            attempts: 0,
            config,
        }
    }

    /// Returns how long to wait before the next attempt and advances the
    /// state: the base grows by `factor` (capped at `max_delay`) and the
    /// attempt counter goes up by one.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.delay;
        let delay = base + self.jitter_for(base);

        let grown = base.as_secs_f64() * self.config.factor;
        self.delay = if grown >= self.config.max_delay.as_secs_f64() {
            self.config.max_delay
        } else {
            Duration::from_secs_f64(grown)
        };
        self.attempts += 1;

        debug!(
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "backoff"
        );
        delay
    }

    /// Sleeps for [`next_delay`](Self::next_delay).
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        tokio::time::sleep(delay).await;
    }

    /// Restores the minimum delay and zeroes the attempt counter.
    pub fn reset(&mut self) {
        self.delay = self.config.min_delay;
        self.attempts = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// The base delay the next call will start from (before jitter).
    pub fn current_base(&self) -> Duration {
        self.delay
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn jitter_for(&self, base: Duration) -> Duration {
        let span = base.as_secs_f64() * self.config.jitter;
        if span <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rand::rng().random_range(0.0..=span))
    }
}

impl Default for ExpBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
