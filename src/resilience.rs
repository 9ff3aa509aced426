// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience utilities: retry budget and write throttling.
//!
//! - [`RetryConfig`]: backoff schedule for "temporarily unavailable" reads
//! - [`RateLimiter`]: token bucket to keep destination writes under a rate
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use site_replication::resilience::{RateLimiter, RateLimitConfig};
//!
//! let limiter = RateLimiter::new(RateLimitConfig { burst_size: 20, refill_rate: 20 });
//! limiter.acquire().await; // Blocks if over limit
//! # }
//! ```

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Retry schedule for a single remote call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    /// `usize::MAX` retries forever.
    pub max_attempts: usize,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Ceiling for the delay.
    pub max_delay: Duration,

    /// Multiplier applied per retry (1.0 = fixed delay).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl RetryConfig {
    /// Fixed one-second delay for up to ten minutes.
    ///
    /// The store answers 503 while it is rebuilding views; those windows are
    /// long but finite.
    pub fn unavailable() -> Self {
        Self {
            max_attempts: 600,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            backoff_factor: 1.0,
        }
    }

    /// Never give up.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: usize::MAX,
            ..Self::unavailable()
        }
    }

    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows_another(&self, attempts: usize) -> bool {
        attempts < self.max_attempts
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let exponent = (attempt - 1).min(i32::MAX as usize) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay.max(self.initial_delay);
        }

        Duration::from_secs_f64(delay_secs)
    }
}

// =============================================================================
// Rate Limiting
// =============================================================================

/// Token bucket parameters.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum tokens that can be accumulated (burst capacity).
    pub burst_size: u32,

    /// Tokens added per second (sustained rate).
    pub refill_rate: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_size: 100,
            refill_rate: 100,
        }
    }
}

/// Token bucket rate limiter for destination writes.
pub struct RateLimiter {
    limiter: GovLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(config.refill_rate).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: GovLimiter::direct(quota),
            config,
        }
    }

    /// Wait until a write is allowed.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("config", &self.config).finish()
    }
}
