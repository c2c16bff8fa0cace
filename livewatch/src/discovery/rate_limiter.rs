//! Rate limiting for discovery searches.
//!
//! Implements a token bucket so bursts of searches cannot trip upstream
//! anti-abuse limits.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::Error;

/// Configuration for a rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum tokens (burst capacity).
    pub max_tokens: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Initial tokens.
    pub initial_tokens: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        // One search every 2.5 seconds, no burst.
        Self {
            max_tokens: 1,
            refill_rate: 0.4,
            initial_tokens: 1,
        }
    }
}

impl RateLimiterConfig {
    /// Create a config for a requests-per-second limit with a burst of one.
    pub fn with_rps(rps: f64) -> Result<Self, Error> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(Error::config(format!(
                "rate limit must be a positive finite number, got {}",
                rps
            )));
        }
        Ok(Self {
            max_tokens: 1,
            refill_rate: rps,
            initial_tokens: 1,
        })
    }
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    max_tokens: u32,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            tokens: config.initial_tokens as f64,
            max_tokens: config.max_tokens.max(1),
            refill_rate: config.refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Acquire a token, waiting if necessary. Returns the time waited.
    pub async fn acquire(&mut self) -> Duration {
        let mut total_wait = Duration::ZERO;
        loop {
            let wait = self.time_until_available();
            if wait.is_zero() {
                self.tokens -= 1.0;
                return total_wait;
            }
            debug!("Search rate limited, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
            total_wait += wait;
        }
    }

    /// Time until the next token is available.
    pub fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens as f64);
        self.last_refill = now;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
