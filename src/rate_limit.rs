//! # Login Rate Limiter
//!
//! Per-client-address token bucket guarding the login endpoint. Buckets live
//! only in memory and only inside this component; callers see `allow` and
//! `sweep`. A bucket reclaimed by the sweep restarts at full capacity when
//! the key returns — an accepted relaxation, not a security boundary.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::counter;

use crate::config::RateLimitConfig;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A token was consumed; let the request through.
    Allowed,
    /// Budget exhausted; the caller should back off for the hinted duration.
    Limited { retry_after_seconds: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_touch: Instant,
}

/// Token-bucket rate limiter keyed by client address.
pub struct RateLimiter {
    burst: f64,
    refill_per_second: f64,
    idle: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a limiter from the configured rate policy.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            burst: f64::from(config.burst),
            refill_per_second: f64::from(config.burst) / config.window_seconds as f64,
            idle: Duration::from_secs(config.idle_seconds),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one token for `key`, or report how long the caller should
    /// wait for the next one.
    pub fn allow(&self, key: &str) -> Decision {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> Decision {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");

        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.burst,
            last_refill: now,
            last_touch: now,
        });

        // Refill monotonically, capped at burst capacity.
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(self.burst);
        bucket.last_refill = now;
        bucket.last_touch = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Allowed
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_seconds = (deficit / self.refill_per_second).ceil() as u64;
            counter!("authgate_rate_limit_rejections_total").increment(1);
            Decision::Limited {
                retry_after_seconds,
            }
        }
    }

    /// Reclaim buckets idle past the configured window, returning the number
    /// removed. Purely a memory bound; correctness never depends on it.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_touch) < self.idle);
        before - buckets.len()
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.buckets.lock().expect("rate limiter mutex poisoned").len()
    }
}
