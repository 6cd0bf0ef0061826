//! Rate limiting for Telegram downloads
//!
//! Telegram throttles file downloads per account. This module bounds how
//! many downloads run at once and how quickly new ones start.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};

/// Upper bound for the spacing between operations
const MAX_DELAY_US: u64 = 10_000_000;

/// Concurrency plus minimum spacing between operation starts
pub struct RateLimiter {
    /// Maximum concurrent operations
    concurrency: Arc<Semaphore>,
    /// Minimum delay between operations (microseconds)
    min_delay_us: AtomicU64,
    /// Start time of the most recently admitted operation
    last_op: parking_lot::Mutex<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_concurrent` - Maximum concurrent operations
    /// * `ops_per_second` - Target operation starts per second (0 = unlimited)
    pub fn new(max_concurrent: usize, ops_per_second: f64) -> Self {
        RateLimiter {
            concurrency: Arc::new(Semaphore::new(max_concurrent)),
            min_delay_us: AtomicU64::new(delay_for_rate(ops_per_second)),
            last_op: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Acquire permission to perform an operation
    ///
    /// The returned guard is owned, so it can travel inside a response stream
    /// and keep the slot busy until the download finishes.
    pub async fn acquire(&self) -> Result<RateLimitGuard> {
        let permit = self
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("Rate limiter closed".to_string()))?;

        let min_delay = Duration::from_micros(self.min_delay_us.load(Ordering::Relaxed));
        if !min_delay.is_zero() {
            // Reserve the next start slot, then sleep outside the lock
            let wait_time = {
                let mut last_op = self.last_op.lock();
                let now = Instant::now();
                let next = (*last_op + min_delay).max(now);
                *last_op = next;
                next - now
            };

            if !wait_time.is_zero() {
                sleep(wait_time).await;
            }
        }

        Ok(RateLimitGuard { _permit: permit })
    }

    /// Like [`RateLimiter::acquire`], but give up with [`Error::Busy`] after `limit`
    pub async fn acquire_within(&self, limit: Duration) -> Result<RateLimitGuard> {
        match tokio::time::timeout(limit, self.acquire()).await {
            Ok(guard) => guard,
            Err(_) => Err(Error::Busy(format!(
                "no download slot became free within {:?}",
                limit
            ))),
        }
    }

    /// Temporarily increase delay (after a flood wait)
    pub fn increase_delay(&self, factor: f64) {
        let current = self.min_delay_us.load(Ordering::Relaxed).max(1_000);
        let new_delay = ((current as f64) * factor) as u64;
        self.min_delay_us
            .store(new_delay.min(MAX_DELAY_US), Ordering::Relaxed);
    }

    /// Reset delay to normal
    pub fn reset_delay(&self, ops_per_second: f64) {
        self.min_delay_us
            .store(delay_for_rate(ops_per_second), Ordering::Relaxed);
    }

    /// Number of operations that could start right now
    pub fn available(&self) -> usize {
        self.concurrency.available_permits()
    }
}

fn delay_for_rate(ops_per_second: f64) -> u64 {
    if ops_per_second > 0.0 {
        (1_000_000.0 / ops_per_second) as u64
    } else {
        0
    }
}

/// Guard that releases the rate limit permit on drop
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}

/// Exponential backoff helper
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff
    pub fn new(base_delay_ms: u64, max_attempts: u32) -> Self {
        ExponentialBackoff {
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_secs(60),
            max_attempts,
            current_attempt: 0,
        }
    }

    /// Get the next delay, or None if max attempts reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let delay = self.base_delay * 2u32.saturating_pow(self.current_attempt);
        self.current_attempt += 1;

        Some(delay.min(self.max_delay))
    }
}
