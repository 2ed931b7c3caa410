//! Token bucket rate limiter for per-fetch throughput caps
//!
//! Each fetch owns its own limiter, so no sharing or locking is involved.
//! The bucket holds one second of budget, which allows an initial burst and
//! then converges on the configured bytes-per-second rate.

use std::time::{Duration, Instant};

pub struct RateLimiter {
    /// Maximum tokens (bytes) in the bucket.
    capacity: f64,
    /// Currently available tokens.
    tokens: f64,
    /// Last token refill time.
    last_refill: Instant,
    /// Tokens added per second (the speed limit).
    refill_rate: u64,
    /// Whether this limiter throttles at all.
    unlimited: bool,
}

impl RateLimiter {
    /// Create a limiter for a given bytes-per-second cap; 0 means unlimited.
    pub fn new(bytes_per_second: u64) -> Self {
        if bytes_per_second == 0 {
            return Self::unlimited();
        }
        let capacity = bytes_per_second as f64;
        Self {
            capacity,
            tokens: capacity, // start with a full bucket
            last_refill: Instant::now(),
            refill_rate: bytes_per_second,
            unlimited: false,
        }
    }

    /// Create a limiter that never throttles.
    pub fn unlimited() -> Self {
        Self {
            capacity: f64::MAX,
            tokens: f64::MAX,
            last_refill: Instant::now(),
            refill_rate: u64::MAX,
            unlimited: true,
        }
    }

    /// Consume budget for `bytes` bytes, sleeping until enough has accrued.
    ///
    /// Every byte is accounted for: large requests are paid off in
    /// installments so the cumulative rate stays at the cap even when a
    /// single read exceeds the bucket capacity.
    pub async fn acquire(&mut self, bytes: u64) {
        if self.unlimited {
            return;
        }

        let mut remaining = bytes;
        loop {
            self.refill();

            let available = self.tokens.floor() as u64;
            if available > 0 {
                let take = available.min(remaining);
                self.tokens -= take as f64;
                remaining -= take;
            }
            if remaining == 0 {
                return;
            }

            // Sleep in short slices so cancellation of the surrounding
            // future stays responsive.
            let wait_secs = remaining as f64 / self.refill_rate as f64;
            tokio::time::sleep(Duration::from_secs_f64(wait_secs.min(0.05))).await;
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed_secs > 0.001 {
            let new_tokens = elapsed_secs * self.refill_rate as f64;
            self.tokens = (self.tokens + new_tokens).min(self.capacity);
            self.last_refill = now;
        }
    }
}
