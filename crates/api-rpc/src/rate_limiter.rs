//! Rate Limiter (Token Bucket Algorithm)
//!
//! Limits RPC calls per second without a lock: bucket level and refill
//! timestamp share one atomic word.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Fixed-point scale: one token = 1000 milli-tokens
const MILLI: u64 = 1000;

/// Rate limiter using token bucket algorithm with atomic operations
pub struct RateLimiter {
    // Upper 32 bits: milli-tokens
    // Lower 32 bits: last refill timestamp (milliseconds since creation)
    packed: AtomicU64,
    creation_time: Instant,
    max_milli_tokens: u64,
    refill_rate: u64, // tokens per second == milli-tokens per millisecond
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_tokens` - Maximum burst size
    /// * `refill_rate` - Tokens added per second
    ///
    /// # Example
    /// Allow 100 requests/sec with burst of 200:
    /// `RateLimiter::new(200, 100)`
    pub fn new(max_tokens: u32, refill_rate: u32) -> Self {
        let max_milli_tokens = (max_tokens as u64 * MILLI).min(u32::MAX as u64);
        Self {
            packed: AtomicU64::new(max_milli_tokens << 32),
            creation_time: Instant::now(),
            max_milli_tokens,
            refill_rate: refill_rate as u64,
        }
    }

    /// Consume one token if available
    ///
    /// Returns false when rate limited.
    pub fn check(&self) -> bool {
        loop {
            let packed = self.packed.load(Ordering::Acquire);
            let milli_tokens = packed >> 32;
            let last_refill_ms = packed & 0xFFFF_FFFF;

            let elapsed_ms = (self.creation_time.elapsed().as_millis() as u64) & 0xFFFF_FFFF;
            let delta_ms = elapsed_ms.saturating_sub(last_refill_ms);

            // Fractional tokens carry over, so slow steady callers still refill
            let refilled = milli_tokens
                .saturating_add(delta_ms.saturating_mul(self.refill_rate))
                .min(self.max_milli_tokens);
            let allowed = refilled >= MILLI;
            let remaining = if allowed { refilled - MILLI } else { refilled };
            let new_packed = (remaining << 32) | elapsed_ms;

            if self
                .packed
                .compare_exchange(packed, new_packed, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                return allowed;
            }
        }
    }

    /// Whole tokens currently available (for monitoring)
    pub fn remaining(&self) -> u64 {
        (self.packed.load(Ordering::Acquire) >> 32) / MILLI
    }
}
