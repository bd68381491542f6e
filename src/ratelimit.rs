//! Global request pacing.
//!
//! A single [`TokenBucket`] is shared by every worker of a run, so the
//! configured rate is a ceiling on the run as a whole and not per worker.

use std::sync::{Mutex, PoisonError};

use tokio::time::{Duration, Instant};

/// Rates at or above this many requests per second are treated as
/// unlimited and bypass the bucket entirely.
pub const UNLIMITED_RATE: f64 = 1_000_000.0;

/// Token bucket limiting the number of requests per second.
///
/// The bucket holds at most one second worth of tokens, and never less than
/// one token, so after an idle period up to `max(rate, 1)` requests may go
/// out back to back.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    /// `None` when the rate is unlimited
    state: Option<Mutex<BucketState>>,
}

#[derive(Debug)]
struct BucketState {
    /// Always within `[0, capacity]`
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = elapsed
            .as_secs_f64()
            .mul_add(rate, self.tokens)
            .min(capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    /// Creates a full bucket refilling at `rate` tokens per second.
    ///
    /// A non-finite rate or one at or above [`UNLIMITED_RATE`] yields an
    /// unlimited bucket. The rate must be positive; this is checked by
    /// [`FetchConfig::validate`](crate::FetchConfig::validate).
    #[must_use]
    pub fn new(rate: f64) -> Self {
        // Below one request per second the bucket must still be able to hold
        // a whole token, or `acquire` could never succeed.
        let capacity = rate.max(1.0);
        let state = if rate.is_finite() && rate < UNLIMITED_RATE {
            Some(Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }))
        } else {
            None
        };

        Self {
            rate,
            capacity,
            state,
        }
    }

    /// Configured rate in requests per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns `true` if this bucket never makes callers wait.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.state.is_none()
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&self) {
        let Some(state) = &self.state else {
            return;
        };

        loop {
            let wait = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.refill(Instant::now(), self.rate, self.capacity);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::try_from_secs_f64((1.0 - state.tokens) / self.rate)
                    .unwrap_or(Duration::MAX)
            };

            // The lock is released while sleeping. Other workers may take the
            // token we are waiting for, so refill and check again afterwards.
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available, after accounting for elapsed time.
    #[must_use]
    pub fn available(&self) -> f64 {
        match &self.state {
            Some(state) => {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.refill(Instant::now(), self.rate, self.capacity);
                state.tokens
            }
            None => f64::INFINITY,
        }
    }
}
