//! Token bucket used to pace calls within one Slack API tier.
//!
//! Tokens refill continuously at `events_per_minute / 60` per second and
//! accumulate up to `burst`.  A caller that finds the bucket empty reserves
//! a token anyway (the balance goes negative) and sleeps until that token
//! would have been minted, so waiters are served in arrival order.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Result, StreamError};

/// Slack API rate-limit tiers, valued in base requests per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Tier1 = 1,
    Tier2 = 20,
    Tier3 = 50,
    Tier4 = 100,
}

impl Tier {
    pub fn per_minute(self) -> u32 {
        self as u32
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

#[derive(Debug)]
pub struct Limiter {
    /// tokens per second
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl Limiter {
    /// Limiter for `tier`, sped up by `boost` extra events per minute.
    pub fn for_tier(tier: Tier, burst: u32, boost: u32) -> Self {
        Self::per_minute(tier.per_minute().saturating_add(boost), burst)
    }

    pub fn per_minute(events: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: f64::from(events.max(1)) / 60.0,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Effectively unlimited limiter, for tests and no-limit runs.
    pub fn unlimited() -> Self {
        Self::per_minute(u32::MAX, u32::MAX)
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    /// Takes a token, returning how long the caller has to wait for it.
    fn reserve(&self) -> Duration {
        let mut bucket = match self.bucket.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last = now;
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    fn cancel_reservation(&self) {
        let mut bucket = match self.bucket.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        bucket.tokens = (bucket.tokens + 1.0).min(self.burst);
    }

    /// Blocks until a token is available.  Returns `Cancelled` without
    /// consuming a token if `cancel` fires first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(StreamError::Cancelled);
        }
        let delay = self.reserve();
        if delay.is_zero() {
            return Ok(());
        }
        trace!(delay_ms = delay.as_millis() as u64, "limiter: waiting for token");
        let deadline = Instant::now() + delay;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.cancel_reservation();
                Err(StreamError::Cancelled)
            }
            _ = sleep_until(deadline) => Ok(()),
        }
    }
}
