//! Rate limiting and retry plumbing shared by every API call the stream
//! makes.
//!
//! - [`Limiter`]: token bucket per API tier
//! - [`with_retry`]: limiter wait + retry on server-side throttling
//! - [`Limits`]: per-tier configuration

mod limiter;
mod limits;
mod retry;

pub use limiter::{Limiter, Tier};
pub use limits::{Limits, RequestLimit, TierLimit};
pub use retry::{with_retry, DEFAULT_ATTEMPTS};
