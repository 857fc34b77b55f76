use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// API limits for one run.  Values missing from a config file fall back to
/// [`Limits::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Number of parallel file downloads.
    pub workers: u32,
    /// Retries when a file download gets rate limited.
    pub download_retries: u32,
    #[serde(rename = "tier_2")]
    pub tier2: TierLimit,
    #[serde(rename = "tier_3")]
    pub tier3: TierLimit,
    #[serde(rename = "tier_4")]
    pub tier4: TierLimit,
    #[serde(rename = "per_request")]
    pub request: RequestLimit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimit {
    /// Extra events per minute on top of the tier's base rate.
    pub boost: u32,
    /// Must be at least 1, otherwise the limiter would never let anything through.
    pub burst: u32,
    /// Attempts when the API reports throttling.
    pub retries: u32,
}

/// Page sizes requested from the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimit {
    /// Messages per `conversations.history` call.
    pub conversations: u32,
    /// Channels per `conversations.list` call.
    pub channels: u32,
    /// Replies per `conversations.replies` call.  The API default is 1000
    /// but large threads fail with it.
    pub replies: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            workers: 4,
            download_retries: 3,
            tier2: TierLimit {
                boost: 20,
                burst: 3,
                retries: 20,
            },
            tier3: TierLimit {
                boost: 120,
                burst: 5,
                retries: 3,
            },
            tier4: TierLimit {
                boost: 10,
                burst: 7,
                retries: 3,
            },
            request: RequestLimit {
                conversations: 100,
                channels: 100,
                replies: 200,
            },
        }
    }
}

const NO_TIER_LIMITS: TierLimit = TierLimit {
    boost: 10_000,
    burst: 10_000,
    retries: 3,
};

impl Limits {
    /// Limits high enough to effectively disable throttling.
    pub fn no_limits() -> Self {
        Self {
            workers: 4,
            download_retries: 3,
            tier2: NO_TIER_LIMITS,
            tier3: NO_TIER_LIMITS,
            tier4: NO_TIER_LIMITS,
            request: RequestLimit {
                conversations: 100,
                channels: 100,
                replies: 1000,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, tier) in [
            ("tier_2", &self.tier2),
            ("tier_3", &self.tier3),
            ("tier_4", &self.tier4),
        ] {
            if tier.burst < 1 {
                return Err(StreamError::Config(format!("{name}.burst must be >= 1")));
            }
        }
        check_range("per_request.conversations", self.request.conversations, 100)?;
        check_range("per_request.channels", self.request.channels, 1000)?;
        check_range("per_request.replies", self.request.replies, 1000)?;
        Ok(())
    }

    /// Takes every value of `other` that differs from ours, then validates.
    pub fn apply(&mut self, other: &Limits) -> Result<()> {
        apply(&mut self.workers, other.workers);
        apply(&mut self.download_retries, other.download_retries);
        apply(&mut self.tier2, other.tier2);
        apply(&mut self.tier3, other.tier3);
        apply(&mut self.tier4, other.tier4);
        apply(&mut self.request, other.request);
        self.validate()
    }
}

fn check_range(name: &str, v: u32, max: u32) -> Result<()> {
    if v == 0 || v > max {
        return Err(StreamError::Config(format!(
            "{name} must be in 1..={max}, got {v}"
        )));
    }
    Ok(())
}

fn apply<T: PartialEq>(this: &mut T, other: T) {
    if *this != other {
        *this = other;
    }
}
