//! Concurrent extraction of channels, threads, users and search results.
//!
//! [`Stream::conversations`] is the heart of it: entity items are sorted
//! into channel and thread requests, channel workers page through history
//! and discover threads, thread workers page through replies, and a single
//! consumer drains the results and runs the registered callbacks.  The
//! simpler listings (`users`, `list_channels`, search) are plain paginated
//! loops over the same limiter and retry plumbing.

mod cache;
mod conversation;
mod listing;
mod result;
mod search;
mod workers;

pub use result::{ResultType, StreamResult};
pub use search::SEARCH_CHANNEL_ID;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::client::Slacker;
use crate::config::StreamOptions;
use crate::error::Result;
use crate::network::{Limiter, Limits, Tier};
use cache::ChanCache;

/// Callback run for every successful [`StreamResult`].
pub type ResultFn = Box<dyn Fn(&StreamResult) -> Result<()> + Send + Sync>;

/// One limiter per API tier family, plus the configuration the retry
/// budgets come from.
#[derive(Debug)]
pub(crate) struct RateLimits {
    /// history, conversation info, conversation list
    pub(crate) channels: Limiter,
    /// replies
    pub(crate) threads: Limiter,
    /// users list
    pub(crate) users: Limiter,
    /// user info, conversation members, file info
    pub(crate) userinfo: Limiter,
    pub(crate) searchmsg: Limiter,
    pub(crate) searchfiles: Limiter,
    pub(crate) tier: Limits,
}

impl RateLimits {
    pub(crate) fn new(l: Limits) -> Self {
        Self {
            channels: Limiter::for_tier(Tier::Tier3, l.tier3.burst, l.tier3.boost),
            threads: Limiter::for_tier(Tier::Tier3, l.tier3.burst, l.tier3.boost),
            users: Limiter::for_tier(Tier::Tier2, l.tier2.burst, l.tier2.boost),
            userinfo: Limiter::for_tier(Tier::Tier4, l.tier4.burst, l.tier4.boost),
            searchmsg: Limiter::for_tier(Tier::Tier2, l.tier2.burst, l.tier2.boost),
            searchfiles: Limiter::for_tier(Tier::Tier2, l.tier2.burst, l.tier2.boost),
            tier: l,
        }
    }
}

/// Streams Slack entities to processors.  Built once per extraction run
/// with [`Stream::builder`].
pub struct Stream {
    oldest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    client: Arc<dyn Slacker>,
    limits: RateLimits,
    chan_cache: ChanCache,
    opts: StreamOptions,
    result_fns: Vec<ResultFn>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("oldest", &self.oldest)
            .field("latest", &self.latest)
            .field("limits", &self.limits.tier)
            .field("opts", &self.opts)
            .field("result_fns", &self.result_fns.len())
            .finish_non_exhaustive()
    }
}

impl Stream {
    pub fn builder(client: Arc<dyn Slacker>, limits: Limits) -> StreamBuilder {
        StreamBuilder {
            client,
            limits,
            opts: StreamOptions::default(),
            oldest: None,
            latest: None,
            result_fns: Vec::new(),
        }
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.oldest
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.latest
    }

    pub fn options(&self) -> &StreamOptions {
        &self.opts
    }
}

pub struct StreamBuilder {
    client: Arc<dyn Slacker>,
    limits: Limits,
    opts: StreamOptions,
    oldest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    result_fns: Vec<ResultFn>,
}

impl StreamBuilder {
    pub fn oldest(mut self, t: DateTime<Utc>) -> Self {
        self.oldest = Some(t);
        self
    }

    pub fn latest(mut self, t: DateTime<Utc>) -> Self {
        self.latest = Some(t);
        self
    }

    pub fn options(mut self, opts: StreamOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn inclusive(mut self, b: bool) -> Self {
        self.opts.inclusive = b;
        self
    }

    pub fn fast_search(mut self, b: bool) -> Self {
        self.opts.fast_search = b;
        self
    }

    /// When disabled (the default), channels that no longer exist are
    /// logged and skipped.
    pub fn fail_on_channel_not_found(mut self, b: bool) -> Self {
        self.opts.fail_on_channel_not_found = b;
        self
    }

    pub fn workers(mut self, channel_workers: usize, thread_workers: usize) -> Self {
        self.opts.channel_workers = channel_workers;
        self.opts.thread_workers = thread_workers;
        self
    }

    /// Registers a callback for every successful result.  Callbacks run in
    /// registration order; the first error ends the stream operation.
    pub fn result_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&StreamResult) -> Result<()> + Send + Sync + 'static,
    {
        self.result_fns.push(Box::new(f));
        self
    }

    pub fn build(self) -> Result<Stream> {
        self.limits.validate()?;
        self.opts.validate()?;

        let (mut oldest, mut latest) = (self.oldest, self.latest);
        if let (Some(o), Some(l)) = (oldest, latest) {
            if o > l {
                std::mem::swap(&mut oldest, &mut latest);
            }
        }

        Ok(Stream {
            oldest,
            latest,
            client: self.client,
            limits: RateLimits::new(self.limits),
            chan_cache: ChanCache::default(),
            opts: self.opts,
            result_fns: self.result_fns,
        })
    }
}
