use std::fmt;

use crate::error::{Result, StreamError};
use crate::link::SlackLink;

/// What a [`StreamResult`] reports on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResultType {
    /// The orchestrator itself, e.g. an unparseable entity.
    #[default]
    Main,
    Channel,
    Thread,
    ChannelInfo,
    Search,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultType::Main => "Main",
            ResultType::Channel => "Channel",
            ResultType::Thread => "Thread",
            ResultType::ChannelInfo => "ChannelInfo",
            ResultType::Search => "Search",
        };
        f.write_str(s)
    }
}

/// Outcome of one unit of work: a channel page, a thread page, a search
/// page, or a failure.
///
/// Exactly one result with `is_last` set is produced for every channel and
/// every thread that completes.  A channel's `is_last` says nothing about
/// its threads, which are fetched independently.
#[derive(Debug, Default)]
pub struct StreamResult {
    pub kind: ResultType,
    pub channel_id: String,
    pub thread_ts: String,
    /// Threads discovered on this channel page.
    pub thread_count: usize,
    pub is_last: bool,
    /// Entities in the page; set for search results only.
    pub count: usize,
    pub err: Option<StreamError>,
}

impl StreamResult {
    pub(crate) fn failed(
        kind: ResultType,
        channel_id: impl Into<String>,
        thread_ts: impl Into<String>,
        err: StreamError,
    ) -> Self {
        Self {
            kind,
            channel_id: channel_id.into(),
            thread_ts: thread_ts.into(),
            err: Some(err),
            ..Default::default()
        }
    }

    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }

    pub fn link(&self) -> SlackLink {
        SlackLink::thread(self.channel_id.clone(), self.thread_ts.clone())
    }

    /// Passes a successful result through; a failed one becomes the error
    /// returned to the caller, keeping where it happened.
    pub fn check(mut self) -> Result<Self> {
        let Some(source) = self.err.take() else {
            return Ok(self);
        };
        let link = self.link();
        Err(StreamError::Result {
            kind: self.kind,
            link: link.to_string(),
            channel_id: self.channel_id,
            thread_ts: self.thread_ts,
            source: Box::new(source),
        })
    }
}

impl fmt::Display for StreamResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResultType::Search => f.write_str("<search>"),
            _ if self.thread_ts.is_empty() => write!(f, "<{}>", self.channel_id),
            _ => write!(f, "<{}[{}:{}]>", self.kind, self.channel_id, self.thread_ts),
        }
    }
}
