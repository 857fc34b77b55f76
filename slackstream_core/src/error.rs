// src/error.rs
use crate::client::SlackError;
use crate::stream::ResultType;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Slack(#[from] SlackError),

    #[error("callback was unable to complete without errors within {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: SlackError },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid link: {0:?}")]
    InvalidLink(String),

    #[error("unsupported URL type: {0:?}")]
    UnsupportedUrl(String),

    #[error("channel_not_found: {0}")]
    ChannelNotFound(String),

    #[error("processor error: {0}")]
    Processor(String),

    #[error("{context}: {source}")]
    Callback {
        context: String,
        #[source]
        source: Box<StreamError>,
    },

    #[error("{kind} channel {link}: {source}")]
    Result {
        kind: ResultType,
        channel_id: String,
        thread_ts: String,
        link: String,
        #[source]
        source: Box<StreamError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl StreamError {
    /// Wraps `self` with a short description of where it happened.
    pub fn context(self, context: impl Into<String>) -> Self {
        StreamError::Callback {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Walks `Callback` and `Result` wrappers down to the originating error.
    pub fn root(&self) -> &StreamError {
        match self {
            StreamError::Callback { source, .. } | StreamError::Result { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), StreamError::Cancelled)
    }

    pub fn is_channel_not_found(&self) -> bool {
        matches!(self.root(), StreamError::ChannelNotFound(_))
    }

    pub fn is_invalid_auth(&self) -> bool {
        match self.root() {
            StreamError::Slack(e) => e.is_invalid_auth(),
            StreamError::RetryExhausted { last, .. } => last.is_invalid_auth(),
            _ => false,
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            StreamError::Slack(e) => e.code_str(),
            StreamError::RetryExhausted { .. } => "retry_exhausted",
            StreamError::Cancelled => "cancelled",
            StreamError::InvalidLink(_) => "invalid_link",
            StreamError::UnsupportedUrl(_) => "unsupported_url",
            StreamError::ChannelNotFound(_) => "channel_not_found",
            StreamError::Processor(_) => "processor_error",
            StreamError::Callback { source, .. } | StreamError::Result { source, .. } => {
                source.code_str()
            }
            StreamError::Config(_) => "config_error",
            StreamError::Io(_) => "io_error",
            StreamError::SerdeJson(_) | StreamError::Toml(_) => "parse_error",
        }
    }
}
