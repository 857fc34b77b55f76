// src/lib.rs
pub mod client;
pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod network;
pub mod processor;
pub mod stream;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use crate::client::{SlackClient, SlackError, Slacker};
pub use crate::config::{Config, StreamOptions};
pub use crate::error::{Result, StreamError};
pub use crate::link::{EntityItem, EntityList, SlackLink};
pub use crate::network::Limits;
pub use crate::stream::{ResultType, Stream, StreamBuilder, StreamResult};

pub use tokio_util::sync::CancellationToken;
