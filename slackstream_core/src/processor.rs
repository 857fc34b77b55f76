// src/processor.rs
//! Sinks the stream hands fetched entities to.
//!
//! Each trait is a narrow capability; a processor implements only what the
//! stream operation it is passed to needs.  All methods take `&self` since
//! the conversation workers share one processor.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AuthTestResponse, Channel, File, Message, SearchMessage, User};

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Called once per page of channel history.  `num_threads` is the
    /// number of threads found on this page that will be fetched next.
    async fn messages(
        &self,
        channel_id: &str,
        num_threads: usize,
        is_last: bool,
        messages: &[Message],
    ) -> Result<()>;

    /// Called once per page of thread replies.  `parent` is the thread
    /// starter, `replies` the rest of the page.
    async fn thread_messages(
        &self,
        channel_id: &str,
        parent: &Message,
        thread_only: bool,
        is_last: bool,
        replies: &[Message],
    ) -> Result<()>;
}

#[async_trait]
pub trait Filer: Send + Sync {
    /// Called once per message that has files attached.
    async fn files(&self, channel: &Channel, parent: &Message, files: &[File]) -> Result<()>;
}

#[async_trait]
pub trait ChannelInformer: Send + Sync {
    /// Called for each channel retrieved.  For a thread requested directly
    /// `thread_ts` holds the parent message timestamp, otherwise it's empty.
    async fn channel_info(&self, channel: &Channel, thread_ts: &str) -> Result<()>;

    async fn channel_users(&self, channel_id: &str, thread_ts: &str, users: &[String])
        -> Result<()>;
}

/// Everything `Stream::conversations` needs.
pub trait Conversations: Messenger + Filer + ChannelInformer {}

impl<T: Messenger + Filer + ChannelInformer + ?Sized> Conversations for T {}

#[async_trait]
pub trait Channels: Send + Sync {
    async fn channels(&self, channels: &[Channel]) -> Result<()>;
}

#[async_trait]
pub trait Users: Send + Sync {
    async fn users(&self, users: &[User]) -> Result<()>;
}

#[async_trait]
pub trait WorkspaceInfo: Send + Sync {
    async fn workspace_info(&self, info: &AuthTestResponse) -> Result<()>;
}

#[async_trait]
pub trait MessageSearcher: ChannelInformer {
    async fn search_messages(&self, query: &str, messages: &[SearchMessage]) -> Result<()>;
}

#[async_trait]
pub trait FileSearcher: Filer {
    async fn search_files(&self, query: &str, files: &[File]) -> Result<()>;
}

pub trait Searcher: MessageSearcher + FileSearcher {}

impl<T: MessageSearcher + FileSearcher + ?Sized> Searcher for T {}

/// Calls several [`Channels`] processors in order, stopping at the first
/// error.
pub struct JointChannels {
    procs: Vec<Box<dyn Channels>>,
}

impl JointChannels {
    pub fn new(procs: Vec<Box<dyn Channels>>) -> Self {
        Self { procs }
    }
}

#[async_trait]
impl Channels for JointChannels {
    async fn channels(&self, channels: &[Channel]) -> Result<()> {
        for p in &self.procs {
            p.channels(channels).await?;
        }
        Ok(())
    }
}

/// Calls several [`Users`] processors in order, stopping at the first error.
pub struct JointUsers {
    procs: Vec<Box<dyn Users>>,
}

impl JointUsers {
    pub fn new(procs: Vec<Box<dyn Users>>) -> Self {
        Self { procs }
    }
}

#[async_trait]
impl Users for JointUsers {
    async fn users(&self, users: &[User]) -> Result<()> {
        for p in &self.procs {
            p.users(users).await?;
        }
        Ok(())
    }
}

pub struct JointMessengers {
    procs: Vec<Box<dyn Messenger>>,
}

impl JointMessengers {
    pub fn new(procs: Vec<Box<dyn Messenger>>) -> Self {
        Self { procs }
    }
}

#[async_trait]
impl Messenger for JointMessengers {
    async fn messages(
        &self,
        channel_id: &str,
        num_threads: usize,
        is_last: bool,
        messages: &[Message],
    ) -> Result<()> {
        for p in &self.procs {
            p.messages(channel_id, num_threads, is_last, messages).await?;
        }
        Ok(())
    }

    async fn thread_messages(
        &self,
        channel_id: &str,
        parent: &Message,
        thread_only: bool,
        is_last: bool,
        replies: &[Message],
    ) -> Result<()> {
        for p in &self.procs {
            p.thread_messages(channel_id, parent, thread_only, is_last, replies)
                .await?;
        }
        Ok(())
    }
}
