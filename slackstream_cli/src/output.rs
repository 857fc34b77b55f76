//! JSON-lines processor: one object per processor callback, tagged by
//! `kind`.

use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

use slackstream_core::processor::{
    ChannelInformer, Channels, FileSearcher, Filer, MessageSearcher, Messenger, Users,
    WorkspaceInfo,
};
use slackstream_core::types::{AuthTestResponse, Channel, File, Message, SearchMessage, User};
use slackstream_core::{Result, StreamError};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Messages {
        channel_id: &'a str,
        num_threads: usize,
        is_last: bool,
        messages: &'a [Message],
    },
    ThreadMessages {
        channel_id: &'a str,
        parent: &'a Message,
        thread_only: bool,
        is_last: bool,
        replies: &'a [Message],
    },
    Files {
        channel_id: &'a str,
        parent_ts: &'a str,
        files: &'a [File],
    },
    ChannelInfo {
        channel: &'a Channel,
        #[serde(skip_serializing_if = "str::is_empty")]
        thread_ts: &'a str,
    },
    ChannelUsers {
        channel_id: &'a str,
        users: &'a [String],
    },
    Channels {
        channels: &'a [Channel],
    },
    Users {
        users: &'a [User],
    },
    Workspace {
        info: &'a AuthTestResponse,
    },
    SearchMessages {
        query: &'a str,
        messages: &'a [SearchMessage],
    },
    SearchFiles {
        query: &'a str,
        files: &'a [File],
    },
}

pub struct JsonLines<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, rec: &Record<'_>) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| StreamError::Processor("output lock poisoned".to_string()))?;
        serde_json::to_writer(&mut *out, rec)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> Messenger for JsonLines<W> {
    async fn messages(
        &self,
        channel_id: &str,
        num_threads: usize,
        is_last: bool,
        messages: &[Message],
    ) -> Result<()> {
        self.emit(&Record::Messages {
            channel_id,
            num_threads,
            is_last,
            messages,
        })
    }

    async fn thread_messages(
        &self,
        channel_id: &str,
        parent: &Message,
        thread_only: bool,
        is_last: bool,
        replies: &[Message],
    ) -> Result<()> {
        self.emit(&Record::ThreadMessages {
            channel_id,
            parent,
            thread_only,
            is_last,
            replies,
        })
    }
}

#[async_trait]
impl<W: Write + Send> Filer for JsonLines<W> {
    async fn files(&self, channel: &Channel, parent: &Message, files: &[File]) -> Result<()> {
        self.emit(&Record::Files {
            channel_id: &channel.id,
            parent_ts: &parent.ts,
            files,
        })
    }
}

#[async_trait]
impl<W: Write + Send> ChannelInformer for JsonLines<W> {
    async fn channel_info(&self, channel: &Channel, thread_ts: &str) -> Result<()> {
        self.emit(&Record::ChannelInfo { channel, thread_ts })
    }

    async fn channel_users(
        &self,
        channel_id: &str,
        _thread_ts: &str,
        users: &[String],
    ) -> Result<()> {
        self.emit(&Record::ChannelUsers { channel_id, users })
    }
}

#[async_trait]
impl<W: Write + Send> Channels for JsonLines<W> {
    async fn channels(&self, channels: &[Channel]) -> Result<()> {
        self.emit(&Record::Channels { channels })
    }
}

#[async_trait]
impl<W: Write + Send> Users for JsonLines<W> {
    async fn users(&self, users: &[User]) -> Result<()> {
        self.emit(&Record::Users { users })
    }
}

#[async_trait]
impl<W: Write + Send> WorkspaceInfo for JsonLines<W> {
    async fn workspace_info(&self, info: &AuthTestResponse) -> Result<()> {
        self.emit(&Record::Workspace { info })
    }
}

#[async_trait]
impl<W: Write + Send> MessageSearcher for JsonLines<W> {
    async fn search_messages(&self, query: &str, messages: &[SearchMessage]) -> Result<()> {
        self.emit(&Record::SearchMessages { query, messages })
    }
}

#[async_trait]
impl<W: Write + Send> FileSearcher for JsonLines<W> {
    async fn search_files(&self, query: &str, files: &[File]) -> Result<()> {
        self.emit(&Record::SearchFiles { query, files })
    }
}
