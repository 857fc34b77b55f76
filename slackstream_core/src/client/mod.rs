//! The Slack Web API surface the stream depends on.
//!
//! [`Slacker`] is the seam between the stream and the network: the
//! reqwest-backed [`SlackClient`] implements it for real runs, tests plug in
//! scripted fakes.

mod http;

pub use http::{SlackClient, SLACK_API_BASE};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Result, StreamError};
use crate::types::*;

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("slack rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("authentication error: {0}")]
    InvalidAuth(String),

    #[error("slack API error: {0}")]
    Api(String),

    #[error("slack server error: HTTP {0}")]
    Status(u16),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("pagination complete")]
    PaginationComplete,
}

impl SlackError {
    pub fn is_invalid_auth(&self) -> bool {
        matches!(self, SlackError::InvalidAuth(_))
    }

    /// True if this is an `{"ok": false}` response carrying `code`.
    pub fn is_api_error(&self, code: &str) -> bool {
        matches!(self, SlackError::Api(c) if c == code)
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            SlackError::RateLimited { .. } => "rate_limited",
            SlackError::InvalidAuth(_) => "auth_failed",
            SlackError::Api(_) => "api_error",
            SlackError::Status(_) | SlackError::Http(_) => "upstream_error",
            SlackError::Decode(_) => "parse_error",
            SlackError::PaginationComplete => "pagination_complete",
        }
    }
}

pub type SlackResult<T> = std::result::Result<T, SlackError>;

/// Slack Web API methods used by the stream.  Every method may fail with
/// [`SlackError::RateLimited`], which callers retry, or
/// [`SlackError::InvalidAuth`], which they never do.
#[async_trait]
pub trait Slacker: Send + Sync {
    async fn auth_test(&self) -> SlackResult<AuthTestResponse>;

    async fn get_conversation_history(&self, params: &HistoryParams) -> SlackResult<HistoryPage>;

    async fn get_conversation_replies(&self, params: &RepliesParams) -> SlackResult<RepliesPage>;

    /// One page of `users.list`.  Use [`UsersPaginator`] to walk them all.
    async fn get_users_page(&self, cursor: &str, limit: u32) -> SlackResult<UsersPage>;

    async fn get_starred(&self, params: &StarredParams) -> SlackResult<StarredPage>;

    async fn list_bookmarks(&self, channel_id: &str) -> SlackResult<Vec<Bookmark>>;

    async fn get_conversations(&self, params: &ConversationsParams) -> SlackResult<ChannelsPage>;

    async fn get_conversation_info(&self, params: &ConversationInfoParams)
        -> SlackResult<Channel>;

    async fn get_users_in_conversation(
        &self,
        params: &UsersInConversationParams,
    ) -> SlackResult<MembersPage>;

    async fn search_messages(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> SlackResult<SearchMessagesPage>;

    async fn search_files(&self, query: &str, params: &SearchParams)
        -> SlackResult<SearchFilesPage>;

    async fn get_file_info(&self, file_id: &str, count: u32, page: u32)
        -> SlackResult<Option<File>>;

    async fn get_user_info(&self, user_id: &str) -> SlackResult<User>;
}

/// Walks `users.list`.  Unlike the cursor loops elsewhere, the end of the
/// listing is signalled by [`SlackError::PaginationComplete`] from
/// [`UsersPaginator::next`] once the last page has been handed out.
#[derive(Debug, Clone)]
pub struct UsersPaginator {
    limit: u32,
    cursor: Option<String>,
}

impl UsersPaginator {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            cursor: Some(String::new()),
        }
    }

    pub async fn next(&self, client: &dyn Slacker) -> SlackResult<UsersPage> {
        match &self.cursor {
            Some(cursor) => client.get_users_page(cursor, self.limit).await,
            None => Err(SlackError::PaginationComplete),
        }
    }

    /// Moves past `page`.
    pub fn advance(&mut self, page: &UsersPage) {
        self.cursor = if page.next_cursor.is_empty() {
            None
        } else {
            Some(page.next_cursor.clone())
        };
    }

    /// Translates the error that stopped the walk: the completion signal
    /// becomes success, anything else is passed through.
    pub fn failure(err: StreamError) -> Result<()> {
        match err {
            StreamError::Slack(SlackError::PaginationComplete) => Ok(()),
            other => Err(other),
        }
    }
}
