use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{SlackError, SlackResult, Slacker};
use crate::types::*;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Wait used when Slack throttles a call without saying for how long.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Slack Web API client over reqwest.
///
/// Makes exactly one HTTP request per call: throttling is reported as
/// [`SlackError::RateLimited`] and retried by the stream, never here.
#[derive(Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> SlackResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("slackstream/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            token: token.into(),
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    /// Points the client at a different API root, e.g. an enterprise proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn api_get(&self, method: &str, params: &[(&str, String)]) -> SlackResult<Value> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(method, "slack api call");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(SlackError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            warn!(method, status = status.as_u16(), "slack server error");
            return Err(SlackError::Status(status.as_u16()));
        }

        let v: Value = resp.json().await?;
        check_ok(v)
    }
}

fn parse_retry_after(s: &str) -> Option<Duration> {
    s.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Maps `{"ok": false, "error": ...}` bodies onto [`SlackError`].
fn check_ok(v: Value) -> SlackResult<Value> {
    if v.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(v);
    }
    let code = v
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    Err(match code.as_str() {
        "ratelimited" | "rate_limited" => SlackError::RateLimited {
            retry_after: DEFAULT_RETRY_AFTER,
        },
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired" => SlackError::InvalidAuth(code),
        _ => SlackError::Api(code),
    })
}

fn next_cursor(v: &Value) -> String {
    v.get("response_metadata")
        .and_then(|m| m.get("next_cursor"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Search responses nest their cursor under the result section.
fn search_next_cursor(v: &Value, section: &str) -> String {
    let top = next_cursor(v);
    if !top.is_empty() {
        return top;
    }
    v.get(section)
        .and_then(|s| s.get("pagination"))
        .and_then(|p| p.get("next_cursor"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// Decodes `v[key]`, treating a missing key as the type's default.
fn field<T: DeserializeOwned + Default>(v: &Value, key: &str) -> SlackResult<T> {
    match v.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(x) => Ok(serde_json::from_value(x.clone())?),
    }
}

fn has_more(v: &Value) -> bool {
    v.get("has_more").and_then(Value::as_bool).unwrap_or(false)
}

fn push_nonempty(params: &mut Vec<(&'static str, String)>, key: &'static str, value: &str) {
    if !value.is_empty() {
        params.push((key, value.to_string()));
    }
}

fn history_query(
    channel: &str,
    cursor: &str,
    limit: u32,
    oldest: &str,
    latest: &str,
    inclusive: bool,
) -> Vec<(&'static str, String)> {
    let mut q = vec![("channel", channel.to_string())];
    push_nonempty(&mut q, "cursor", cursor);
    if limit > 0 {
        q.push(("limit", limit.to_string()));
    }
    push_nonempty(&mut q, "oldest", oldest);
    push_nonempty(&mut q, "latest", latest);
    if inclusive {
        q.push(("inclusive", "true".to_string()));
    }
    q
}

fn search_query(query: &str, p: &SearchParams) -> Vec<(&'static str, String)> {
    let mut q = vec![
        ("query", query.to_string()),
        ("sort", p.sort.clone()),
        ("sort_dir", p.sort_dir.clone()),
        ("count", p.count.to_string()),
    ];
    push_nonempty(&mut q, "cursor", &p.cursor);
    q
}

#[async_trait]
impl Slacker for SlackClient {
    async fn auth_test(&self) -> SlackResult<AuthTestResponse> {
        let v = self.api_get("auth.test", &[]).await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn get_conversation_history(&self, p: &HistoryParams) -> SlackResult<HistoryPage> {
        let q = history_query(
            &p.channel_id,
            &p.cursor,
            p.limit,
            &p.oldest,
            &p.latest,
            p.inclusive,
        );
        let v = self.api_get("conversations.history", &q).await?;
        Ok(HistoryPage {
            messages: field(&v, "messages")?,
            has_more: has_more(&v),
            next_cursor: next_cursor(&v),
        })
    }

    async fn get_conversation_replies(&self, p: &RepliesParams) -> SlackResult<RepliesPage> {
        let mut q = history_query(
            &p.channel_id,
            &p.cursor,
            p.limit,
            &p.oldest,
            &p.latest,
            p.inclusive,
        );
        q.push(("ts", p.ts.clone()));
        let v = self.api_get("conversations.replies", &q).await?;
        Ok(RepliesPage {
            messages: field(&v, "messages")?,
            has_more: has_more(&v),
            next_cursor: next_cursor(&v),
        })
    }

    async fn get_users_page(&self, cursor: &str, limit: u32) -> SlackResult<UsersPage> {
        let mut q = vec![("limit", limit.max(1).to_string())];
        push_nonempty(&mut q, "cursor", cursor);
        let v = self.api_get("users.list", &q).await?;
        Ok(UsersPage {
            users: field(&v, "members")?,
            next_cursor: next_cursor(&v),
        })
    }

    async fn get_starred(&self, p: &StarredParams) -> SlackResult<StarredPage> {
        let mut q = Vec::new();
        push_nonempty(&mut q, "cursor", &p.cursor);
        if p.limit > 0 {
            q.push(("limit", p.limit.to_string()));
        }
        let v = self.api_get("stars.list", &q).await?;
        Ok(StarredPage {
            items: field(&v, "items")?,
            next_cursor: next_cursor(&v),
        })
    }

    async fn list_bookmarks(&self, channel_id: &str) -> SlackResult<Vec<Bookmark>> {
        let v = self
            .api_get("bookmarks.list", &[("channel_id", channel_id.to_string())])
            .await?;
        field(&v, "bookmarks")
    }

    async fn get_conversations(&self, p: &ConversationsParams) -> SlackResult<ChannelsPage> {
        let mut q = vec![
            ("types", p.types.join(",")),
            ("limit", p.limit.max(1).to_string()),
            ("exclude_archived", p.exclude_archived.to_string()),
        ];
        push_nonempty(&mut q, "cursor", &p.cursor);
        push_nonempty(&mut q, "team_id", &p.team_id);
        let v = self.api_get("conversations.list", &q).await?;
        Ok(ChannelsPage {
            channels: field(&v, "channels")?,
            next_cursor: next_cursor(&v),
        })
    }

    async fn get_conversation_info(&self, p: &ConversationInfoParams) -> SlackResult<Channel> {
        let q = [
            ("channel", p.channel_id.clone()),
            ("include_locale", p.include_locale.to_string()),
            ("include_num_members", p.include_num_members.to_string()),
        ];
        let v = self.api_get("conversations.info", &q).await?;
        field(&v, "channel")
    }

    async fn get_users_in_conversation(
        &self,
        p: &UsersInConversationParams,
    ) -> SlackResult<MembersPage> {
        let mut q = vec![("channel", p.channel_id.clone())];
        push_nonempty(&mut q, "cursor", &p.cursor);
        if p.limit > 0 {
            q.push(("limit", p.limit.to_string()));
        }
        let v = self.api_get("conversations.members", &q).await?;
        Ok(MembersPage {
            members: field(&v, "members")?,
            next_cursor: next_cursor(&v),
        })
    }

    async fn search_messages(
        &self,
        query: &str,
        p: &SearchParams,
    ) -> SlackResult<SearchMessagesPage> {
        let v = self
            .api_get("search.messages", &search_query(query, p))
            .await?;
        let matches = match v.get("messages") {
            Some(section) => field(section, "matches")?,
            None => Vec::new(),
        };
        Ok(SearchMessagesPage {
            matches,
            next_cursor: search_next_cursor(&v, "messages"),
        })
    }

    async fn search_files(&self, query: &str, p: &SearchParams) -> SlackResult<SearchFilesPage> {
        let v = self.api_get("search.files", &search_query(query, p)).await?;
        let matches = match v.get("files") {
            Some(section) => field(section, "matches")?,
            None => Vec::new(),
        };
        Ok(SearchFilesPage {
            matches,
            next_cursor: search_next_cursor(&v, "files"),
        })
    }

    async fn get_file_info(
        &self,
        file_id: &str,
        count: u32,
        page: u32,
    ) -> SlackResult<Option<File>> {
        let q = [
            ("file", file_id.to_string()),
            ("count", count.to_string()),
            ("page", page.to_string()),
        ];
        let v = self.api_get("files.info", &q).await?;
        field(&v, "file")
    }

    async fn get_user_info(&self, user_id: &str) -> SlackResult<User> {
        let v = self
            .api_get("users.info", &[("user", user_id.to_string())])
            .await?;
        field(&v, "user")
    }
}
