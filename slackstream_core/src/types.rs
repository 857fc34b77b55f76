//! Normalized Slack entities and the parameter/page structs exchanged with
//! a [`Slacker`](crate::client::Slacker).
//!
//! Only the fields the stream inspects are typed; everything else the API
//! returns is kept in `extra` so processors can record the full object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Subtype of a reply that was also posted to the channel.
pub const SUBTYPE_THREAD_BROADCAST: &str = "thread_broadcast";

/// `latest_reply` value Slack reports for a thread whose replies are all gone.
pub const LATEST_REPLY_NO_REPLIES: &str = "0000000000.000000";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub ts: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_ts: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtype: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_reply: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// True if this message starts a thread that still has replies, i.e. a
    /// thread worth fetching.  Broadcast replies carry the parent's
    /// `thread_ts` too, so they are excluded.
    pub fn is_thread_starter(&self) -> bool {
        !self.thread_ts.is_empty()
            && self.subtype != SUBTYPE_THREAD_BROADCAST
            && self.latest_reply != LATEST_REPLY_NO_REPLIES
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mimetype: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url_private: String,
    #[serde(default)]
    pub size: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub is_empty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<Canvas>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub is_channel: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_mpim: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_members: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ChannelProperties>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Channel {
    /// A channel that carries nothing but its ID.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// File ID of the channel canvas, if the channel has a non-empty one.
    pub fn canvas_file_id(&self) -> Option<&str> {
        self.properties
            .as_ref()
            .and_then(|p| p.canvas.as_ref())
            .filter(|c| !c.is_empty && !c.file_id.is_empty())
            .map(|c| c.file_id.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub real_name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthTestResponse {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub enterprise_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bot_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchChannel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub channel: SearchChannel,
    #[serde(default)]
    pub permalink: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarredItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<File>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryParams {
    pub channel_id: String,
    pub cursor: String,
    pub limit: u32,
    pub oldest: String,
    pub latest: String,
    pub inclusive: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepliesParams {
    pub channel_id: String,
    pub ts: String,
    pub cursor: String,
    pub limit: u32,
    pub oldest: String,
    pub latest: String,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationsParams {
    pub types: Vec<String>,
    pub cursor: String,
    pub limit: u32,
    pub exclude_archived: bool,
    pub team_id: String,
}

impl Default for ConversationsParams {
    fn default() -> Self {
        Self {
            types: vec![
                "public_channel".to_string(),
                "private_channel".to_string(),
                "mpim".to_string(),
                "im".to_string(),
            ],
            cursor: String::new(),
            limit: 100,
            exclude_archived: false,
            team_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationInfoParams {
    pub channel_id: String,
    pub include_locale: bool,
    pub include_num_members: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsersInConversationParams {
    pub channel_id: String,
    pub cursor: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub sort: String,
    pub sort_dir: String,
    pub count: u32,
    pub cursor: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            sort: "timestamp".to_string(),
            sort_dir: "desc".to_string(),
            count: 100,
            cursor: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarredParams {
    pub cursor: String,
    pub limit: u32,
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepliesPage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsersPage {
    pub users: Vec<User>,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembersPage {
    pub members: Vec<String>,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelsPage {
    pub channels: Vec<Channel>,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchMessagesPage {
    pub matches: Vec<SearchMessage>,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilesPage {
    pub matches: Vec<File>,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarredPage {
    pub items: Vec<StarredItem>,
    pub next_cursor: String,
}
