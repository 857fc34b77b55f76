//! Scripted Slack API and a recording processor for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{SlackError, SlackResult, Slacker};
use crate::error::Result;
use crate::network::Limits;
use crate::processor::{
    ChannelInformer, Channels, FileSearcher, Filer, MessageSearcher, Messenger, Users,
    WorkspaceInfo,
};
use crate::stream::{Stream, StreamBuilder};
use crate::types::*;

pub(crate) fn message(ts: &str) -> Message {
    Message {
        ts: ts.to_string(),
        ..Default::default()
    }
}

pub(crate) fn thread_starter(ts: &str, reply_count: u32) -> Message {
    Message {
        ts: ts.to_string(),
        thread_ts: ts.to_string(),
        latest_reply: ts.to_string(),
        reply_count: Some(reply_count),
        ..Default::default()
    }
}

pub(crate) fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: id.to_lowercase(),
        ..Default::default()
    }
}

pub(crate) fn search_hit(channel_id: &str, ts: &str) -> SearchMessage {
    SearchMessage {
        ts: ts.to_string(),
        channel: SearchChannel {
            id: channel_id.to_string(),
            name: channel_id.to_lowercase(),
        },
        ..Default::default()
    }
}

/// Returns page `cursor` of `pages`; cursors are page indexes, `""` and
/// `"*"` mean the first page.
fn page_at<T: Clone>(pages: &[Vec<T>], cursor: &str) -> (Vec<T>, String, bool) {
    let i = match cursor {
        "" | "*" => 0,
        c => c.parse().unwrap_or(usize::MAX),
    };
    let Some(items) = pages.get(i) else {
        return (Vec::new(), String::new(), false);
    };
    let has_more = i + 1 < pages.len();
    let next = if has_more {
        (i + 1).to_string()
    } else {
        String::new()
    };
    (items.clone(), next, has_more)
}

fn channel_not_found() -> SlackError {
    SlackError::Api("channel_not_found".to_string())
}

/// Time range a history or replies request was made with.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RangeCall {
    pub(crate) channel_id: String,
    pub(crate) thread_ts: String,
    pub(crate) oldest: String,
    pub(crate) latest: String,
}

#[derive(Default)]
struct Script {
    channels: HashMap<String, Channel>,
    history: HashMap<String, Vec<Vec<Message>>>,
    replies: HashMap<(String, String), Vec<Vec<Message>>>,
    members: HashMap<String, Vec<Vec<String>>>,
    user_pages: Vec<Vec<User>>,
    channel_list: Vec<Vec<Channel>>,
    users: HashMap<String, User>,
    files: HashMap<String, File>,
    search_messages: Vec<Vec<SearchMessage>>,
    search_files: Vec<Vec<File>>,
    ranges: Vec<RangeCall>,
}

/// In-memory [`Slacker`].  Unknown channels answer `channel_not_found`,
/// unknown threads an empty page.
#[derive(Default)]
pub(crate) struct FakeSlack {
    script: Mutex<Script>,
    info: AtomicUsize,
    history: AtomicUsize,
    replies: AtomicUsize,
    users: AtomicUsize,
}

impl FakeSlack {
    pub(crate) fn builder(fake: Arc<FakeSlack>) -> StreamBuilder {
        Stream::builder(fake, Limits::no_limits())
    }

    pub(crate) fn stream(fake: Arc<FakeSlack>) -> Stream {
        Self::builder(fake).build().expect("valid stream")
    }

    pub(crate) fn add_channel(&self, ch: Channel) {
        self.script
            .lock()
            .unwrap()
            .channels
            .insert(ch.id.clone(), ch);
    }

    pub(crate) fn set_history(&self, channel_id: &str, pages: Vec<Vec<Message>>) {
        self.script
            .lock()
            .unwrap()
            .history
            .insert(channel_id.to_string(), pages);
    }

    pub(crate) fn set_replies(&self, channel_id: &str, ts: &str, pages: Vec<Vec<Message>>) {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert((channel_id.to_string(), ts.to_string()), pages);
    }

    pub(crate) fn set_members(&self, channel_id: &str, pages: Vec<Vec<&str>>) {
        let pages = pages
            .into_iter()
            .map(|p| p.into_iter().map(str::to_string).collect())
            .collect();
        self.script
            .lock()
            .unwrap()
            .members
            .insert(channel_id.to_string(), pages);
    }

    pub(crate) fn set_users(&self, pages: Vec<Vec<User>>) {
        self.script.lock().unwrap().user_pages = pages;
    }

    pub(crate) fn set_channel_list(&self, pages: Vec<Vec<Channel>>) {
        self.script.lock().unwrap().channel_list = pages;
    }

    pub(crate) fn add_user(&self, u: User) {
        self.script.lock().unwrap().users.insert(u.id.clone(), u);
    }

    pub(crate) fn add_file(&self, f: File) {
        self.script.lock().unwrap().files.insert(f.id.clone(), f);
    }

    pub(crate) fn set_search_messages(&self, pages: Vec<Vec<SearchMessage>>) {
        self.script.lock().unwrap().search_messages = pages;
    }

    pub(crate) fn set_search_files(&self, pages: Vec<Vec<File>>) {
        self.script.lock().unwrap().search_files = pages;
    }

    pub(crate) fn info_calls(&self) -> usize {
        self.info.load(Ordering::SeqCst)
    }

    pub(crate) fn history_calls(&self) -> usize {
        self.history.load(Ordering::SeqCst)
    }

    pub(crate) fn replies_calls(&self) -> usize {
        self.replies.load(Ordering::SeqCst)
    }

    pub(crate) fn users_calls(&self) -> usize {
        self.users.load(Ordering::SeqCst)
    }

    /// Range of the first history (empty `thread_ts`) or replies request
    /// for the given channel and thread.
    pub(crate) fn range_of(&self, channel_id: &str, thread_ts: &str) -> Option<RangeCall> {
        self.script
            .lock()
            .unwrap()
            .ranges
            .iter()
            .find(|r| r.channel_id == channel_id && r.thread_ts == thread_ts)
            .cloned()
    }
}

#[async_trait]
impl Slacker for FakeSlack {
    async fn auth_test(&self) -> SlackResult<AuthTestResponse> {
        Ok(AuthTestResponse {
            team: "fake".to_string(),
            team_id: "T0FAKE".to_string(),
            user_id: "U0FAKE".to_string(),
            ..Default::default()
        })
    }

    async fn get_conversation_history(&self, params: &HistoryParams) -> SlackResult<HistoryPage> {
        self.history.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        script.ranges.push(RangeCall {
            channel_id: params.channel_id.clone(),
            thread_ts: String::new(),
            oldest: params.oldest.clone(),
            latest: params.latest.clone(),
        });
        let pages = script
            .history
            .get(&params.channel_id)
            .ok_or_else(channel_not_found)?;
        let (messages, next_cursor, has_more) = page_at(pages, &params.cursor);
        Ok(HistoryPage {
            messages,
            has_more,
            next_cursor,
        })
    }

    async fn get_conversation_replies(&self, params: &RepliesParams) -> SlackResult<RepliesPage> {
        self.replies.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        script.ranges.push(RangeCall {
            channel_id: params.channel_id.clone(),
            thread_ts: params.ts.clone(),
            oldest: params.oldest.clone(),
            latest: params.latest.clone(),
        });
        let key = (params.channel_id.clone(), params.ts.clone());
        let (messages, next_cursor, has_more) = script
            .replies
            .get(&key)
            .map(|pages| page_at(pages, &params.cursor))
            .unwrap_or_default();
        Ok(RepliesPage {
            messages,
            has_more,
            next_cursor,
        })
    }

    async fn get_users_page(&self, cursor: &str, _limit: u32) -> SlackResult<UsersPage> {
        self.users.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        let (users, next_cursor, _) = page_at(&script.user_pages, cursor);
        Ok(UsersPage { users, next_cursor })
    }

    async fn get_starred(&self, _params: &StarredParams) -> SlackResult<StarredPage> {
        Ok(StarredPage::default())
    }

    async fn list_bookmarks(&self, _channel_id: &str) -> SlackResult<Vec<Bookmark>> {
        Ok(Vec::new())
    }

    async fn get_conversations(&self, params: &ConversationsParams) -> SlackResult<ChannelsPage> {
        let script = self.script.lock().unwrap();
        let (channels, next_cursor, _) = page_at(&script.channel_list, &params.cursor);
        Ok(ChannelsPage {
            channels,
            next_cursor,
        })
    }

    async fn get_conversation_info(
        &self,
        params: &ConversationInfoParams,
    ) -> SlackResult<Channel> {
        self.info.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        script
            .channels
            .get(&params.channel_id)
            .cloned()
            .ok_or_else(channel_not_found)
    }

    async fn get_users_in_conversation(
        &self,
        params: &UsersInConversationParams,
    ) -> SlackResult<MembersPage> {
        let script = self.script.lock().unwrap();
        if !script.channels.contains_key(&params.channel_id) {
            return Err(channel_not_found());
        }
        let (members, next_cursor, _) = script
            .members
            .get(&params.channel_id)
            .map(|pages| page_at(pages, &params.cursor))
            .unwrap_or_default();
        Ok(MembersPage {
            members,
            next_cursor,
        })
    }

    async fn search_messages(
        &self,
        _query: &str,
        params: &SearchParams,
    ) -> SlackResult<SearchMessagesPage> {
        let script = self.script.lock().unwrap();
        let (matches, next_cursor, _) = page_at(&script.search_messages, &params.cursor);
        Ok(SearchMessagesPage {
            matches,
            next_cursor,
        })
    }

    async fn search_files(
        &self,
        _query: &str,
        params: &SearchParams,
    ) -> SlackResult<SearchFilesPage> {
        let script = self.script.lock().unwrap();
        let (matches, next_cursor, _) = page_at(&script.search_files, &params.cursor);
        Ok(SearchFilesPage {
            matches,
            next_cursor,
        })
    }

    async fn get_file_info(
        &self,
        file_id: &str,
        _count: u32,
        _page: u32,
    ) -> SlackResult<Option<File>> {
        Ok(self.script.lock().unwrap().files.get(file_id).cloned())
    }

    async fn get_user_info(&self, user_id: &str) -> SlackResult<User> {
        self.script
            .lock()
            .unwrap()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| SlackError::Api("user_not_found".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MessagesCall {
    pub(crate) channel_id: String,
    pub(crate) num_threads: usize,
    pub(crate) is_last: bool,
    pub(crate) count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ThreadCall {
    pub(crate) channel_id: String,
    pub(crate) parent_ts: String,
    pub(crate) thread_only: bool,
    pub(crate) is_last: bool,
    pub(crate) replies: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilesCall {
    pub(crate) channel_id: String,
    pub(crate) parent_ts: String,
    pub(crate) file_ids: Vec<String>,
}

#[derive(Default)]
struct Recorded {
    messages: Vec<MessagesCall>,
    threads: Vec<ThreadCall>,
    files: Vec<FilesCall>,
    channel_info: usize,
    channel_users: usize,
    user_pages: Vec<usize>,
    channel_pages: Vec<usize>,
    workspace_team: Option<String>,
    search_message_pages: Vec<usize>,
    search_file_pages: Vec<usize>,
}

/// Processor that records every call it receives.
#[derive(Default)]
pub(crate) struct Recorder {
    rec: Mutex<Recorded>,
}

impl Recorder {
    pub(crate) fn messages_calls(&self) -> Vec<MessagesCall> {
        self.rec.lock().unwrap().messages.clone()
    }

    pub(crate) fn thread_calls(&self) -> Vec<ThreadCall> {
        self.rec.lock().unwrap().threads.clone()
    }

    pub(crate) fn files_calls(&self) -> Vec<FilesCall> {
        self.rec.lock().unwrap().files.clone()
    }

    pub(crate) fn channel_info_calls(&self) -> usize {
        self.rec.lock().unwrap().channel_info
    }

    pub(crate) fn channel_users_calls(&self) -> usize {
        self.rec.lock().unwrap().channel_users
    }

    pub(crate) fn user_pages(&self) -> Vec<usize> {
        self.rec.lock().unwrap().user_pages.clone()
    }

    pub(crate) fn channel_pages(&self) -> Vec<usize> {
        self.rec.lock().unwrap().channel_pages.clone()
    }

    pub(crate) fn workspace_team(&self) -> Option<String> {
        self.rec.lock().unwrap().workspace_team.clone()
    }

    pub(crate) fn search_message_pages(&self) -> Vec<usize> {
        self.rec.lock().unwrap().search_message_pages.clone()
    }

    pub(crate) fn search_file_pages(&self) -> Vec<usize> {
        self.rec.lock().unwrap().search_file_pages.clone()
    }
}

#[async_trait]
impl Messenger for Recorder {
    async fn messages(
        &self,
        channel_id: &str,
        num_threads: usize,
        is_last: bool,
        messages: &[Message],
    ) -> Result<()> {
        self.rec.lock().unwrap().messages.push(MessagesCall {
            channel_id: channel_id.to_string(),
            num_threads,
            is_last,
            count: messages.len(),
        });
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
        self.rec.lock().unwrap().threads.push(ThreadCall {
            channel_id: channel_id.to_string(),
            parent_ts: parent.ts.clone(),
            thread_only,
            is_last,
            replies: replies.len(),
        });
        Ok(())
    }
}

#[async_trait]
impl Filer for Recorder {
    async fn files(&self, channel: &Channel, parent: &Message, files: &[File]) -> Result<()> {
        self.rec.lock().unwrap().files.push(FilesCall {
            channel_id: channel.id.clone(),
            parent_ts: parent.ts.clone(),
            file_ids: files.iter().map(|f| f.id.clone()).collect(),
        });
        Ok(())
    }
}

#[async_trait]
impl ChannelInformer for Recorder {
    async fn channel_info(&self, _channel: &Channel, _thread_ts: &str) -> Result<()> {
        self.rec.lock().unwrap().channel_info += 1;
        Ok(())
    }

    async fn channel_users(
        &self,
        _channel_id: &str,
        _thread_ts: &str,
        _users: &[String],
    ) -> Result<()> {
        self.rec.lock().unwrap().channel_users += 1;
        Ok(())
    }
}

#[async_trait]
impl Channels for Recorder {
    async fn channels(&self, channels: &[Channel]) -> Result<()> {
        self.rec.lock().unwrap().channel_pages.push(channels.len());
        Ok(())
    }
}

#[async_trait]
impl Users for Recorder {
    async fn users(&self, users: &[User]) -> Result<()> {
        self.rec.lock().unwrap().user_pages.push(users.len());
        Ok(())
    }
}

#[async_trait]
impl WorkspaceInfo for Recorder {
    async fn workspace_info(&self, info: &AuthTestResponse) -> Result<()> {
        self.rec.lock().unwrap().workspace_team = Some(info.team_id.clone());
        Ok(())
    }
}

#[async_trait]
impl MessageSearcher for Recorder {
    async fn search_messages(&self, _query: &str, messages: &[SearchMessage]) -> Result<()> {
        self.rec
            .lock()
            .unwrap()
            .search_message_pages
            .push(messages.len());
        Ok(())
    }
}

#[async_trait]
impl FileSearcher for Recorder {
    async fn search_files(&self, _query: &str, files: &[File]) -> Result<()> {
        self.rec.lock().unwrap().search_file_pages.push(files.len());
        Ok(())
    }
}
