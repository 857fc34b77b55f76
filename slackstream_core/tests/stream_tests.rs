use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use slackstream_core::client::SlackResult;
use slackstream_core::link::parse_link;
use slackstream_core::processor::{ChannelInformer, Filer, Messenger, Users};
use slackstream_core::types::*;
use slackstream_core::{
    CancellationToken, EntityItem, EntityList, Limits, ResultType, SlackError, SlackLink,
    Slacker, Stream,
};

/// Workspace where every channel has one page of history holding a single
/// thread with one reply.  Users are served in one page after `throttle`
/// rate limited attempts.
#[derive(Default)]
struct Workspace {
    calls: AtomicUsize,
    throttle: AtomicUsize,
}

impl Workspace {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn msg(ts: &str, thread_ts: &str) -> Message {
    Message {
        ts: ts.to_string(),
        thread_ts: thread_ts.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl Slacker for Workspace {
    async fn auth_test(&self) -> SlackResult<AuthTestResponse> {
        self.hit();
        Ok(AuthTestResponse::default())
    }

    async fn get_conversation_history(&self, _params: &HistoryParams) -> SlackResult<HistoryPage> {
        self.hit();
        Ok(HistoryPage {
            messages: vec![msg("1.000000", ""), msg("2.000000", "2.000000")],
            has_more: false,
            next_cursor: String::new(),
        })
    }

    async fn get_conversation_replies(&self, params: &RepliesParams) -> SlackResult<RepliesPage> {
        self.hit();
        Ok(RepliesPage {
            messages: vec![msg(&params.ts, &params.ts), msg("2.000001", &params.ts)],
            has_more: false,
            next_cursor: String::new(),
        })
    }

    async fn get_users_page(&self, _cursor: &str, _limit: u32) -> SlackResult<UsersPage> {
        self.hit();
        let left = self.throttle.load(Ordering::SeqCst);
        if left > 0 {
            self.throttle.store(left - 1, Ordering::SeqCst);
            return Err(SlackError::RateLimited {
                retry_after: Duration::from_secs(2),
            });
        }
        Ok(UsersPage {
            users: vec![User {
                id: "U1".to_string(),
                ..Default::default()
            }],
            next_cursor: String::new(),
        })
    }

    async fn get_starred(&self, _params: &StarredParams) -> SlackResult<StarredPage> {
        self.hit();
        Ok(StarredPage::default())
    }

    async fn list_bookmarks(&self, _channel_id: &str) -> SlackResult<Vec<Bookmark>> {
        self.hit();
        Ok(Vec::new())
    }

    async fn get_conversations(&self, _params: &ConversationsParams) -> SlackResult<ChannelsPage> {
        self.hit();
        Ok(ChannelsPage::default())
    }

    async fn get_conversation_info(
        &self,
        params: &ConversationInfoParams,
    ) -> SlackResult<Channel> {
        self.hit();
        Ok(Channel::placeholder(params.channel_id.clone()))
    }

    async fn get_users_in_conversation(
        &self,
        _params: &UsersInConversationParams,
    ) -> SlackResult<MembersPage> {
        self.hit();
        Ok(MembersPage::default())
    }

    async fn search_messages(
        &self,
        _query: &str,
        _params: &SearchParams,
    ) -> SlackResult<SearchMessagesPage> {
        self.hit();
        Ok(SearchMessagesPage::default())
    }

    async fn search_files(
        &self,
        _query: &str,
        _params: &SearchParams,
    ) -> SlackResult<SearchFilesPage> {
        self.hit();
        Ok(SearchFilesPage::default())
    }

    async fn get_file_info(
        &self,
        _file_id: &str,
        _count: u32,
        _page: u32,
    ) -> SlackResult<Option<File>> {
        self.hit();
        Ok(None)
    }

    async fn get_user_info(&self, user_id: &str) -> SlackResult<User> {
        self.hit();
        Ok(User {
            id: user_id.to_string(),
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct Sink {
    channels: Mutex<Vec<(String, bool)>>,
    threads: Mutex<Vec<(String, String)>>,
    users: AtomicUsize,
}

#[async_trait]
impl Messenger for Sink {
    async fn messages(
        &self,
        channel_id: &str,
        _num_threads: usize,
        is_last: bool,
        _messages: &[Message],
    ) -> slackstream_core::Result<()> {
        self.channels
            .lock()
            .unwrap()
            .push((channel_id.to_string(), is_last));
        Ok(())
    }

    async fn thread_messages(
        &self,
        channel_id: &str,
        parent: &Message,
        _thread_only: bool,
        _is_last: bool,
        _replies: &[Message],
    ) -> slackstream_core::Result<()> {
        self.threads
            .lock()
            .unwrap()
            .push((channel_id.to_string(), parent.ts.clone()));
        Ok(())
    }
}

#[async_trait]
impl Filer for Sink {
    async fn files(
        &self,
        _channel: &Channel,
        _parent: &Message,
        _files: &[File],
    ) -> slackstream_core::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ChannelInformer for Sink {
    async fn channel_info(
        &self,
        _channel: &Channel,
        _thread_ts: &str,
    ) -> slackstream_core::Result<()> {
        Ok(())
    }

    async fn channel_users(
        &self,
        _channel_id: &str,
        _thread_ts: &str,
        _users: &[String],
    ) -> slackstream_core::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Users for Sink {
    async fn users(&self, users: &[User]) -> slackstream_core::Result<()> {
        self.users.fetch_add(users.len(), Ordering::SeqCst);
        Ok(())
    }
}

fn stream(ws: Arc<Workspace>) -> Stream {
    Stream::builder(ws, Limits::no_limits())
        .workers(3, 4)
        .build()
        .unwrap()
}

#[test]
fn test_link_classification() {
    assert_eq!(parse_link("C0123ABC").unwrap(), SlackLink::channel("C0123ABC"));
    assert_eq!(
        parse_link("C0123ABC:1610000000.000100").unwrap(),
        SlackLink::thread("C0123ABC", "1610000000.000100")
    );
    assert!(parse_link("https://ws.slack.com/archives/C0123ABC/p1610000000000100")
        .unwrap()
        .is_thread());
    assert!(parse_link("not a link").is_err());

    let list = EntityList::from_entries(&["C1", "^C2", "C3:1.000001"]).unwrap();
    assert_eq!(list.include_count(), 2);
    assert!(list.is_excluded("C2"));
}

#[tokio::test]
async fn test_every_channel_and_thread_is_processed_once() {
    let ws = Arc::new(Workspace::default());
    let stream = stream(ws.clone());
    let sink = Sink::default();
    let ids: Vec<String> = (0..20).map(|i| format!("C{i:03}")).collect();
    let items: Vec<EntityItem> = ids.iter().map(EntityItem::new).collect();
    let thread_results = AtomicUsize::new(0);

    stream
        .conversations_cb(&CancellationToken::new(), &sink, &items, |res| {
            if res.kind == ResultType::Thread && res.is_last {
                thread_results.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
        .await
        .unwrap();

    let channels = sink.channels.lock().unwrap();
    let distinct: HashSet<&str> = channels.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(channels.len(), 20);
    assert_eq!(distinct.len(), 20);
    assert!(channels.iter().all(|(_, last)| *last));

    let threads = sink.threads.lock().unwrap();
    let distinct: HashSet<&(String, String)> = threads.iter().collect();
    assert_eq!(threads.len(), 20);
    assert_eq!(distinct.len(), 20);
    assert_eq!(thread_results.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let ws = Arc::new(Workspace::default());
    let stream = stream(ws.clone());
    let sink = Sink::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = stream
        .sync_conversations(&cancel, &sink, &[EntityItem::new("C1")])
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    let err = stream.users(&cancel, &sink).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(ws.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_page_is_retried() {
    let ws = Arc::new(Workspace::default());
    ws.throttle.store(2, Ordering::SeqCst);
    let stream = stream(ws.clone());
    let sink = Sink::default();

    stream
        .users(&CancellationToken::new(), &sink)
        .await
        .unwrap();
    assert_eq!(sink.users.load(Ordering::SeqCst), 1);
    assert_eq!(ws.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let ws = Arc::new(Workspace::default());
    ws.throttle.store(10, Ordering::SeqCst);
    let stream = stream(ws.clone());
    let sink = Sink::default();

    let err = stream
        .users(&CancellationToken::new(), &sink)
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "retry_exhausted");
    assert_eq!(ws.calls(), Limits::no_limits().tier2.retries as usize);
}
