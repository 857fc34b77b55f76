use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::workers::emit;
use super::{ResultType, Stream, StreamResult};
use crate::error::{Result, StreamError};
use crate::link::{format_opt_ts, parse_link, EntityItem, SlackLink};
use crate::network::with_retry;
use crate::processor::{ChannelInformer, Conversations, Filer};
use crate::types::*;

/// Two producers of results run per call: channel and thread workers.
const RESULT_QUEUE_SIZE: usize = 2;

/// Per-call result callback.
type ResultCallback<'a> = &'a (dyn Fn(&StreamResult) -> Result<()> + Send + Sync);

/// A channel or thread waiting to be fetched.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Request {
    pub(crate) link: SlackLink,
    /// The caller asked for this thread directly, so nobody has fetched its
    /// channel info yet.  False for threads discovered in channel history.
    pub(crate) thread_only: bool,
    pub(crate) oldest: Option<DateTime<Utc>>,
    pub(crate) latest: Option<DateTime<Utc>>,
}

impl Request {
    fn discovered(channel_id: &str, thread_ts: &str) -> Self {
        Self {
            link: SlackLink::thread(channel_id, thread_ts),
            thread_only: false,
            oldest: None,
            latest: None,
        }
    }
}

/// Parses `item` and queues it on `channels` or `threads`.
pub(crate) async fn process_link(
    channels: &mpsc::Sender<Request>,
    threads: &mpsc::Sender<Request>,
    item: &EntityItem,
) -> Result<()> {
    let link = parse_link(&item.id)?;
    if !link.is_valid() {
        return Err(StreamError::InvalidLink(item.id.clone()));
    }
    let (queue, thread_only) = if link.is_thread() {
        (threads, true)
    } else {
        (channels, false)
    };
    let req = Request {
        link,
        thread_only,
        oldest: item.oldest,
        latest: item.latest,
    };
    queue.send(req).await.map_err(|_| StreamError::Cancelled)
}

impl Stream {
    /// Fetches every entity received on `items`: channel IDs, channel or
    /// thread URLs, or `CHANNEL:THREAD_TS` links.
    ///
    /// Registered result callbacks run for each channel and thread page.
    /// A channel result does not mean its threads are done; the caller has
    /// to count thread results (each thread ends with an `is_last` one).
    ///
    /// Returns the first error, wrapped with the result type, channel and
    /// thread it came from.  All workers are stopped before returning.
    pub async fn conversations<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        items: mpsc::Receiver<EntityItem>,
    ) -> Result<()>
    where
        P: Conversations + ?Sized,
    {
        self.run_conversations(cancel, proc, items, None).await
    }

    /// Like [`Stream::conversations`] over a fixed list, with `cb` run after
    /// the registered result callbacks for this call only.
    pub async fn conversations_cb<P, F>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        items: &[EntityItem],
        cb: F,
    ) -> Result<()>
    where
        P: Conversations + ?Sized,
        F: Fn(&StreamResult) -> Result<()> + Send + Sync,
    {
        let (tx, rx) = mpsc::channel(1);
        let feed = async move {
            for item in items {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    sent = tx.send(item.clone()) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            debug!(len = items.len(), "stream: sent link count");
        };
        let cb: ResultCallback<'_> = &cb;
        let (_, res) = tokio::join!(feed, self.run_conversations(cancel, proc, rx, Some(cb)));
        res
    }

    /// Fetches `items`, logging each result.
    pub async fn sync_conversations<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        items: &[EntityItem],
    ) -> Result<()>
    where
        P: Conversations + ?Sized,
    {
        self.conversations_cb(cancel, proc, items, |res| {
            debug!(result = %res, "stream: finished processing");
            Ok(())
        })
        .await
    }

    async fn run_conversations<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        items: mpsc::Receiver<EntityItem>,
        extra: Option<ResultCallback<'_>>,
    ) -> Result<()>
    where
        P: Conversations + ?Sized,
    {
        let cancel = cancel.child_token();
        let _stop_workers = cancel.clone().drop_guard();

        let (chans_tx, chans_rx) = mpsc::channel(self.opts.channel_queue_size);
        let (threads_tx, threads_rx) = mpsc::channel(self.opts.thread_queue_size);
        let (results_tx, mut results_rx) = mpsc::channel(RESULT_QUEUE_SIZE);
        let chans_rx = Mutex::new(chans_rx);
        let threads_rx = Mutex::new(threads_rx);

        // The thread queue closes once the main loop and every channel
        // worker (which keep discovering threads) have dropped their senders.
        let main_loop = self.main_loop(
            &cancel,
            items,
            chans_tx,
            threads_tx.clone(),
            results_tx.clone(),
        );
        let channel_workers = join_all((0..self.opts.channel_workers).map(|_| {
            self.channel_worker(
                &cancel,
                proc,
                &chans_rx,
                threads_tx.clone(),
                results_tx.clone(),
            )
        }));
        let thread_workers = join_all(
            (0..self.opts.thread_workers)
                .map(|_| self.thread_worker(&cancel, proc, &threads_rx, results_tx.clone())),
        );
        drop(threads_tx);
        drop(results_tx);

        let producers = async {
            tokio::join!(main_loop, channel_workers, thread_workers);
        };
        tokio::pin!(producers);
        let mut producers_done = false;

        loop {
            tokio::select! {
                res = results_rx.recv() => match res {
                    Some(res) => self.consume(res, extra)?,
                    None => break,
                },
                _ = &mut producers, if !producers_done => {
                    producers_done = true;
                    trace!("stream: all workers done");
                }
            }
        }
        debug!(
            cached_channels = self.chan_cache.len(),
            "stream: conversations complete"
        );
        Ok(())
    }

    /// Handles one result on the consumer side.
    fn consume(&self, res: StreamResult, extra: Option<ResultCallback<'_>>) -> Result<()> {
        if let Some(err) = &res.err {
            if err.is_channel_not_found() && !self.opts.fail_on_channel_not_found {
                warn!(channel_id = %res.channel_id, "channel not found, skipping");
                return Ok(());
            }
            debug!(
                kind = %res.kind,
                channel_id = %res.channel_id,
                thread_ts = %res.thread_ts,
                error = %err,
                "stream: result error"
            );
        }
        let res = res.check()?;
        for f in &self.result_fns {
            f(&res).map_err(|e| e.context(format!("result {res}, callback error")))?;
        }
        if let Some(f) = extra {
            f(&res).map_err(|e| e.context(format!("result {res}, callback error")))?;
        }
        Ok(())
    }

    async fn main_loop(
        &self,
        cancel: &CancellationToken,
        mut items: mpsc::Receiver<EntityItem>,
        channels: mpsc::Sender<Request>,
        threads: mpsc::Sender<Request>,
        results: mpsc::Sender<StreamResult>,
    ) {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    emit(&results, StreamResult::failed(ResultType::Main, "", "", StreamError::Cancelled)).await;
                    return;
                }
                item = items.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            let routed = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StreamError::Cancelled),
                r = process_link(&channels, &threads, &item) => r,
            };
            if let Err(e) = routed {
                let e = e.context(format!("item error: {:?}", item.to_string()));
                emit(&results, StreamResult::failed(ResultType::Main, "", "", e)).await;
            }
        }
        trace!("stream: main loop done");
    }

    fn oldest_ts(&self, req: &Request) -> String {
        format_opt_ts(req.oldest.as_ref().or(self.oldest.as_ref()))
    }

    fn latest_ts(&self, req: &Request) -> String {
        format_opt_ts(req.latest.as_ref().or(self.latest.as_ref()))
    }

    /// Pages through the history of `req`'s channel, one page at a time.
    pub(super) async fn channel<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        req: &Request,
        channel: &Channel,
        threads: &mpsc::Sender<Request>,
        results: &mpsc::Sender<StreamResult>,
    ) -> Result<()>
    where
        P: Conversations + ?Sized,
    {
        let mut cursor = String::new();
        loop {
            let params = HistoryParams {
                channel_id: req.link.channel.clone(),
                cursor: std::mem::take(&mut cursor),
                limit: self.limits.tier.request.conversations,
                oldest: self.oldest_ts(req),
                latest: self.latest_ts(req),
                inclusive: self.opts.inclusive,
            };
            let page = with_retry(
                cancel,
                &self.limits.channels,
                self.limits.tier.tier3.retries,
                || self.client.get_conversation_history(&params),
            )
            .await?;

            let is_last = !page.has_more;
            let n = proc_chan_msg(proc, threads, channel, is_last, &page.messages)
                .await
                .map_err(|e| {
                    e.context(format!("channel {}, callback error", req.link.channel))
                })?;
            emit(
                results,
                StreamResult {
                    kind: ResultType::Channel,
                    channel_id: req.link.channel.clone(),
                    thread_count: n,
                    is_last,
                    ..Default::default()
                },
            )
            .await;

            if is_last {
                debug!(channel_id = %req.link, "server reported channel done");
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(())
    }

    /// Pages through the replies of `req`'s thread.  A thread whose first
    /// page holds nothing but the parent message is skipped without any
    /// callback or result.
    pub(super) async fn thread<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        req: &Request,
        channel: &Channel,
        results: &mpsc::Sender<StreamResult>,
    ) -> Result<()>
    where
        P: Conversations + ?Sized,
    {
        debug!(slack_link = %req.link, "getting thread");

        let mut cursor = String::new();
        let mut first_page = true;
        loop {
            let params = RepliesParams {
                channel_id: req.link.channel.clone(),
                ts: req.link.thread_ts.clone(),
                cursor: std::mem::take(&mut cursor),
                limit: self.limits.tier.request.replies,
                oldest: self.oldest_ts(req),
                latest: self.latest_ts(req),
                inclusive: self.opts.inclusive,
            };
            let page = with_retry(
                cancel,
                &self.limits.threads,
                self.limits.tier.tier3.retries,
                || self.client.get_conversation_replies(&params),
            )
            .await?;

            if first_page && page.messages.len() <= 1 {
                debug!(slack_link = %req.link, "thread has no replies, skipping");
                return Ok(());
            }
            first_page = false;

            let is_last = !page.has_more;
            proc_thread_msg(
                proc,
                channel,
                &req.link.thread_ts,
                req.thread_only,
                is_last,
                &page.messages,
            )
            .await?;
            emit(
                results,
                StreamResult {
                    kind: ResultType::Thread,
                    channel_id: req.link.channel.clone(),
                    thread_ts: req.link.thread_ts.clone(),
                    is_last,
                    ..Default::default()
                },
            )
            .await;

            if is_last {
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(())
    }

    /// Channel info from the cache, or from the API on a miss.  The
    /// processor sees it either way.
    pub(super) async fn proc_channel_info<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Arc<Channel>>
    where
        P: ChannelInformer + ?Sized,
    {
        let info = match self.chan_cache.get(channel_id) {
            Some(info) => info,
            None => {
                let params = ConversationInfoParams {
                    channel_id: channel_id.to_string(),
                    include_locale: true,
                    include_num_members: true,
                };
                let info = with_retry(
                    cancel,
                    &self.limits.channels,
                    self.limits.tier.tier3.retries,
                    || self.client.get_conversation_info(&params),
                )
                .await
                .map_err(|e| not_found_or(channel_id, e, "api error"))?;
                let info = Arc::new(info);
                self.chan_cache.set(channel_id, Arc::clone(&info));
                info
            }
        };
        proc.channel_info(&info, thread_ts).await?;
        Ok(info)
    }

    /// Every member of the channel, handing each page to the processor.
    pub(super) async fn proc_channel_users<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<String>>
    where
        P: ChannelInformer + ?Sized,
    {
        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let params = UsersInConversationParams {
                channel_id: channel_id.to_string(),
                cursor: std::mem::take(&mut cursor),
                limit: 0,
            };
            let page = with_retry(
                cancel,
                &self.limits.userinfo,
                self.limits.tier.tier4.retries,
                || self.client.get_users_in_conversation(&params),
            )
            .await
            .map_err(|e| not_found_or(channel_id, e, "error getting conversation users"))?;

            if !page.members.is_empty() {
                proc.channel_users(channel_id, thread_ts, &page.members)
                    .await?;
                users.extend(page.members);
            }
            if page.next_cursor.is_empty() {
                break;
            }
            cursor = page.next_cursor;
        }
        Ok(users)
    }

    /// Channel info with the full member list, fetched concurrently.
    pub(super) async fn proc_channel_info_with_users<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Channel>
    where
        P: ChannelInformer + ?Sized,
    {
        let (info, members) = tokio::try_join!(
            self.proc_channel_info(cancel, proc, channel_id, thread_ts),
            self.proc_channel_users(cancel, proc, channel_id, thread_ts),
        )?;
        let mut channel = Channel::clone(&info);
        channel.members = members;
        Ok(channel)
    }
}

fn not_found_or(channel_id: &str, err: StreamError, context: &str) -> StreamError {
    match err {
        StreamError::Slack(e) if e.is_api_error("channel_not_found") => {
            StreamError::ChannelNotFound(channel_id.to_string())
        }
        other => other.context(format!("{context}: {channel_id}")),
    }
}

/// Hands one page of channel history to the processor and queues the
/// threads it starts.  Returns the number of threads queued.
///
/// Threads are queued only after `messages` has been called, so the
/// processor learns how many threads to expect before any of them arrive.
pub(crate) async fn proc_chan_msg<P>(
    proc: &P,
    threads: &mpsc::Sender<Request>,
    channel: &Channel,
    is_last: bool,
    mm: &[Message],
) -> Result<usize>
where
    P: Conversations + ?Sized,
{
    let mut trs = Vec::with_capacity(mm.len());
    for (i, m) in mm.iter().enumerate() {
        if m.is_thread_starter() {
            debug!(
                i,
                ts = %m.ts,
                thread_ts = %m.thread_ts,
                channel_id = %channel.id,
                is_last,
                msg_count = mm.len(),
                "found thread"
            );
            trs.push(Request::discovered(&channel.id, &m.thread_ts));
        }
        proc_files(proc, channel, std::slice::from_ref(m)).await?;
    }

    if let Err(e) = proc.messages(&channel.id, trs.len(), is_last, mm).await {
        let context = match mm.first() {
            None => format!("channel {}: failed to process empty message chunk", channel.id),
            Some(first) => format!(
                "channel {}: failed to process message chunk starting with id={} (size={})",
                channel.id,
                first.ts,
                mm.len()
            ),
        };
        return Err(e.context(context));
    }

    let n = trs.len();
    for tr in trs {
        threads.send(tr).await.map_err(|_| StreamError::Cancelled)?;
    }
    Ok(n)
}

/// Hands one page of thread replies to the processor.  Slack repeats the
/// thread starter at the top of every page; it becomes the parent.
pub(crate) async fn proc_thread_msg<P>(
    proc: &P,
    channel: &Channel,
    thread_ts: &str,
    thread_only: bool,
    is_last: bool,
    msgs: &[Message],
) -> Result<()>
where
    P: Conversations + ?Sized,
{
    let Some((parent, rest)) = msgs.split_first() else {
        debug!(channel_id = %channel.id, thread_ts, "empty thread messages, ignoring");
        return Ok(());
    };
    proc_files(proc, channel, rest).await?;
    proc.thread_messages(&channel.id, parent, thread_only, is_last, rest)
        .await
        .map_err(|e| {
            e.context(format!(
                "failed to process thread message id={}, thread_ts={}",
                parent.ts, thread_ts
            ))
        })
}

/// Calls `files` once for every message that has attachments.
pub(crate) async fn proc_files<P>(proc: &P, channel: &Channel, msgs: &[Message]) -> Result<()>
where
    P: Filer + ?Sized,
{
    for m in msgs.iter().filter(|m| !m.files.is_empty()) {
        proc.files(channel, m, &m.files).await?;
    }
    Ok(())
}
