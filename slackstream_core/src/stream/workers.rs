use std::collections::HashSet;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::conversation::Request;
use super::{ResultType, Stream, StreamResult};
use crate::client::SlackError;
use crate::error::{Result, StreamError};
use crate::network::with_retry;
use crate::processor::{ChannelInformer, Conversations, Filer};
use crate::types::{Channel, Message};

/// Sends `res` to the consumer.  If the consumer is gone the call is
/// already over and the result is dropped.
pub(super) async fn emit(results: &mpsc::Sender<StreamResult>, res: StreamResult) {
    if results.send(res).await.is_err() {
        trace!("stream: consumer gone, result dropped");
    }
}

async fn recv_shared<T>(rx: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
    rx.lock().await.recv().await
}

impl Stream {
    /// Takes channel requests until the queue closes.  A failing channel is
    /// reported and the worker moves on to the next one.
    pub(super) async fn channel_worker<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        reqs: &Mutex<mpsc::Receiver<Request>>,
        threads: mpsc::Sender<Request>,
        results: mpsc::Sender<StreamResult>,
    ) where
        P: Conversations + ?Sized,
    {
        loop {
            let req = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    emit(&results, StreamResult::failed(ResultType::Channel, "", "", StreamError::Cancelled)).await;
                    return;
                }
                req = recv_shared(reqs) => match req {
                    Some(req) => req,
                    None => break,
                },
            };
            let channel_id = req.link.channel.clone();

            let channel = match self
                .proc_channel_info_with_users(cancel, proc, &channel_id, &req.link.thread_ts)
                .await
            {
                Ok(ch) => ch,
                Err(e) => {
                    emit(&results, StreamResult::failed(ResultType::Channel, channel_id, "", e)).await;
                    continue;
                }
            };

            if let Some(file_id) = channel.canvas_file_id() {
                if let Err(e) = self.canvas(cancel, proc, &channel, file_id).await {
                    warn!(channel_id = %channel.id, error = %e, "canvas error, ignoring");
                }
            }

            if let Err(e) = self
                .channel(cancel, proc, &req, &channel, &threads, &results)
                .await
            {
                emit(&results, StreamResult::failed(ResultType::Channel, channel_id, "", e)).await;
            }
        }
        trace!("stream: channel worker done");
    }

    /// Takes thread requests until the queue closes.
    pub(super) async fn thread_worker<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        reqs: &Mutex<mpsc::Receiver<Request>>,
        results: mpsc::Sender<StreamResult>,
    ) where
        P: Conversations + ?Sized,
    {
        loop {
            let req = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    emit(&results, StreamResult::failed(ResultType::Thread, "", "", StreamError::Cancelled)).await;
                    return;
                }
                req = recv_shared(reqs) => match req {
                    Some(req) => req,
                    None => break,
                },
            };
            let (channel_id, thread_ts) = (&req.link.channel, &req.link.thread_ts);

            if !req.link.is_thread() {
                let e = StreamError::InvalidLink(format!("invalid thread link: {}", req.link));
                emit(&results, StreamResult::failed(ResultType::Thread, "", "", e)).await;
                continue;
            }

            // Discovered threads belong to a channel whose info the channel
            // worker has already handed to the processor.
            let channel = if req.thread_only {
                match self
                    .proc_channel_info_with_users(cancel, proc, channel_id, thread_ts)
                    .await
                {
                    Ok(ch) => ch,
                    Err(e) => {
                        emit(
                            &results,
                            StreamResult::failed(ResultType::Thread, channel_id, thread_ts, e),
                        )
                        .await;
                        continue;
                    }
                }
            } else {
                Channel::placeholder(channel_id)
            };

            if let Err(e) = self.thread(cancel, proc, &req, &channel, &results).await {
                emit(
                    &results,
                    StreamResult::failed(ResultType::Thread, channel_id, thread_ts, e),
                )
                .await;
            }
        }
        trace!("stream: thread worker done");
    }

    /// Fetches info for every channel ID received, once per ID.  Stops at the
    /// first failure.
    pub(super) async fn channel_info_worker<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        mut ids: mpsc::Receiver<String>,
    ) -> Result<()>
    where
        P: ChannelInformer + ?Sized,
    {
        let mut seen: HashSet<String> = HashSet::with_capacity(512);
        loop {
            let id = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                id = ids.recv() => match id {
                    Some(id) => id,
                    None => break,
                },
            };
            if id.is_empty() || seen.contains(&id) {
                continue;
            }

            let fetched = if self.opts.fast_search {
                self.proc_channel_info(cancel, proc, &id, "").await.map(drop)
            } else {
                self.proc_channel_info_with_users(cancel, proc, &id, "")
                    .await
                    .map(drop)
            };
            if let Err(e) = fetched {
                let e = e.context(format!("channel info worker: {id}"));
                return StreamResult::failed(ResultType::ChannelInfo, id, "", e)
                    .check()
                    .map(drop);
            }
            seen.insert(id);
        }
        Ok(())
    }

    /// Hands the channel canvas to the processor as a file without a parent
    /// message.
    pub(super) async fn canvas<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        channel: &Channel,
        file_id: &str,
    ) -> Result<()>
    where
        P: Filer + ?Sized,
    {
        if file_id.is_empty() {
            return Ok(());
        }
        let file = with_retry(
            cancel,
            &self.limits.userinfo,
            self.limits.tier.tier4.retries,
            || self.client.get_file_info(file_id, 0, 1),
        )
        .await
        .map_err(|e| e.context(format!("canvas: {file_id}")))?
        .ok_or_else(|| {
            StreamError::Slack(SlackError::Api("file_not_found".to_string()))
                .context(format!("canvas: {file_id}"))
        })?;

        proc.files(channel, &Message::default(), std::slice::from_ref(&file))
            .await
            .map_err(|e| e.context(format!("canvas: {file_id}")))
    }
}
