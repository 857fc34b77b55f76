use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ResultType, Stream, StreamResult};
use crate::error::{Result, StreamError};
use crate::network::with_retry;
use crate::processor::{FileSearcher, MessageSearcher, Searcher};
use crate::types::{Channel, Message, SearchParams};

/// Channel IDs waiting for the channel info worker.
const CHANNEL_INFO_QUEUE_SIZE: usize = 100;

/// ID of the synthetic channel search file pages are filed under.
pub const SEARCH_CHANNEL_ID: &str = "SEARCH";

impl Stream {
    /// Runs message and file search for `query` concurrently.  Returns the
    /// first error from either.
    pub async fn search<P>(&self, cancel: &CancellationToken, proc: &P, query: &str) -> Result<()>
    where
        P: Searcher + ?Sized,
    {
        tokio::try_join!(
            self.search_messages(cancel, proc, query),
            self.search_files(cancel, proc, query),
        )?;
        Ok(())
    }

    /// Pages through `search.messages`.  The channels the matches were
    /// posted in are looked up once each, so the processor sees their info
    /// alongside the messages.
    pub async fn search_messages<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        query: &str,
    ) -> Result<()>
    where
        P: MessageSearcher + ?Sized,
    {
        let (info_tx, info_rx) = mpsc::channel::<String>(CHANNEL_INFO_QUEUE_SIZE);

        // Owns the sender; the info worker finishes once this is done.
        let pages = async move {
            let mut params = SearchParams::default();
            loop {
                let page = with_retry(
                    cancel,
                    &self.limits.searchmsg,
                    self.limits.tier.tier2.retries,
                    || self.client.search_messages(query, &params),
                )
                .await
                .map_err(|e| e.context("search messages"))?;

                proc.search_messages(query, &page.matches).await?;
                for m in &page.matches {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                        sent = info_tx.send(m.channel.id.clone()) => {
                            sent.map_err(|_| StreamError::Cancelled)?;
                        }
                    }
                }

                if cancel.is_cancelled() {
                    return Err(StreamError::Cancelled);
                }
                let res = StreamResult {
                    kind: ResultType::Search,
                    count: page.matches.len(),
                    ..Default::default()
                };
                for f in &self.result_fns {
                    f(&res).map_err(|e| e.context(format!("result {res}, callback error")))?;
                }

                if page.next_cursor.is_empty() {
                    debug!(query, "search messages done");
                    break;
                }
                params.cursor = page.next_cursor;
            }
            Ok::<(), StreamError>(())
        };

        tokio::try_join!(pages, self.channel_info_worker(cancel, proc, info_rx))?;
        Ok(())
    }

    /// Pages through `search.files`.  Each page goes to the processor twice:
    /// as search results, and as files of the [`SEARCH_CHANNEL_ID`] channel.
    pub async fn search_files<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        query: &str,
    ) -> Result<()>
    where
        P: FileSearcher + ?Sized,
    {
        let channel = Channel::placeholder(SEARCH_CHANNEL_ID);
        let parent = Message::default();
        let mut params = SearchParams::default();
        loop {
            let page = with_retry(
                cancel,
                &self.limits.searchfiles,
                self.limits.tier.tier2.retries,
                || self.client.search_files(query, &params),
            )
            .await
            .map_err(|e| e.context("search files"))?;

            proc.search_files(query, &page.matches).await?;
            proc.files(&channel, &parent, &page.matches).await?;

            if page.next_cursor.is_empty() {
                debug!(query, "search files done");
                break;
            }
            params.cursor = page.next_cursor;
        }
        Ok(())
    }
}
