use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Stream;
use crate::client::UsersPaginator;
use crate::error::{Result, StreamError};
use crate::network::with_retry;
use crate::processor::{Channels, Users, WorkspaceInfo};
use crate::types::ConversationsParams;

/// Users requested per `users.list` page.
const USERS_PAGE_SIZE: u32 = 200;

impl Stream {
    /// Hands the `auth.test` response to the processor.  Useful when the
    /// processor needs the current user or team ID.
    pub async fn workspace_info<P>(&self, cancel: &CancellationToken, proc: &P) -> Result<()>
    where
        P: WorkspaceInfo + ?Sized,
    {
        let info = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            info = self.client.auth_test() => info?,
        };
        proc.workspace_info(&info).await
    }

    /// Every user in the workspace, one processor call per page.
    pub async fn users<P>(&self, cancel: &CancellationToken, proc: &P) -> Result<()>
    where
        P: Users + ?Sized,
    {
        let mut pager = UsersPaginator::new(USERS_PAGE_SIZE);
        loop {
            let page = match with_retry(
                cancel,
                &self.limits.users,
                self.limits.tier.tier2.retries,
                || pager.next(self.client.as_ref()),
            )
            .await
            {
                Ok(page) => page,
                Err(e) => return UsersPaginator::failure(e),
            };
            pager.advance(&page);
            proc.users(&page.users).await?;
        }
    }

    /// Every conversation matching `params`, one processor call per
    /// non-empty page.
    pub async fn list_channels<P>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        params: &ConversationsParams,
    ) -> Result<()>
    where
        P: Channels + ?Sized,
    {
        let mut params = params.clone();
        if params.limit == 0 {
            params.limit = self.limits.tier.request.channels;
        }
        loop {
            let page = with_retry(
                cancel,
                &self.limits.channels,
                self.limits.tier.tier3.retries,
                || self.client.get_conversations(&params),
            )
            .await
            .map_err(|e| e.context("API error"))?;

            // Guest tokens get empty pages with a cursor to the next one.
            if page.channels.is_empty() {
                if page.next_cursor.is_empty() {
                    break;
                }
                params.cursor = page.next_cursor;
                continue;
            }
            proc.channels(&page.channels).await?;
            if page.next_cursor.is_empty() {
                break;
            }
            params.cursor = page.next_cursor;
        }
        Ok(())
    }

    /// Fetches each user in `ids` and hands them to the processor in one
    /// batch.  Empty IDs are skipped.
    pub async fn users_bulk<P, S>(
        &self,
        cancel: &CancellationToken,
        proc: &P,
        ids: &[S],
    ) -> Result<()>
    where
        P: Users + ?Sized,
        S: AsRef<str>,
    {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            let id: &str = id.as_ref();
            if id.is_empty() {
                continue;
            }
            let user = with_retry(
                cancel,
                &self.limits.userinfo,
                self.limits.tier.tier4.retries,
                || self.client.get_user_info(id),
            )
            .await
            .map_err(|e| e.context(format!("error fetching user with ID {id}")))?;
            users.push(user);
        }
        debug!(count = users.len(), "users_bulk: fetched");
        proc.users(&users).await
    }
}
