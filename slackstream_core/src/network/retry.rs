use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::Limiter;
use crate::client::SlackError;
use crate::error::{Result, StreamError};

/// Attempts made when the caller passes `0`.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Runs `f` after taking a token from `limiter`.  When `f` fails with
/// [`SlackError::RateLimited`], sleeps for the server-supplied `retry_after`
/// and tries again, up to `max_attempts` calls in total.  Any other error
/// is returned as is after the first failure.
pub async fn with_retry<T, F, Fut>(
    cancel: &CancellationToken,
    limiter: &Limiter,
    max_attempts: u32,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, SlackError>>,
{
    let max_attempts = if max_attempts == 0 {
        DEFAULT_ATTEMPTS
    } else {
        max_attempts
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        limiter.wait(cancel).await?;

        let retry_after = match f().await {
            Ok(v) => return Ok(v),
            Err(SlackError::RateLimited { retry_after }) => retry_after,
            Err(e) => {
                debug!(attempt, error = %e, "with_retry: non-retryable error");
                return Err(StreamError::Slack(e));
            }
        };

        if attempt >= max_attempts {
            return Err(StreamError::RetryExhausted {
                attempts: attempt,
                last: SlackError::RateLimited { retry_after },
            });
        }
        info!(
            attempt,
            max_attempts,
            retry_after_ms = retry_after.as_millis() as u64,
            "got rate limited, sleeping"
        );
        sleep(cancel, retry_after).await?;
    }
}

async fn sleep(cancel: &CancellationToken, d: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamError::Cancelled),
        _ = tokio::time::sleep(d) => Ok(()),
    }
}
