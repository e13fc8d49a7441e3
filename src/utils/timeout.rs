//! Bounded waits and default durations.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{Result, SessionError};

/// Default timeout for connection attempts
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on a wait for a server response
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for graceful shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default simulation tick interval
pub const TICK_INTERVAL: Duration = Duration::from_millis(30);

/// Run `fut`, failing with `SessionError::Timeout` once `limit` elapses.
pub async fn with_timeout_error<F, T>(fut: F, limit: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Timeout),
    }
}

/// Like [`with_timeout_error`] for futures that cannot fail.
pub async fn within<F, T>(fut: F, limit: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    timeout(limit, fut).await.map_err(|_| SessionError::Timeout)
}
