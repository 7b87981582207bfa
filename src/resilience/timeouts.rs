//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out upstream calls become 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::error::ProxyError;

/// Run `fut` with a deadline. A zero duration disables the deadline.
pub async fn with_timeout<T, F>(duration: Duration, what: impl FnOnce() -> String, fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    if duration.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProxyError::Timeout(what())),
    }
}
