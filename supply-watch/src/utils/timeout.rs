//! Time budget for external calls.

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Await `fut` for at most `timeout`; an elapsed budget becomes [`Error::Timeout`].
pub async fn with_timeout<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, timeout }),
    }
}
