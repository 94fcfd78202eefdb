//! Retry helper for SQLite lock contention.

use rand::random;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

/// Attempts after the first before a busy error is returned.
const MAX_BUSY_RETRIES: u32 = 8;
const BASE_DELAY: Duration = Duration::from_millis(5);
const MAX_DELAY: Duration = Duration::from_millis(500);

/// Whether an error is SQLite reporting lock contention (`SQLITE_BUSY` = 5,
/// `SQLITE_LOCKED` = 6).
pub(crate) fn is_sqlite_busy_error(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };
    let message = match sqlx_err {
        sqlx::Error::Database(db_err) => {
            if matches!(db_err.code().as_deref(), Some("5" | "6")) {
                return true;
            }
            db_err.message().to_ascii_lowercase()
        }
        other => other.to_string().to_ascii_lowercase(),
    };
    message.contains("database is locked") || message.contains("database is busy")
}

/// Exponential delay for `attempt` with up to 25% random jitter, capped.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(1 << attempt.min(16));
    let capped = exp.min(MAX_DELAY);
    let jitter = capped.mul_f64(random::<f64>() * 0.25);
    (capped + jitter).min(MAX_DELAY)
}

/// Run `op`, retrying while SQLite reports lock contention.
///
/// Claims and alert-record writes race across evaluators; everything other
/// than a busy error is returned as is.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= MAX_BUSY_RETRIES || !is_sqlite_busy_error(&err) {
            return Err(err);
        }

        let delay = backoff_delay(attempt);
        attempt += 1;
        debug!(operation = op_name, attempt, ?delay, "SQLite busy, retrying");
        sleep(delay).await;
    }
}
