//! Database module for supply-watch.
//!
//! This module provides the persistence layer using SQLite with sqlx:
//! connection pool management, migrations, models and repositories for
//! alert records, auto-action claims, the notification audit log and owner
//! threshold configuration.

pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::info;

pub type DbPool = Pool<Sqlite>;

/// Pragmas applied to every new connection. The claim and alert tables are
/// tiny, so a modest page cache is enough.
const CONNECTION_PRAGMAS: &[&str] = &[
    "PRAGMA wal_autocheckpoint = 1000",
    "PRAGMA journal_size_limit = 16777216",
    "PRAGMA cache_size = -8000",
    "PRAGMA temp_store = MEMORY",
];

/// Connection pool sizing and lock waiting.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// How long a writer waits on a locked database before `SQLITE_BUSY`.
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(2);
        Self {
            max_connections: (cores * 2).clamp(2, 8),
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(15),
        }
    }
}

async fn apply_connection_pragmas(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for pragma in CONNECTION_PRAGMAS {
        sqlx::query(pragma).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Open a WAL-mode pool with explicit settings.
pub async fn init_pool_with(
    database_url: &str,
    settings: PoolSettings,
) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(settings.busy_timeout)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .after_connect(|conn, _meta| Box::pin(async move { apply_connection_pragmas(conn).await }))
        .connect_with(connect_options)
        .await?;

    info!(
        max_connections = settings.max_connections,
        "Database pool ready"
    );
    Ok(pool)
}

/// Open a WAL-mode pool sized for this machine.
///
/// e.g. `sqlite:supply-watch.db?mode=rwc`
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    init_pool_with(database_url, PoolSettings::default()).await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database schema up to date");
    Ok(())
}

/// Start a transaction that takes the write lock immediately.
///
/// Batched audit inserts use this so concurrent writers queue on the busy
/// timeout instead of failing on a lock upgrade.
pub async fn begin_immediate(pool: &DbPool) -> Result<ImmediateTransaction, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(ImmediateTransaction { conn, done: false })
}

/// An open `BEGIN IMMEDIATE` transaction. Dropped without commit or
/// rollback, the connection is closed rather than returned to the pool.
pub struct ImmediateTransaction {
    conn: sqlx::pool::PoolConnection<Sqlite>,
    done: bool,
}

impl ImmediateTransaction {
    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::query(statement).execute(&mut *self.conn).await?;
        self.done = true;
        Ok(())
    }
}

impl std::ops::Deref for ImmediateTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.done {
            self.conn.close_on_drop();
        }
    }
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
