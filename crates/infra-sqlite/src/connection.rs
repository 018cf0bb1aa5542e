// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use conduit_core::error::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout for writers contending on the WAL lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool size for file databases
const MAX_CONNECTIONS: u32 = 8;

/// Create SQLite connection pool from a URL (e.g. `sqlite::memory:`)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url).map_err(map_sqlx_error)?;
    // Every in-memory connection is its own database
    let max_connections = if database_url.contains(":memory:") {
        1
    } else {
        MAX_CONNECTIONS
    };
    connect(options, max_connections).await
}

/// Create SQLite connection pool for a database file, creating it if missing
pub async fn create_file_pool(path: &Path) -> Result<SqlitePool> {
    info!(path = %path.display(), "Opening queue database");
    connect(SqliteConnectOptions::new().filename(path), MAX_CONNECTIONS).await
}

/// WAL with `synchronous = FULL`: a committed append has been fsynced
async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<SqlitePool> {
    let options = options
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}
