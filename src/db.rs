use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::time::Duration;

use crate::config::StorageConfig;

/// Open the snapshot database, creating the file and its directory on
/// first use.
///
/// Every commit rewrites one row, so a small pool with WAL and relaxed
/// syncing is enough; concurrent CLI invocations wait on the busy timeout.
pub async fn connect(config: &StorageConfig) -> Result<SqlitePool> {
    let db_path = &config.path;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create storage directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open snapshot database: {}", db_path.display()))?;

    tracing::debug!(path = %db_path.display(), "snapshot database open");
    Ok(pool)
}
