//! Local persistent state for the agent
//!
//! One SQLite store at `~/.medialib/agent_cache.db` holds the reuse cache
//! (`agent_index`), the durable upload queue (`outbox`), resumable scan
//! cursors (`scan_progress`), and a small `settings` table used for the
//! last-known host configuration. The agent process is the only writer.

pub mod index;
pub mod outbox;
pub mod progress;
pub mod settings;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the agent cache database connection pool.
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to agent cache: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the agent tables if they don't exist.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS agent_index (
            path TEXT PRIMARY KEY,
            inode_key TEXT,
            size INTEGER,
            mtime REAL,
            ctime REAL,
            probed INTEGER NOT NULL DEFAULT 0,
            hashed INTEGER NOT NULL DEFAULT 0,
            hash_algo TEXT,
            hash_sample_size INTEGER,
            sample_hash TEXT,
            full_hash TEXT,
            last_seen REAL,
            last_hashed_at REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_agent_inode ON agent_index(inode_key)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL,
            payload_json BLOB NOT NULL,
            created_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_outbox_created ON outbox(created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_progress (
            root TEXT NOT NULL,
            phase TEXT NOT NULL,
            last_path TEXT,
            updated_at REAL,
            PRIMARY KEY (root, phase)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Agent cache tables initialized (agent_index, outbox, scan_progress, settings)");

    Ok(())
}

/// Reclaim file space after deletions.
pub async fn vacuum(pool: &SqlitePool) -> Result<()> {
    sqlx::query("VACUUM").execute(pool).await?;
    Ok(())
}

/// Empty the reuse cache, the outbox, and all cursors, then reclaim the
/// space. Used by the `clear_cache` control endpoint while the pool stays
/// open; the `--clear-cache` CLI flag removes the file itself before the
/// pool is created.
pub async fn clear_all(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM agent_index").execute(pool).await?;
    sqlx::query("DELETE FROM outbox").execute(pool).await?;
    sqlx::query("DELETE FROM scan_progress").execute(pool).await?;
    vacuum(pool).await?;
    Ok(())
}

/// In-memory pool for tests. Pinned to a single connection so every query
/// sees the same `:memory:` database.
#[cfg(test)]
pub async fn open_memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    init_tables(&pool).await.expect("schema init");
    pool
}
