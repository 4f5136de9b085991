//! Resumable scan cursors
//!
//! One row per `(root, phase)`. The orchestrator checkpoints the last
//! enumerated path periodically and clears the row when a root finishes
//! its phase, so an interrupted scan resumes instead of restarting.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

/// Last checkpointed path for a root and phase, if a scan was
/// interrupted.
pub async fn get(pool: &SqlitePool, root: &str, phase: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT last_path FROM scan_progress WHERE root = ? AND phase = ?")
        .bind(root)
        .bind(phase)
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|r| r.get::<Option<String>, _>("last_path")))
}

/// Checkpoint the cursor for a root and phase.
pub async fn set(
    pool: &SqlitePool,
    root: &str,
    phase: &str,
    last_path: &str,
    now: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scan_progress (root, phase, last_path, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(root, phase) DO UPDATE SET
            last_path = excluded.last_path,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(root)
    .bind(phase)
    .bind(last_path)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Drop the cursor once a root completes its phase.
pub async fn clear(pool: &SqlitePool, root: &str, phase: &str) -> Result<()> {
    sqlx::query("DELETE FROM scan_progress WHERE root = ? AND phase = ?")
        .bind(root)
        .bind(phase)
        .execute(pool)
        .await?;

    Ok(())
}

/// Latest checkpoint timestamp across all cursors, for diagnostics.
pub async fn latest_update(pool: &SqlitePool) -> Result<Option<f64>> {
    let row = sqlx::query("SELECT MAX(updated_at) AS updated FROM scan_progress")
        .fetch_one(pool)
        .await?;
    Ok(row.get("updated"))
}

/// Number of stored cursors.
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_progress")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
