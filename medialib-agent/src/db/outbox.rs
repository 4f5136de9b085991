//! Durable upload queue
//!
//! Batch payloads that failed to reach the host are parked here and
//! replayed oldest-first. Rows survive restarts; a row is deleted only
//! after the host accepts its payload.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

/// One queued batch payload.
#[derive(Debug, Clone)]
pub struct OutboxItem {
    pub id: i64,
    pub batch_id: String,
    pub payload_json: Vec<u8>,
    pub created_at: f64,
}

/// Queue a failed batch payload.
pub async fn enqueue(pool: &SqlitePool, batch_id: &str, payload: &[u8], now: f64) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO outbox (batch_id, payload_json, created_at) VALUES (?, ?, ?)",
    )
    .bind(batch_id)
    .bind(payload)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// The oldest queued payload, if any. Drain order is strict FIFO by
/// insertion.
pub async fn oldest(pool: &SqlitePool) -> Result<Option<OutboxItem>> {
    let row = sqlx::query(
        "SELECT id, batch_id, payload_json, created_at FROM outbox ORDER BY id ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| OutboxItem {
        id: r.get("id"),
        batch_id: r.get("batch_id"),
        payload_json: r.get("payload_json"),
        created_at: r.get("created_at"),
    }))
}

/// Remove a delivered payload.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM outbox WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of queued payloads.
pub async fn len(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
