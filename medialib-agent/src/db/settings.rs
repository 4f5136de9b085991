//! Key/value settings persistence
//!
//! Currently holds the last successfully fetched host configuration so
//! the agent can start during a host outage.

use anyhow::Result;
use sqlx::SqlitePool;

/// Key under which the last-known host configuration JSON is stored.
pub const LAST_CONFIG_KEY: &str = "last_config";

pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
