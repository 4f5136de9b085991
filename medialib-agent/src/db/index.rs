//! Reuse cache operations
//!
//! One row per observed path. `touch` records the latest stat without
//! disturbing probe/hash state; `mark_hashed`/`mark_probed` flip the
//! respective bits after expensive work completes. Freshness checks
//! compare the stored `inode_key` (and hash parameters) against the
//! current observation, so a replaced or re-encoded file invalidates its
//! cached state automatically.

use anyhow::Result;
use medialib_common::records::FileHashes;
use sqlx::{Row, SqlitePool};

/// One reuse-cache row.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: String,
    pub inode_key: String,
    pub size: i64,
    pub mtime: f64,
    pub ctime: f64,
    pub probed: bool,
    pub hashed: bool,
    pub hash_algo: Option<String>,
    pub hash_sample_size: Option<i64>,
    pub sample_hash: Option<String>,
    pub full_hash: Option<String>,
    pub last_seen: Option<f64>,
    pub last_hashed_at: Option<f64>,
}

impl CacheEntry {
    /// Whether a cached probe may be honored for the current observation.
    pub fn probe_fresh(&self, current_inode_key: &str) -> bool {
        self.probed && self.inode_key == current_inode_key
    }

    /// Whether cached hashes may be honored for the current observation
    /// and hash configuration.
    pub fn hash_fresh(&self, current_inode_key: &str, algo: &str, sample_size: u64) -> bool {
        self.hashed
            && self.inode_key == current_inode_key
            && self.hash_algo.as_deref() == Some(algo)
            && self.hash_sample_size == Some(sample_size as i64)
    }

    /// Cached hashes as a wire object, when present and fresh for the
    /// given observation.
    pub fn cached_hashes(
        &self,
        current_inode_key: &str,
        algo: &str,
        sample_size: u64,
    ) -> Option<FileHashes> {
        if !self.hash_fresh(current_inode_key, algo, sample_size) {
            return None;
        }
        Some(FileHashes {
            algo: algo.to_string(),
            sample_size,
            sample_hash: self.sample_hash.clone().unwrap_or_default(),
            full_hash: self.full_hash.clone(),
        })
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> CacheEntry {
    CacheEntry {
        path: row.get("path"),
        inode_key: row.get::<Option<String>, _>("inode_key").unwrap_or_default(),
        size: row.get::<Option<i64>, _>("size").unwrap_or_default(),
        mtime: row.get::<Option<f64>, _>("mtime").unwrap_or_default(),
        ctime: row.get::<Option<f64>, _>("ctime").unwrap_or_default(),
        probed: row.get::<i64, _>("probed") != 0,
        hashed: row.get::<i64, _>("hashed") != 0,
        hash_algo: row.get("hash_algo"),
        hash_sample_size: row.get("hash_sample_size"),
        sample_hash: row.get("sample_hash"),
        full_hash: row.get("full_hash"),
        last_seen: row.get("last_seen"),
        last_hashed_at: row.get("last_hashed_at"),
    }
}

/// Look up the cache row for a path.
pub async fn lookup(pool: &SqlitePool, path: &str) -> Result<Option<CacheEntry>> {
    let row = sqlx::query(
        r#"
        SELECT path, inode_key, size, mtime, ctime, probed, hashed,
               hash_algo, hash_sample_size, sample_hash, full_hash,
               last_seen, last_hashed_at
        FROM agent_index
        WHERE path = ?
        "#,
    )
    .bind(path)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| entry_from_row(&r)))
}

/// Record the latest observation of a path without touching probe/hash
/// state.
pub async fn touch(
    pool: &SqlitePool,
    path: &str,
    inode_key: &str,
    size: i64,
    mtime: f64,
    ctime: f64,
    now: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO agent_index (path, inode_key, size, mtime, ctime, last_seen)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            inode_key = excluded.inode_key,
            size = excluded.size,
            mtime = excluded.mtime,
            ctime = excluded.ctime,
            last_seen = excluded.last_seen
        "#,
    )
    .bind(path)
    .bind(inode_key)
    .bind(size)
    .bind(mtime)
    .bind(ctime)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Store freshly computed hashes for a path.
pub async fn mark_hashed(
    pool: &SqlitePool,
    path: &str,
    algo: &str,
    sample_size: u64,
    sample_hash: &str,
    full_hash: Option<&str>,
    now: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE agent_index
        SET hashed = 1, hash_algo = ?, hash_sample_size = ?,
            sample_hash = ?, full_hash = ?, last_hashed_at = ?
        WHERE path = ?
        "#,
    )
    .bind(algo)
    .bind(sample_size as i64)
    .bind(sample_hash)
    .bind(full_hash)
    .bind(now)
    .bind(path)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a path as successfully probed for its current inode.
pub async fn mark_probed(pool: &SqlitePool, path: &str) -> Result<()> {
    sqlx::query("UPDATE agent_index SET probed = 1 WHERE path = ?")
        .bind(path)
        .execute(pool)
        .await?;

    Ok(())
}

/// Number of cached paths.
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agent_index")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Latest `last_seen` and `last_hashed_at` across the cache, for
/// diagnostics.
pub async fn latest_timestamps(pool: &SqlitePool) -> Result<(Option<f64>, Option<f64>)> {
    let row = sqlx::query("SELECT MAX(last_seen) AS seen, MAX(last_hashed_at) AS hashed FROM agent_index")
        .fetch_one(pool)
        .await?;
    Ok((row.get("seen"), row.get("hashed")))
}

/// Reuse cache handle with failure degradation: every operation is
/// retried once, and after a repeated store failure the cache switches to
/// no-cache mode (lookups miss, writes drop) so the scan can continue.
pub struct ReuseCache {
    pool: SqlitePool,
    enabled: std::sync::atomic::AtomicBool,
}

impl ReuseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            enabled: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn degrade(&self, op: &str, error: &anyhow::Error) {
        if self
            .enabled
            .swap(false, std::sync::atomic::Ordering::Relaxed)
        {
            tracing::error!(
                op,
                error = %error,
                "Agent cache store failing persistently; continuing WITHOUT reuse cache"
            );
        }
    }

    pub async fn lookup(&self, path: &str) -> Option<CacheEntry> {
        if !self.is_enabled() {
            return None;
        }
        match lookup(&self.pool, path).await {
            Ok(entry) => entry,
            Err(_) => match lookup(&self.pool, path).await {
                Ok(entry) => entry,
                Err(e) => {
                    self.degrade("lookup", &e);
                    None
                }
            },
        }
    }

    pub async fn touch(&self, path: &str, inode_key: &str, size: i64, mtime: f64, ctime: f64, now: f64) {
        if !self.is_enabled() {
            return;
        }
        if touch(&self.pool, path, inode_key, size, mtime, ctime, now)
            .await
            .is_err()
        {
            if let Err(e) = touch(&self.pool, path, inode_key, size, mtime, ctime, now).await {
                self.degrade("touch", &e);
            }
        }
    }

    pub async fn mark_hashed(
        &self,
        path: &str,
        algo: &str,
        sample_size: u64,
        sample_hash: &str,
        full_hash: Option<&str>,
        now: f64,
    ) {
        if !self.is_enabled() {
            return;
        }
        if mark_hashed(&self.pool, path, algo, sample_size, sample_hash, full_hash, now)
            .await
            .is_err()
        {
            if let Err(e) =
                mark_hashed(&self.pool, path, algo, sample_size, sample_hash, full_hash, now).await
            {
                self.degrade("mark_hashed", &e);
            }
        }
    }

    pub async fn mark_probed(&self, path: &str) {
        if !self.is_enabled() {
            return;
        }
        if mark_probed(&self.pool, path).await.is_err() {
            if let Err(e) = mark_probed(&self.pool, path).await {
                self.degrade("mark_probed", &e);
            }
        }
    }
}
