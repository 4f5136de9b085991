//! Filesystem traversal
//!
//! Walks a root in deterministic depth-first order: entries within each
//! directory are sorted byte-wise by name, files are emitted and
//! subdirectories descended in that order. The walk runs on a blocking
//! thread and feeds `(path, stat)` pairs through a bounded channel, so
//! the orchestrator consumes a stream regardless of tree size.
//!
//! Symlink traversal is opt-in; cycles are prevented by tracking visited
//! directory `inode_key`s per traversal. Unreadable directories are
//! logged and skipped without aborting.

use medialib_common::time::epoch_secs;
use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Channel depth between the walking thread and the orchestrator.
const WALK_CHANNEL_DEPTH: usize = 256;

/// One discovered file with its stat snapshot.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercased extension without the leading dot.
    pub ext: String,
    pub size: u64,
    pub mtime: f64,
    pub ctime: f64,
    pub inode_key: String,
}

/// Stable identity of the underlying storage object.
#[cfg(unix)]
pub fn inode_key(md: &Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    format!("{}:{}", md.dev(), md.ino())
}

/// Portable fallback: identity degrades to size plus mtime, losing
/// rename stability.
#[cfg(not(unix))]
pub fn inode_key(md: &Metadata) -> String {
    let mtime = md.modified().map(epoch_secs).unwrap_or(0.0);
    format!("{}:{}", md.len(), mtime as i64)
}

#[cfg(unix)]
fn ctime_secs(md: &Metadata) -> f64 {
    use std::os::unix::fs::MetadataExt;
    md.ctime() as f64 + md.ctime_nsec() as f64 * 1e-9
}

#[cfg(not(unix))]
fn ctime_secs(md: &Metadata) -> f64 {
    md.created().map(epoch_secs).unwrap_or(0.0)
}

/// Build a `ScanEntry` from a path and its metadata.
fn entry_from(path: PathBuf, md: &Metadata) -> ScanEntry {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = super::classifier::extension_of(&path);
    ScanEntry {
        file_name,
        ext,
        size: md.len(),
        mtime: md.modified().map(epoch_secs).unwrap_or(0.0),
        ctime: ctime_secs(md),
        inode_key: inode_key(md),
        path,
    }
}

/// Stat a single path into a `ScanEntry` (follows symlinks).
pub fn stat_entry(path: &Path) -> std::io::Result<ScanEntry> {
    let md = std::fs::metadata(path)?;
    Ok(entry_from(path.to_path_buf(), &md))
}

/// Start walking `root` on a blocking thread. Entries arrive over the
/// returned channel in deterministic DFS order; paths at or before
/// `cursor` are skipped for resume.
pub fn spawn_walk(
    root: PathBuf,
    follow_symlinks: bool,
    cursor: Option<String>,
    cancel: CancellationToken,
) -> mpsc::Receiver<ScanEntry> {
    let (tx, rx) = mpsc::channel(WALK_CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let mut walk = Walk {
            tx,
            follow_symlinks,
            cursor,
            cancel,
            visited_dirs: HashSet::new(),
        };
        walk.walk_dir(&root);
    });

    rx
}

struct Walk {
    tx: mpsc::Sender<ScanEntry>,
    follow_symlinks: bool,
    cursor: Option<String>,
    cancel: CancellationToken,
    visited_dirs: HashSet<String>,
}

impl Walk {
    /// Recursive DFS over one directory. Returns false when the walk
    /// should stop (cancellation or dropped receiver).
    fn walk_dir(&mut self, dir: &Path) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        // Cycle guard: remember every directory's storage identity.
        match std::fs::metadata(dir) {
            Ok(md) => {
                if !self.visited_dirs.insert(inode_key(&md)) {
                    tracing::warn!(dir = %dir.display(), "Directory cycle detected, skipping");
                    return true;
                }
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot stat directory, skipping");
                return true;
            }
        }

        let reader = match std::fs::read_dir(dir) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot read directory, skipping");
                return true;
            }
        };

        let mut names: Vec<_> = reader
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Unreadable entry, skipping");
                    None
                }
            })
            .collect();
        names.sort_by_key(|e| e.file_name());

        for entry in names {
            if self.cancel.is_cancelled() {
                return false;
            }

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Cannot stat entry, skipping");
                    continue;
                }
            };

            if file_type.is_symlink() && !self.follow_symlinks {
                continue;
            }

            // Resolve through the symlink when following.
            let md = match std::fs::metadata(&path) {
                Ok(md) => md,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Cannot stat entry, skipping");
                    continue;
                }
            };

            if md.is_dir() {
                if !self.walk_dir(&path) {
                    return false;
                }
            } else if md.is_file() {
                if let Some(cursor) = &self.cursor {
                    if path.to_string_lossy().as_ref() <= cursor.as_str() {
                        continue;
                    }
                }
                if self.tx.blocking_send(entry_from(path, &md)).is_err() {
                    // Receiver gone; the phase ended or shut down.
                    return false;
                }
            }
        }

        true
    }
}

/// Pre-count total files and video files under the given roots. Used for
/// progress totals before a scan cycle.
pub fn count_files(
    roots: &[String],
    follow_symlinks: bool,
    video_exts: &HashSet<String>,
) -> (u64, u64) {
    let mut total = 0u64;
    let mut videos = 0u64;
    for root in roots {
        for entry in WalkDir::new(root)
            .follow_links(follow_symlinks)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                total += 1;
                let ext = super::classifier::extension_of(entry.path());
                if video_exts.contains(&ext) {
                    videos += 1;
                }
            }
        }
    }
    (total, videos)
}
