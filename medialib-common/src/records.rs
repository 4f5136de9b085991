//! Ingest wire types
//!
//! These structs are the JSON contract between the remote agent and the
//! host's `/ingest/batch` endpoint. The host upserts records by `path`, so
//! a record may carry only a subset of the optional sub-objects: Pass 1
//! emits `hashes` without `video_meta`, Pass 2 the reverse.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File classification assigned by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Image,
    Subtitle,
    Xml,
    Other,
    Junk,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Video => "video",
            FileKind::Image => "image",
            FileKind::Subtitle => "subtitle",
            FileKind::Xml => "xml",
            FileKind::Other => "other",
            FileKind::Junk => "junk",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content fingerprints for a file.
///
/// `sample_hash` digests the leading `sample_size` bytes; `full_hash` is
/// present only when a whole-file pass was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHashes {
    pub algo: String,
    pub sample_size: u64,
    pub sample_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_hash: Option<String>,
}

/// Normalized video metadata extracted by the prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    /// Duration in seconds; 0 when the container does not report one.
    pub duration: f64,
    /// Container format name, lowercased.
    pub container: String,
    /// Codec of the first video stream; empty when absent.
    pub video_codec: String,
    /// One codec per audio stream, in stream order.
    pub audio_codecs: Vec<String>,
    pub width: i64,
    pub height: i64,
    pub bitrate: i64,
    /// Raw per-stream descriptor array, serialized for forensic use.
    pub streams_json: String,
}

/// One observed file, as delivered to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub kind: FileKind,
    /// Absolute path as observed on the agent.
    pub path: String,
    pub size: u64,
    /// Seconds since epoch, from stat.
    pub mtime: f64,
    pub ctime: f64,
    /// Stable identity of the storage object, typically `device:inode`.
    pub inode_key: String,
    /// Lowercased extension without the leading dot; possibly empty.
    pub ext: String,
    /// Classification cause; only set for `kind == junk`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<FileHashes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_meta: Option<VideoMeta>,
}

/// Payload of one `POST /ingest/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestBatch {
    pub batch_id: String,
    pub files: Vec<FileRecord>,
}
