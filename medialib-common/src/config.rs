//! Agent configuration as served by the host's `/ingest/config` endpoint.
//!
//! Every field carries a serde default so a host that omits newer fields
//! still yields a usable configuration, and so the agent can run against
//! an empty object when the host is unreachable and no cached copy exists.

use serde::{Deserialize, Serialize};

/// Extension sets used by the classifier, grouped per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaExtensions {
    #[serde(default = "default_video_exts")]
    pub video: Vec<String>,
    #[serde(default = "default_image_exts")]
    pub image: Vec<String>,
    #[serde(default = "default_subtitle_exts")]
    pub subtitle: Vec<String>,
    #[serde(default = "default_xml_exts")]
    pub xml: Vec<String>,
}

impl Default for MediaExtensions {
    fn default() -> Self {
        Self {
            video: default_video_exts(),
            image: default_image_exts(),
            subtitle: default_subtitle_exts(),
            xml: default_xml_exts(),
        }
    }
}

/// Full agent configuration fetched from the host and refreshed
/// periodically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Roots the agent scans. Empty means "wait for the host".
    #[serde(default)]
    pub remote_roots: Vec<String>,

    #[serde(default = "default_hash_algo")]
    pub hash_algo: String,
    /// Bytes hashed for the cheap sample fingerprint.
    #[serde(default = "default_hash_sample_size")]
    pub hash_sample_size: u64,
    #[serde(default)]
    pub do_full_hash: bool,

    #[serde(default = "default_batch_size")]
    pub agent_batch_size: usize,
    #[serde(default = "default_max_workers")]
    pub agent_max_workers: usize,
    #[serde(default)]
    pub agent_gzip: bool,
    #[serde(default = "default_true")]
    pub agent_adaptive: bool,
    /// Local hour at which full-file hashing becomes allowed.
    #[serde(default = "default_offpeak_start")]
    pub agent_offpeak_start: u32,
    /// Local hour at which full-file hashing stops (exclusive).
    #[serde(default = "default_offpeak_end")]
    pub agent_offpeak_end: u32,

    #[serde(default)]
    pub follow_symlinks: bool,

    /// Shell-glob patterns matched case-insensitively against base names.
    #[serde(default = "default_junk_patterns")]
    pub junk_patterns: Vec<String>,
    /// Extensions exempt from junk classification.
    #[serde(default)]
    pub junk_exclude_extensions: Vec<String>,

    #[serde(default)]
    pub media_extensions: MediaExtensions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            remote_roots: Vec::new(),
            hash_algo: default_hash_algo(),
            hash_sample_size: default_hash_sample_size(),
            do_full_hash: false,
            agent_batch_size: default_batch_size(),
            agent_max_workers: default_max_workers(),
            agent_gzip: false,
            agent_adaptive: true,
            agent_offpeak_start: default_offpeak_start(),
            agent_offpeak_end: default_offpeak_end(),
            follow_symlinks: false,
            junk_patterns: default_junk_patterns(),
            junk_exclude_extensions: Vec::new(),
            media_extensions: MediaExtensions::default(),
        }
    }
}

fn default_hash_algo() -> String {
    "xxhash64".to_string()
}

fn default_hash_sample_size() -> u64 {
    4 * 1024 * 1024
}

fn default_batch_size() -> usize {
    500
}

fn default_max_workers() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_offpeak_start() -> u32 {
    1
}

fn default_offpeak_end() -> u32 {
    6
}

fn default_junk_patterns() -> Vec<String> {
    [
        "*.part",
        "*.partial",
        "*.!qb",
        "*.crdownload",
        "*.tmp",
        "*.temp",
        "*.r00",
        "*.r01",
        "*.r02",
        "*.rar",
        "*.zip",
        "*.7z",
        "*.par2",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_video_exts() -> Vec<String> {
    [
        ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".m4v", ".mpg", ".mpeg", ".ts", ".m2ts", ".webm",
        ".flv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_image_exts() -> Vec<String> {
    [".jpg", ".jpeg", ".png", ".webp", ".gif", ".tbn"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_subtitle_exts() -> Vec<String> {
    [".srt", ".ass", ".ssa", ".vtt", ".sub", ".idx", ".sup"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_xml_exts() -> Vec<String> {
    [".xml", ".nfo"].iter().map(|s| s.to_string()).collect()
}
