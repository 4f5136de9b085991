//! Video metadata extraction via ffprobe
//!
//! Runs ffprobe as a bounded-lifetime subprocess and normalizes its JSON
//! output into the `VideoMeta` wire object. A hung probe is killed after
//! the timeout; all failures are per-file and produce no record.

use medialib_common::records::VideoMeta;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const FFPROBE_COMMAND: &str = "ffprobe";

/// Upper bound on a single probe, including subprocess startup.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Prober errors
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe binary missing or not executable
    #[error("Failed to launch ffprobe: {0}")]
    Launch(std::io::Error),

    /// Probe exceeded the timeout and was killed
    #[error("Probe timed out: {0}")]
    Timeout(PathBuf),

    /// ffprobe exited non-zero
    #[error("ffprobe failed on {path} (exit {code:?}): {stderr}")]
    Failed {
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    /// Output was not the expected JSON
    #[error("Failed to parse ffprobe output for {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
}

/// Whether ffprobe is present on this system. Checked once at startup;
/// when absent the probe pass is skipped entirely.
pub async fn ffprobe_available() -> bool {
    Command::new(FFPROBE_COMMAND)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Probe a video file and normalize the result.
pub async fn probe(path: &Path) -> Result<VideoMeta, ProbeError> {
    let output = Command::new(FFPROBE_COMMAND)
        .args([
            "-v",
            "error",
            "-show_format",
            "-show_streams",
            "-print_format",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    // Dropping the output future on timeout kills the child
    // (kill_on_drop), so a wedged ffprobe cannot outlive its permit.
    let output = match tokio::time::timeout(PROBE_TIMEOUT, output).await {
        Ok(result) => result.map_err(ProbeError::Launch)?,
        Err(_) => return Err(ProbeError::Timeout(path.to_path_buf())),
    };

    if !output.status.success() {
        return Err(ProbeError::Failed {
            path: path.to_path_buf(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let data: Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| ProbeError::Parse(path.to_path_buf(), e))?;

    Ok(normalize(&data))
}

/// Normalize raw ffprobe JSON into the wire shape. Missing numeric fields
/// become 0, missing strings become empty.
fn normalize(data: &Value) -> VideoMeta {
    let format = data.get("format");

    let duration = format
        .and_then(|f| f.get("duration"))
        .and_then(value_as_f64)
        .unwrap_or(0.0);
    let container = format
        .and_then(|f| f.get("format_name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    let bitrate = format
        .and_then(|f| f.get("bit_rate"))
        .and_then(value_as_i64)
        .unwrap_or(0);

    let empty = Vec::new();
    let streams = data
        .get("streams")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut video_codec = String::new();
    let mut audio_codecs = Vec::new();
    let mut width = 0i64;
    let mut height = 0i64;

    for stream in streams {
        let codec_type = stream
            .get("codec_type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let codec_name = stream.get("codec_name").and_then(Value::as_str);

        match codec_type {
            "video" if video_codec.is_empty() => {
                video_codec = codec_name.unwrap_or_default().to_string();
                width = stream.get("width").and_then(value_as_i64).unwrap_or(0);
                height = stream.get("height").and_then(value_as_i64).unwrap_or(0);
            }
            "audio" => {
                if let Some(name) = codec_name {
                    audio_codecs.push(name.to_string());
                }
            }
            _ => {}
        }
    }

    let streams_json = serde_json::to_string(streams).unwrap_or_else(|_| "[]".to_string());

    VideoMeta {
        duration,
        container,
        video_codec,
        audio_codecs,
        width,
        height,
        bitrate,
        streams_json,
    }
}

/// ffprobe reports numbers both as JSON numbers and as strings.
fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn value_as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}
