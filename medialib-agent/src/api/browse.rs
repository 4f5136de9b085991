//! Directory listing endpoint
//!
//! Lets the host browse the agent's filesystem when picking remote
//! roots. Read-only; entries are sorted directories-first, then
//! case-insensitively by name.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::Query;
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct LsParams {
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Serialize)]
pub struct LsEntry {
    pub name: String,
    pub kind: &'static str,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct LsResponse {
    pub path: String,
    pub entries: Vec<LsEntry>,
}

/// GET /agent/ls?path=<dir>
pub async fn ls(Query(params): Query<LsParams>) -> ApiResult<Json<LsResponse>> {
    let path = Path::new(&params.path);
    if !path.exists() {
        return Err(ApiError::NotFound(params.path));
    }

    let reader = std::fs::read_dir(path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => ApiError::Forbidden(params.path.clone()),
        ErrorKind::NotFound => ApiError::NotFound(params.path.clone()),
        _ => ApiError::Io(e),
    })?;

    let mut entries = Vec::new();
    for entry in reader.flatten() {
        let md = match entry.metadata() {
            Ok(md) => md,
            Err(_) => continue,
        };
        entries.push(LsEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind: if md.is_dir() { "dir" } else { "file" },
            size: if md.is_dir() { 0 } else { md.len() },
        });
    }
    entries.sort_by(|a, b| {
        (a.kind != "dir")
            .cmp(&(b.kind != "dir"))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    Ok(Json(LsResponse {
        path: params.path,
        entries,
    }))
}

pub fn browse_routes() -> Router<AppState> {
    Router::new().route("/agent/ls", get(ls))
}
