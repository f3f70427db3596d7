//! HTTP request handlers
//!
//! Implements the site serve handler plus the health, version, and debug
//! endpoints. HTTP status semantics live here; the site itself only knows
//! how to open paths.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::io::ReaderStream;

use crate::state::AppState;

/// HTTP error type
#[derive(Debug)]
pub enum HttpError {
    NotFound(String),
    Forbidden(String),
    InternalError(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HttpError::NotFound(path) => (StatusCode::NOT_FOUND, format!("Not found: {}", path)),
            HttpError::Forbidden(path) => (StatusCode::FORBIDDEN, format!("Forbidden: {}", path)),
            HttpError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, body).into_response()
    }
}

impl HttpError {
    /// Map a lazy open failure onto an HTTP outcome. A file removed or
    /// locked down after the index was built is a client-visible 404/403,
    /// not a process fault.
    fn from_open(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HttpError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => HttpError::Forbidden(path.to_string()),
            _ => HttpError::InternalError(err.to_string()),
        }
    }
}

/// Serve a site path
///
/// Fallback handler for every path no other route matched. Opens the
/// path through the site (memory or disk) and streams it back.
pub async fn serve_site(
    State(state): State<Arc<AppState>>,
    uri: Uri,
) -> Result<Response, HttpError> {
    let path = uri.path();

    let handle = state
        .site
        .open(path)
        .await
        .map_err(|err| HttpError::from_open(path, err))?;
    let stat = handle.stat().clone();

    // no listing and no default-document resolution for directories
    if stat.directory {
        return Err(HttpError::NotFound(path.to_string()));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&stat.mime)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(stat.size));
    if let Some(modified) = http_date(stat.modified) {
        headers.insert(header::LAST_MODIFIED, modified);
    }

    let body = match handle.contents() {
        Some(bytes) => Body::from(bytes),
        None => Body::from_stream(ReaderStream::new(handle)),
    };

    Ok((headers, body).into_response())
}

/// Format a modification time as an HTTP date header value.
fn http_date(modified: SystemTime) -> Option<HeaderValue> {
    let formatted = DateTime::<Utc>::from(modified)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    HeaderValue::from_str(&formatted).ok()
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("site-server v", env!("CARGO_PKG_VERSION"))
}

/// Site statistics reported by the debug endpoint
#[derive(Debug, Serialize)]
pub struct SiteStats {
    pub cached: bool,
    pub indexed_entries: usize,
    pub inline_bytes: u64,
    pub uptime_secs: u64,
}

/// Debug endpoint
/// GET /debug/site
pub async fn site_stats(State(state): State<Arc<AppState>>) -> Json<SiteStats> {
    Json(SiteStats {
        cached: state.site.cached(),
        indexed_entries: state.site.indexed_entries(),
        inline_bytes: state.site.inline_bytes(),
        uptime_secs: state.uptime_secs(),
    })
}
