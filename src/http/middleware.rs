//! HTTP middleware
//!
//! The access-log wrapper the server applies to every request.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;

/// Access-log middleware
///
/// Emits exactly one log event per completed request: method, remote
/// address, URI, user agent, elapsed time, status code, and response
/// size. It sits on every request's hot path, so it only snapshots a few
/// header values before dispatch and reads the finished response after.
pub async fn access_log(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "-".to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    let size = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(0);

    tracing::info!(
        method = %method,
        remote = %remote,
        uri = %uri,
        user_agent = %user_agent,
        elapsed = ?elapsed,
        status = response.status().as_u16(),
        size,
        "request"
    );

    response
}
