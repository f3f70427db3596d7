//! Axum router configuration

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{health_check, serve_site, site_stats, version_check};

/// Create the router with all routes
///
/// Every path that is not a health, version, or debug endpoint falls
/// through to the site handler.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // Debug endpoints
        .route("/debug/site", get(site_stats))
        // Everything else is site content
        .fallback(serve_site)
        // Middleware
        .layer(TraceLayer::new_for_http())
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::site::{Site, SiteOptions};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::fs;
    use tempfile::TempDir;
    use tower::util::ServiceExt; // for oneshot

    fn test_state(dir: &TempDir) -> Arc<AppState> {
        let site = Site::new(dir.path(), SiteOptions::default()).unwrap();
        Arc::new(AppState::new(site, ServerConfig::default()))
    }

    async fn get_path(app: Router, path: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = TempDir::new().unwrap();
        let response = get_path(create_router(test_state(&dir)), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_serves_indexed_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("page.html"), b"<html>hi</html>").unwrap();

        let response = get_path(create_router(test_state(&dir)), "/page.html").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("html"));
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "15"
        );
        assert!(response.headers().get(header::LAST_MODIFIED).is_some());

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<html>hi</html>");
    }

    #[tokio::test]
    async fn test_serves_large_file_from_disk() {
        let dir = TempDir::new().unwrap();
        let payload = vec![9u8; 3 * 1024 * 1024];
        fs::write(dir.path().join("big.bin"), &payload).unwrap();

        let response = get_path(create_router(test_state(&dir)), "/big.bin").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), payload.len() + 1)
            .await
            .unwrap();
        assert_eq!(body.len(), payload.len());
        assert_eq!(&body[..], &payload[..]);
    }

    #[tokio::test]
    async fn test_missing_path_is_404() {
        let dir = TempDir::new().unwrap();
        let response = get_path(create_router(test_state(&dir)), "/nope.txt").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_request_is_404() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/app.js"), b"let x = 1;").unwrap();

        let app = create_router(test_state(&dir));
        let response = get_path(app.clone(), "/assets").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get_path(app, "/assets/app.js").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
