//! Static site server
//!
//! Serves one content root over any number of listeners, front-loading
//! every small file into an immutable in-memory index at boot so the hot
//! path never touches disk.

#![allow(dead_code)]

mod config;
mod env;
mod error;
mod http;
mod server;
mod site;
mod state;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigFile, ListenAddr, ServerConfig};
use crate::error::Result;
use crate::http::create_router;
use crate::server::{Server, ServerOptions};
use crate::site::Site;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "site-server";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "site.toml".to_string());
    let mut config_warning = None;
    let config = if std::path::Path::new(&config_path).exists() {
        match ConfigFile::from_file(&config_path) {
            Ok(cf) => cf.into_server_config(),
            Err(e) => {
                config_warning = Some(format!(
                    "Failed to load config file {}: {}. Using defaults.",
                    config_path, e
                ));
                ServerConfig::default()
            }
        }
    } else {
        ServerConfig::default()
    };

    // Initialize logging
    init_logging(&config.log_level);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(warning) = config_warning {
        tracing::warn!("{}", warning);
    }
    tracing::info!("Configuration loaded: {:?}", config);

    // Build the site; a bad content root is fatal
    let site = Site::from_env(&config.content_root)?;

    // Create application state and build the router
    let state = Arc::new(AppState::new(site, config.clone()));
    let app = create_router(state);

    // Start one listener per configured address
    let server = Arc::new(Server::new(app, ServerOptions::from_config(&config)));
    for address in &config.listeners {
        let addr: ListenAddr = address.parse()?;
        let listening = server.clone();
        tokio::spawn(async move {
            if let Err(err) = listening.listen(&addr).await {
                tracing::error!("listener {} failed: {}", addr, err);
                std::process::exit(1);
            }
        });
    }

    // Serve until interrupted, then drain
    tokio::signal::ctrl_c()
        .await
        .map_err(crate::error::SiteError::Io)?;
    tracing::info!("shutdown signal received");

    let outcome = server.shutdown(config.shutdown_timeout).await;
    if !outcome.is_clean() {
        tracing::warn!("shutdown finished degraded: {:?}", outcome);
    }

    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: &str) {
    let fallback = format!("site_server={level},tower_http={level}");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
