//! Application state
//!
//! Shared state handed to every request handler: the immutable site and
//! the resolved configuration. The site's index is frozen before the
//! first listener accepts, so no synchronization is needed here.

use std::time::SystemTime;

use crate::config::ServerConfig;
use crate::site::Site;

/// Shared application state
pub struct AppState {
    /// The static site being served
    pub site: Site,
    /// Resolved runtime configuration
    pub config: ServerConfig,
    /// Process start time, reported by the debug endpoint
    pub started_at: SystemTime,
}

impl AppState {
    pub fn new(site: Site, config: ServerConfig) -> Self {
        Self {
            site,
            config,
            started_at: SystemTime::now(),
        }
    }

    /// Seconds since the server started.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteOptions;
    use tempfile::TempDir;

    #[test]
    fn test_app_state_new() {
        let dir = TempDir::new().unwrap();
        let site = Site::new(dir.path(), SiteOptions::default()).unwrap();
        let state = AppState::new(site, ServerConfig::default());

        assert!(state.site.cached());
        assert!(state.uptime_secs() < 2);
    }
}
