//! Server configuration
//!
//! Loads configuration from TOML files and parses listener addresses.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SiteError;

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Hosted site settings
    pub site: SiteSettings,
    /// Listener/server tuning
    pub server: Option<ServerSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    /// Content root directory to expose
    pub path: String,
    /// Listeners to bind
    pub listeners: Vec<ListenerSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerSettings {
    /// Address in `scheme://host[:port]` form
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: Option<u64>,
    /// Per-request read+write budget in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// Graceful shutdown drain deadline in seconds
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        let server = self.server.unwrap_or(ServerSettings {
            idle_timeout_secs: None,
            request_timeout_ms: None,
            shutdown_timeout_secs: None,
        });

        ServerConfig {
            content_root: PathBuf::from(self.site.path),
            listeners: self
                .site
                .listeners
                .into_iter()
                .map(|l| l.address)
                .collect(),
            idle_timeout: server
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            request_timeout: server
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            shutdown_timeout: server
                .shutdown_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            log_level: self
                .logging
                .map(|l| l.level)
                .unwrap_or(defaults.log_level),
        }
    }
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Content root directory exposed over the listeners
    pub content_root: PathBuf,
    /// Listener addresses in `scheme://host[:port]` form
    pub listeners: Vec<String>,
    /// Idle connection timeout (keep-alive probe interval and the budget
    /// for an idle connection to present its next request)
    pub idle_timeout: Duration,
    /// Per-request read+write budget
    pub request_timeout: Duration,
    /// Graceful shutdown drain deadline
    pub shutdown_timeout: Duration,
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("./public/www"),
            listeners: vec!["tcp://127.0.0.1:8080".to_string()],
            idle_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(60),
            log_level: "info".to_string(),
        }
    }
}

/// A parsed listener address
///
/// Missing scheme defaults to `tcp`, missing port to 80. Only `tcp`,
/// `tcp4` and `tcp6` are accepted; `tcp4`/`tcp6` restrict resolution to
/// the matching address family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl FromStr for ListenAddr {
    type Err = SiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = if s.contains("://") {
            s.to_string()
        } else {
            format!("tcp://{}", s)
        };

        let url = Url::parse(&normalized).map_err(|err| SiteError::ListenAddr {
            address: s.to_string(),
            reason: err.to_string(),
        })?;

        let scheme = url.scheme().to_string();
        if !matches!(scheme.as_str(), "tcp" | "tcp4" | "tcp6") {
            return Err(SiteError::ListenAddr {
                address: s.to_string(),
                reason: format!("unsupported scheme {:?}", scheme),
            });
        }

        let host = url
            .host_str()
            .map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SiteError::ListenAddr {
                address: s.to_string(),
                reason: "missing host".to_string(),
            })?;

        Ok(Self {
            scheme,
            host,
            port: url.port().unwrap_or(80),
        })
    }
}

impl ListenAddr {
    /// Whether a resolved socket address matches this address family.
    pub fn matches_family(&self, addr: &std::net::SocketAddr) -> bool {
        match self.scheme.as_str() {
            "tcp4" => addr.is_ipv4(),
            "tcp6" => addr.is_ipv6(),
            _ => true,
        }
    }
}

impl std::fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_listen_addr_full_form() {
        let addr: ListenAddr = "tcp://0.0.0.0:8080".parse().unwrap();
        assert_eq!(addr.scheme, "tcp");
        assert_eq!(addr.host, "0.0.0.0");
        assert_eq!(addr.port, 8080);
    }

    #[test]
    fn test_listen_addr_default_scheme() {
        let addr: ListenAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(addr.scheme, "tcp");
        assert_eq!(addr.port, 9000);
    }

    #[test]
    fn test_listen_addr_default_port() {
        let addr: ListenAddr = "tcp://localhost".parse().unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 80);
    }

    #[test]
    fn test_listen_addr_rejects_unknown_scheme() {
        assert!("unix:///tmp/site.sock".parse::<ListenAddr>().is_err());
        assert!("http://localhost:8080".parse::<ListenAddr>().is_err());
    }

    #[test]
    fn test_listen_addr_families() {
        let v4: ListenAddr = "tcp4://127.0.0.1:80".parse().unwrap();
        let v6: ListenAddr = "tcp6://[::1]:80".parse().unwrap();
        let any4: std::net::SocketAddr = "127.0.0.1:80".parse().unwrap();
        let any6: std::net::SocketAddr = "[::1]:80".parse().unwrap();

        assert!(v4.matches_family(&any4));
        assert!(!v4.matches_family(&any6));
        assert!(v6.matches_family(&any6));
        assert!(!v6.matches_family(&any4));
    }

    #[test]
    fn test_config_file_load() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[site]
path = "./www"

[[site.listeners]]
address = "tcp://0.0.0.0:8080"

[[site.listeners]]
address = "tcp6://[::]:8081"

[server]
idle_timeout_secs = 30
request_timeout_ms = 500

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = ConfigFile::from_file(file.path()).unwrap().into_server_config();
        assert_eq!(config.content_root, PathBuf::from("./www"));
        assert_eq!(config.listeners.len(), 2);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_millis(500));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(60));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listeners, vec!["tcp://127.0.0.1:8080".to_string()]);
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(1));
    }
}
