use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the site server
#[derive(Error, Debug)]
pub enum SiteError {
    #[error("failed to read site root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listener address {address}: {reason}")]
    ListenAddr { address: String, reason: String },

    #[error("bind failed for {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SiteError>;
