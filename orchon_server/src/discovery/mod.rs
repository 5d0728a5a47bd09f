//! Infrastructure discovery: rule tables and the pure classifiers that
//! apply them. File and network access lives in the scanner and DNS
//! services.

pub mod classify;
pub mod domain;
pub mod rules;

use crate::models::infra::DiscoveryError;

/// Why a single discovery source produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to lookup {domain}: {message}")]
    Dns { domain: String, message: String },
}

impl SourceError {
    /// Tag with the source it came from. Every source failure is recoverable.
    pub fn into_discovery_error(self, source: &str) -> DiscoveryError {
        crate::metrics::discovery_error(source);
        DiscoveryError::recoverable(source, self.to_string())
    }
}
