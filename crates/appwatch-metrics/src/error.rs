//! Metrics error types.

use thiserror::Error;

/// Errors raised while building, registering, or encoding collectors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to build metric {name}: {source}")]
    Build {
        name: &'static str,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to register metric {name}: {source}")]
    Register {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to encode metrics: {0}")]
    Encode(String),
}
