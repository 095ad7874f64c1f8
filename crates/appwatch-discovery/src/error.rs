//! Discovery and watcher error types.

use thiserror::Error;

use appwatch_core::{InventoryError, StreamError, WorkloadIdentity};
use appwatch_metrics::MetricsError;

/// Errors parsing the exit payload of a platform crash log line.
#[derive(Debug, Error)]
pub enum CrashLogError {
    #[error("unable to find start of payload in app instance exit log: {0}")]
    MissingPayload(String),

    #[error("unable to parse payload in app instance exit log: {0}")]
    InvalidPayload(String),
}

/// Errors that end a watcher's event loop.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("envelope stream closed for workload {0}")]
    EnvelopeStreamClosed(WorkloadIdentity),

    #[error("error stream closed for workload {0}")]
    ErrorStreamClosed(WorkloadIdentity),

    #[error("event stream error: {0}")]
    Stream(#[from] StreamError),

    #[error(transparent)]
    CrashLog(#[from] CrashLogError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Conditions that stop the discovery loop. All of them are fatal.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to list workloads: {0}")]
    Inventory(#[from] InventoryError),

    #[error("failed to create watcher for workload {identity}: {source}")]
    CreateWatcher {
        identity: WorkloadIdentity,
        #[source]
        source: WatcherError,
    },

    #[error("watcher for workload {identity} failed: {source}")]
    WatcherFailed {
        identity: WorkloadIdentity,
        #[source]
        source: WatcherError,
    },
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
