//! Error types for the platform collaborators.

use thiserror::Error;

/// Failure to fetch the workload inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory request failed: {0}")]
    Request(String),

    #[error("inventory returned status {0}")]
    Status(u16),

    #[error("failed to decode inventory response: {0}")]
    Decode(String),
}

/// Failure reported on a workload's event stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect event stream: {0}")]
    Connect(String),

    #[error("event stream returned status {0}")]
    Status(u16),

    #[error("event stream read error: {0}")]
    Read(String),

    #[error("failed to decode envelope: {0}")]
    Decode(String),
}
