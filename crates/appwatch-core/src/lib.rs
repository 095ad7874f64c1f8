//! appwatch-core — shared types for the appwatch exporter.
//!
//! Defines the workload inventory model, the telemetry envelopes consumed
//! by watchers, and the traits through which the exporter talks to the
//! platform.
//!
//! # Architecture
//!
//! ```text
//! InventoryClient ── list_workloads() ──▶ Vec<WorkloadSnapshot>
//! StreamConnector ── connect(identity) ─▶ EventStreamProvider
//!                                           └── start() ─▶ EventStream
//!                                                 ├── envelopes: Receiver<Envelope>
//!                                                 └── errors:    Receiver<StreamError>
//! ```

pub mod error;
pub mod source;
pub mod types;

pub use error::{InventoryError, StreamError};
pub use source::{EventStream, EventStreamProvider, InventoryClient, StreamConnector};
pub use types::*;
