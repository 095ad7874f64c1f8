//! appwatch-discovery — workload reconciliation and event watchers.
//!
//! Discovers the running workloads on the platform and keeps one
//! [`Watcher`] per workload. Each watcher consumes its workload's
//! telemetry stream and maintains one `InstanceMetricSet` per instance.
//!
//! # Architecture
//!
//! ```text
//! Discovery (poll loop task)
//!   ├── reconcile() ← every poll interval
//!   │     ├── InventoryClient::list_workloads()
//!   │     └── create / update / recreate / remove watchers
//!   └── failures ← watcher tasks report fatal errors
//!
//! Watcher (one task per running workload)
//!   ├── envelopes → container metric / log line / http start-stop
//!   ├── errors    → fatal
//!   └── control   → scale_to(n), or closed → scale_to(0) and exit
//! ```
//!
//! # Failure model
//!
//! Inventory errors, registration errors, and any end or error of a
//! watcher's event stream stop [`Discovery::run`] with a
//! [`DiscoveryError`]. Out-of-range instance indices are dropped silently.

pub mod crash_log;
pub mod discovery;
pub mod error;
pub mod watcher;

pub use discovery::{Discovery, ReconcileSummary};
pub use error::{CrashLogError, DiscoveryError, DiscoveryResult, WatcherError};
pub use watcher::{DEFAULT_CONTROL_BUFFER, Watcher, WatcherControl};
