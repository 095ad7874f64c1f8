//! appwatch-metrics — Prometheus collectors for workload instances.
//!
//! Every watched workload gets a [`ScopedRegistry`] that stamps the
//! workload's identity labels onto each collector it builds. Each running
//! instance owns one [`InstanceMetricSet`] registered through that scope.
//!
//! # Architecture
//!
//! ```text
//! prometheus::Registry (shared, process-wide)
//!   └── ScopedRegistry {guid, app, space, organisation}   one per watcher
//!         └── InstanceMetricSet {instance}                one per instance
//!               ├── cpu, crash, disk_bytes, disk_utilization
//!               ├── memory_bytes, memory_utilization
//!               └── requests{status_range}, response_time{status_range}
//!
//! render() → text exposition for the /metrics endpoint
//! ```

pub mod error;
pub mod exposition;
pub mod instance;
pub mod registry;

pub use error::MetricsError;
pub use exposition::{Sample, content_type, render, samples};
pub use instance::InstanceMetricSet;
pub use registry::ScopedRegistry;
