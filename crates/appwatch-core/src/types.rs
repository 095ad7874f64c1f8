//! Domain types shared by discovery, watchers, and the daemon.
//!
//! Workload records come from the platform inventory once per poll;
//! envelopes arrive continuously on each workload's event stream. All
//! types are serde-serializable so the daemon can decode them straight
//! off the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source type the platform stamps on log lines emitted by its own API.
pub const API_SOURCE_TYPE: &str = "API";

/// The status ranges every instance reports, even before any traffic.
pub const STATUS_RANGES: [&str; 4] = ["2xx", "3xx", "4xx", "5xx"];

// ── Workloads ──────────────────────────────────────────────────────

/// Stable unique id (GUID) of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadIdentity(String);

impl WorkloadIdentity {
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkloadIdentity {
    fn from(guid: &str) -> Self {
        Self::new(guid)
    }
}

/// Human-readable names baked into a watcher's metric labels.
///
/// Any difference between two values means the workload's metrics must
/// be re-registered under new labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadMetadata {
    pub name: String,
    #[serde(default, alias = "space")]
    pub namespace: String,
    #[serde(default, alias = "org")]
    pub organization: String,
}

/// Desired run state of a workload as reported by the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    #[serde(alias = "STARTED")]
    Running,
    #[serde(alias = "STOPPED")]
    Stopped,
}

/// One workload as returned by a single inventory poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    #[serde(rename = "guid")]
    pub identity: WorkloadIdentity,
    #[serde(flatten)]
    pub metadata: WorkloadMetadata,
    /// Desired instance count.
    pub instances: u32,
    pub state: RunningState,
}

impl WorkloadSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == RunningState::Running
    }
}

// ── Envelopes ──────────────────────────────────────────────────────

/// One event from a workload's telemetry stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    ContainerMetric(ContainerMetric),
    LogMessage(LogMessage),
    HttpStartStop(HttpStartStop),
    /// Any envelope kind the exporter does not consume.
    #[serde(other)]
    Other,
}

/// Periodic resource-usage sample for one instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetric {
    pub instance_index: u32,
    pub cpu_percentage: f64,
    pub memory_bytes: u64,
    pub memory_bytes_quota: u64,
    pub disk_bytes: u64,
    pub disk_bytes_quota: u64,
}

impl ContainerMetric {
    /// Disk in use as a percentage of quota (0-100).
    pub fn disk_utilization(&self) -> f64 {
        percentage(self.disk_bytes, self.disk_bytes_quota)
    }

    /// Memory in use as a percentage of quota (0-100).
    pub fn memory_utilization(&self) -> f64 {
        percentage(self.memory_bytes, self.memory_bytes_quota)
    }
}

fn percentage(used: u64, quota: u64) -> f64 {
    if quota == 0 {
        return 0.0;
    }
    used as f64 / quota as f64 * 100.0
}

/// Which output stream a log line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[serde(alias = "OUT")]
    Out,
    #[serde(alias = "ERR")]
    Err,
}

/// A single log line from the workload or the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
    pub message_type: MessageType,
    pub source_type: String,
}

impl LogMessage {
    /// Whether the line was written by the platform API on stdout.
    pub fn is_platform_api_output(&self) -> bool {
        self.source_type == API_SOURCE_TYPE && self.message_type == MessageType::Out
    }
}

/// A completed HTTP request routed to one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpStartStop {
    /// Nanoseconds since the epoch.
    pub start_timestamp: i64,
    /// Nanoseconds since the epoch.
    pub stop_timestamp: i64,
    pub status_code: i32,
    pub instance_index: u32,
}

impl HttpStartStop {
    /// Request duration in seconds, never negative.
    pub fn duration_secs(&self) -> f64 {
        let nanos = self.stop_timestamp.saturating_sub(self.start_timestamp).max(0);
        nanos as f64 / 1_000_000_000.0
    }

    /// The status code bucketed to its hundreds digit, e.g. `404` → `"4xx"`.
    pub fn status_range(&self) -> String {
        status_range(self.status_code)
    }
}

/// Bucket an HTTP status code to `"<hundreds digit>xx"`.
pub fn status_range(status_code: i32) -> String {
    format!("{}xx", status_code / 100)
}
