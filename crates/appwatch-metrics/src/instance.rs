//! Collectors for a single workload instance.
//!
//! An `InstanceMetricSet` registers all of its collectors on creation and
//! unregisters them on removal. A set that fails to register is torn back
//! down before the error is returned, so the caller never holds a
//! half-registered set.

use prometheus::core::Collector;
use prometheus::{Counter, CounterVec, Gauge, HistogramVec};
use tracing::debug;

use appwatch_core::{ContainerMetric, STATUS_RANGES};

use crate::error::MetricsError;
use crate::registry::{INSTANCE_LABEL, STATUS_RANGE_LABEL, ScopedRegistry};

/// The metrics owned by one instance of a workload.
pub struct InstanceMetricSet {
    index: u32,
    scope: ScopedRegistry,
    cpu: Gauge,
    crash: Counter,
    disk_bytes: Gauge,
    disk_utilization: Gauge,
    memory_bytes: Gauge,
    memory_utilization: Gauge,
    requests: CounterVec,
    response_time: HistogramVec,
}

impl InstanceMetricSet {
    /// Build the collectors for instance `index` and register them under `scope`.
    pub fn register(index: u32, scope: &ScopedRegistry) -> Result<Self, MetricsError> {
        let scope = scope.with_label(INSTANCE_LABEL, index.to_string());

        let cpu = Gauge::with_opts(scope.opts("cpu", "CPU utilisation in percent (0-100)"))
            .map_err(build_error("cpu"))?;
        let crash = Counter::with_opts(scope.opts("crash", "Number of app instance crashes"))
            .map_err(build_error("crash"))?;
        let disk_bytes = Gauge::with_opts(scope.opts("disk_bytes", "Disk usage in bytes"))
            .map_err(build_error("disk_bytes"))?;
        let disk_utilization = Gauge::with_opts(scope.opts(
            "disk_utilization",
            "Disk space currently in use in percent (0-100)",
        ))
        .map_err(build_error("disk_utilization"))?;
        let memory_bytes = Gauge::with_opts(scope.opts("memory_bytes", "Memory usage in bytes"))
            .map_err(build_error("memory_bytes"))?;
        let memory_utilization = Gauge::with_opts(scope.opts(
            "memory_utilization",
            "Memory currently in use in percent (0-100)",
        ))
        .map_err(build_error("memory_utilization"))?;
        let requests = CounterVec::new(
            scope.opts("requests", "Counter of http requests for a given app instance"),
            &[STATUS_RANGE_LABEL],
        )
        .map_err(build_error("requests"))?;
        let response_time = HistogramVec::new(
            scope.histogram_opts(
                "response_time",
                "Histogram of http request time for a given app instance",
            ),
            &[STATUS_RANGE_LABEL],
        )
        .map_err(build_error("response_time"))?;

        // Zero series for every range so absent traffic reads as 0.
        for range in STATUS_RANGES {
            requests
                .get_metric_with_label_values(&[range])
                .map_err(build_error("requests"))?;
            response_time
                .get_metric_with_label_values(&[range])
                .map_err(build_error("response_time"))?;
        }

        let set = Self {
            index,
            scope,
            cpu,
            crash,
            disk_bytes,
            disk_utilization,
            memory_bytes,
            memory_utilization,
            requests,
            response_time,
        };
        set.register_all()?;

        debug!(instance = index, "instance metrics registered");
        Ok(set)
    }

    /// Apply a resource-usage sample.
    pub fn record_usage(&self, usage: &ContainerMetric) {
        self.cpu.set(usage.cpu_percentage);
        self.disk_bytes.set(usage.disk_bytes as f64);
        self.disk_utilization.set(usage.disk_utilization());
        self.memory_bytes.set(usage.memory_bytes as f64);
        self.memory_utilization.set(usage.memory_utilization());
    }

    pub fn record_crash(&self) {
        self.crash.inc();
    }

    /// Count one request and observe its latency in seconds.
    pub fn record_request(&self, status_range: &str, duration_secs: f64) {
        self.requests.with_label_values(&[status_range]).inc();
        self.response_time
            .with_label_values(&[status_range])
            .observe(duration_secs);
    }

    /// Remove every collector from the registry.
    pub fn unregister(self) {
        for collector in self.collectors() {
            self.scope.unregister(collector);
        }
        debug!(instance = self.index, "instance metrics unregistered");
    }

    fn register_all(&self) -> Result<(), MetricsError> {
        for (registered, collector) in self.collectors().into_iter().enumerate() {
            if let Err(e) = self.scope.register(collector) {
                for collector in self.collectors().into_iter().take(registered) {
                    self.scope.unregister(collector);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.cpu.clone()),
            Box::new(self.crash.clone()),
            Box::new(self.disk_bytes.clone()),
            Box::new(self.disk_utilization.clone()),
            Box::new(self.memory_bytes.clone()),
            Box::new(self.memory_utilization.clone()),
            Box::new(self.requests.clone()),
            Box::new(self.response_time.clone()),
        ]
    }
}

fn build_error(name: &'static str) -> impl Fn(prometheus::Error) -> MetricsError {
    move |source| MetricsError::Build { name, source }
}
