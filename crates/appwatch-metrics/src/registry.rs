//! A labelled view over the shared Prometheus registry.
//!
//! The Rust `prometheus` crate has no wrapping registerer, so the scope
//! carries its labels and bakes them into every collector's options as
//! constant labels. Registration still targets the one shared registry.

use std::collections::HashMap;

use prometheus::core::Collector;
use prometheus::{HistogramOpts, Opts, Registry};
use tracing::warn;

use appwatch_core::{WorkloadIdentity, WorkloadMetadata};

use crate::error::MetricsError;

pub const GUID_LABEL: &str = "guid";
pub const APP_LABEL: &str = "app";
pub const SPACE_LABEL: &str = "space";
pub const ORGANISATION_LABEL: &str = "organisation";
pub const INSTANCE_LABEL: &str = "instance";
pub const STATUS_RANGE_LABEL: &str = "status_range";

/// Registry handle bound to a fixed set of constant labels.
#[derive(Clone, Debug)]
pub struct ScopedRegistry {
    registry: Registry,
    labels: HashMap<String, String>,
}

impl ScopedRegistry {
    pub fn new(registry: Registry, labels: HashMap<String, String>) -> Self {
        Self { registry, labels }
    }

    /// Scope carrying a workload's `guid`, `app`, `space` and `organisation` labels.
    pub fn for_workload(
        registry: &Registry,
        identity: &WorkloadIdentity,
        metadata: &WorkloadMetadata,
    ) -> Self {
        let labels = HashMap::from([
            (GUID_LABEL.to_string(), identity.to_string()),
            (APP_LABEL.to_string(), metadata.name.clone()),
            (SPACE_LABEL.to_string(), metadata.namespace.clone()),
            (ORGANISATION_LABEL.to_string(), metadata.organization.clone()),
        ]);
        Self::new(registry.clone(), labels)
    }

    /// A narrower scope with one more constant label.
    pub fn with_label(&self, name: &str, value: impl Into<String>) -> Self {
        let mut labels = self.labels.clone();
        labels.insert(name.to_string(), value.into());
        Self::new(self.registry.clone(), labels)
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    /// Counter/gauge options carrying this scope's labels.
    pub fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help).const_labels(self.labels.clone())
    }

    /// Histogram options carrying this scope's labels.
    pub fn histogram_opts(&self, name: &str, help: &str) -> HistogramOpts {
        HistogramOpts::new(name, help).const_labels(self.labels.clone())
    }

    pub fn register(&self, collector: Box<dyn Collector>) -> Result<(), MetricsError> {
        let name = collector_name(collector.as_ref());
        self.registry
            .register(collector)
            .map_err(|source| MetricsError::Register { name, source })
    }

    /// Remove a collector. Failures are logged, never raised.
    pub fn unregister(&self, collector: Box<dyn Collector>) {
        let name = collector_name(collector.as_ref());
        if let Err(e) = self.registry.unregister(collector) {
            warn!(metric = %name, error = %e, "failed to unregister metric");
        }
    }
}

fn collector_name(collector: &dyn Collector) -> String {
    collector
        .desc()
        .first()
        .map(|desc| desc.fq_name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Gauge;

    fn metadata() -> WorkloadMetadata {
        WorkloadMetadata {
            name: "foo".to_string(),
            namespace: "dev".to_string(),
            organization: "acme".to_string(),
        }
    }

    #[test]
    fn workload_scope_carries_identity_labels() {
        let scope = ScopedRegistry::for_workload(&Registry::new(), &"g1".into(), &metadata());
        let labels = scope.labels();
        assert_eq!(labels[GUID_LABEL], "g1");
        assert_eq!(labels[APP_LABEL], "foo");
        assert_eq!(labels[SPACE_LABEL], "dev");
        assert_eq!(labels[ORGANISATION_LABEL], "acme");
    }

    #[test]
    fn with_label_extends_without_mutating_parent() {
        let scope = ScopedRegistry::for_workload(&Registry::new(), &"g1".into(), &metadata());
        let child = scope.with_label(INSTANCE_LABEL, "3");
        assert_eq!(child.labels()[INSTANCE_LABEL], "3");
        assert!(!scope.labels().contains_key(INSTANCE_LABEL));
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let registry = Registry::new();
        let scope = ScopedRegistry::for_workload(&registry, &"g1".into(), &metadata());
        let gauge = Gauge::with_opts(scope.opts("cpu", "CPU")).unwrap();

        scope.register(Box::new(gauge.clone())).unwrap();
        let err = scope.register(Box::new(gauge)).unwrap_err();
        assert!(matches!(err, MetricsError::Register { ref name, .. } if name == "cpu"));
    }

    #[test]
    fn unregister_unknown_collector_is_a_no_op() {
        let registry = Registry::new();
        let scope = ScopedRegistry::for_workload(&registry, &"g1".into(), &metadata());
        let gauge = Gauge::with_opts(scope.opts("cpu", "CPU")).unwrap();

        scope.unregister(Box::new(gauge));
        assert!(registry.gather().is_empty());
    }

    #[test]
    fn registered_gauge_is_gathered_with_scope_labels() {
        let registry = Registry::new();
        let scope = ScopedRegistry::for_workload(&registry, &"g1".into(), &metadata());
        let gauge = Gauge::with_opts(scope.opts("cpu", "CPU")).unwrap();
        scope.register(Box::new(gauge.clone())).unwrap();
        gauge.set(12.5);

        let families = registry.gather();
        assert_eq!(families.len(), 1);
        let metric = &families[0].get_metric()[0];
        let guid = metric
            .get_label()
            .iter()
            .find(|pair| pair.get_name() == GUID_LABEL)
            .map(|pair| pair.get_value().to_string());
        assert_eq!(guid.as_deref(), Some("g1"));
        assert_eq!(metric.get_gauge().get_value(), 12.5);
    }
}
