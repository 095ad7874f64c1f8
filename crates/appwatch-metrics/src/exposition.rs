//! Text exposition and a flattened read-back view of the registry.

use std::collections::BTreeMap;

use prometheus::proto::MetricType;
use prometheus::{Encoder, Registry, TextEncoder};

use crate::error::MetricsError;

/// Content type of [`render`] output.
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Render every registered collector in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let families = registry.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .map_err(|e| MetricsError::Encode(e.to_string()))?;

    String::from_utf8(buffer).map_err(|e| MetricsError::Encode(e.to_string()))
}

/// One gathered series.
///
/// For histograms `value` is the number of observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// Flatten everything currently registered into one sample per series.
pub fn samples(registry: &Registry) -> Vec<Sample> {
    let mut out = Vec::new();
    for family in registry.gather() {
        for metric in family.get_metric() {
            let labels = metric
                .get_label()
                .iter()
                .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                .collect();
            let value = match family.get_field_type() {
                MetricType::COUNTER => metric.get_counter().get_value(),
                MetricType::GAUGE => metric.get_gauge().get_value(),
                MetricType::HISTOGRAM => metric.get_histogram().get_sample_count() as f64,
                MetricType::SUMMARY => metric.get_summary().get_sample_count() as f64,
                MetricType::UNTYPED => metric.get_untyped().get_value(),
            };
            out.push(Sample {
                name: family.get_name().to_string(),
                labels,
                value,
            });
        }
    }
    out
}
