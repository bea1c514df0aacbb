//! Broker Health Agent Contracts
//!
//! Defines the data model shared between the aggregation engine, the fetch
//! clients and downstream consumers of health reports.

mod verdict;

pub use verdict::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of an exposition series, as declared by the scrape's `# TYPE` line.
///
/// Counter-reset detection only applies to counter series; gauges may
/// legitimately decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Monotonically increasing counter
    Counter,
    /// Freely varying gauge
    Gauge,
    /// Series with no declared type
    Untyped,
}

/// One parsed sample from a metrics endpoint. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name
    pub metric: String,

    /// Label set identifying the series within the metric
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Series kind from the exposition type declaration
    pub kind: SampleKind,

    /// Sample value
    pub value: f64,

    /// Sample timestamp
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Create a sample with an empty label set
    pub fn new(
        metric: impl Into<String>,
        kind: SampleKind,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            metric: metric.into(),
            labels: BTreeMap::new(),
            kind,
            value,
            timestamp,
        }
    }

    /// Attach a label set
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}

/// An alert currently firing in the alerting backend.
///
/// Transient: supplied fresh each tick by the alert feed and never persisted
/// by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlert {
    /// Alert name (the `alertname` label)
    pub name: String,

    /// Full label set of the firing alert
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// When the alert became active
    pub since: DateTime<Utc>,
}
