//! Sample store
//!
//! Bounded per-series history of scraped samples, retained just long enough
//! to answer "what was the value approximately `period` ago" for the largest
//! configured rate window. No I/O; mutated only by the owning element's
//! fetch-and-record step.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::contracts::{MetricSample, SampleKind};

/// History for one metric name + label set
#[derive(Debug, Clone)]
pub struct Series {
    labels: BTreeMap<String, String>,
    kind: SampleKind,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl Series {
    fn new(labels: BTreeMap<String, String>, kind: SampleKind) -> Self {
        Self {
            labels,
            kind,
            samples: VecDeque::new(),
        }
    }

    /// Label set identifying this series
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Series kind as most recently reported by the scrape
    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    /// Newest retained sample
    pub fn latest(&self) -> Option<(DateTime<Utc>, f64)> {
        self.samples.back().copied()
    }

    /// Most recent value at or before `target`.
    ///
    /// `None` when no such sample is retained: either the series has no
    /// history reaching back that far, or nothing has been recorded at all.
    pub fn value_at(&self, target: DateTime<Utc>) -> Option<f64> {
        self.samples
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= target)
            .map(|(_, value)| *value)
    }

    /// Append a sample and evict history beyond the retention window.
    ///
    /// Returns false for out-of-order samples, which are dropped.
    fn push(&mut self, timestamp: DateTime<Utc>, value: f64, kind: SampleKind, retain: Duration) -> bool {
        if let Some((newest, _)) = self.latest() {
            if timestamp < newest {
                return false;
            }
        }

        self.kind = kind;
        self.samples.push_back((timestamp, value));

        // Keep one sample at or beyond the left edge of the window so the
        // window's left endpoint stays answerable.
        let cutoff = timestamp - retain;
        while self.samples.len() >= 2 {
            match self.samples.get(1) {
                Some((second, _)) if *second <= cutoff => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }

        true
    }
}

/// Bounded history of scraped samples for one element
#[derive(Debug, Clone)]
pub struct SampleStore {
    retention: Duration,
    series: HashMap<String, Vec<Series>>,
}

impl SampleStore {
    /// Create a store retaining `retention` of history per series.
    ///
    /// The owning element sizes this as its largest configured rate period
    /// plus one grace tick.
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            series: HashMap::new(),
        }
    }

    /// Record one sample.
    ///
    /// Samples for the same series must be non-decreasing in timestamp; an
    /// out-of-order sample is dropped and logged as an anomaly, protecting
    /// rate computation from clock skew.
    pub fn record(&mut self, sample: MetricSample) {
        let retention = self.retention;
        let series_list = self.series.entry(sample.metric.clone()).or_default();

        let series = match series_list.iter_mut().find(|s| s.labels == sample.labels) {
            Some(series) => series,
            None => {
                series_list.push(Series::new(sample.labels.clone(), sample.kind));
                series_list.last_mut().unwrap()
            }
        };

        if !series.push(sample.timestamp, sample.value, sample.kind, retention) {
            tracing::warn!(
                metric = sample.metric.as_str(),
                timestamp = %sample.timestamp,
                "dropping out-of-order sample"
            );
        }
    }

    /// Record a batch of samples in order
    pub fn record_all(&mut self, samples: impl IntoIterator<Item = MetricSample>) {
        for sample in samples {
            self.record(sample);
        }
    }

    /// All series recorded under a metric name
    pub fn series(&self, metric: &str) -> &[Series] {
        self.series.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Most recent value for a specific series at or before `target`
    pub fn value_at(
        &self,
        metric: &str,
        labels: &BTreeMap<String, String>,
        target: DateTime<Utc>,
    ) -> Option<f64> {
        self.series(metric)
            .iter()
            .find(|s| s.labels == *labels)
            .and_then(|s| s.value_at(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn gauge(metric: &str, value: f64, secs: i64) -> MetricSample {
        MetricSample::new(metric, SampleKind::Gauge, value, at(secs))
    }

    #[test]
    fn value_at_returns_most_recent_at_or_before_target() {
        let mut store = SampleStore::new(Duration::seconds(120));
        store.record(gauge("rabbitmq_queues", 3.0, 0));
        store.record(gauge("rabbitmq_queues", 5.0, 30));
        store.record(gauge("rabbitmq_queues", 7.0, 60));

        let labels = BTreeMap::new();
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(30)), Some(5.0));
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(45)), Some(5.0));
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(60)), Some(7.0));
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(90)), Some(7.0));
    }

    #[test]
    fn value_at_is_none_before_oldest_retained_sample() {
        let mut store = SampleStore::new(Duration::seconds(120));
        store.record(gauge("rabbitmq_queues", 3.0, 60));

        let labels = BTreeMap::new();
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(59)), None);
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(60)), Some(3.0));
    }

    #[test]
    fn value_at_is_none_for_unseen_metric() {
        let store = SampleStore::new(Duration::seconds(120));
        assert_eq!(store.value_at("rabbitmq_queues", &BTreeMap::new(), at(0)), None);
    }

    #[test]
    fn out_of_order_sample_is_dropped() {
        let mut store = SampleStore::new(Duration::seconds(120));
        store.record(gauge("rabbitmq_queues", 5.0, 60));
        store.record(gauge("rabbitmq_queues", 9.0, 30));

        let labels = BTreeMap::new();
        // the stale sample did not land
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(45)), None);
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(60)), Some(5.0));
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut store = SampleStore::new(Duration::seconds(120));
        store.record(gauge("rabbitmq_queues", 5.0, 60));
        store.record(gauge("rabbitmq_queues", 6.0, 60));

        let labels = BTreeMap::new();
        assert_eq!(store.value_at("rabbitmq_queues", &labels, at(60)), Some(6.0));
    }

    #[test]
    fn eviction_keeps_window_left_endpoint_answerable() {
        let mut store = SampleStore::new(Duration::seconds(60));
        for i in 0..10 {
            store.record(gauge("m", i as f64, i * 30));
        }

        let labels = BTreeMap::new();
        // newest is t=270; window left edge is t=210; the sample at t=210
        // must still answer, anything older is gone
        assert_eq!(store.value_at("m", &labels, at(210)), Some(7.0));
        assert_eq!(store.value_at("m", &labels, at(180)), None);
        assert_eq!(store.series("m")[0].samples.len(), 3);
    }

    #[test]
    fn series_are_split_by_label_set() {
        let mut store = SampleStore::new(Duration::seconds(120));
        let q1: BTreeMap<_, _> = [("queue".to_string(), "q1".to_string())].into();
        let q2: BTreeMap<_, _> = [("queue".to_string(), "q2".to_string())].into();
        store.record(gauge("rabbitmq_queue_messages", 1.0, 0).with_labels(q1.clone()));
        store.record(gauge("rabbitmq_queue_messages", 9.0, 0).with_labels(q2.clone()));

        assert_eq!(store.series("rabbitmq_queue_messages").len(), 2);
        assert_eq!(store.value_at("rabbitmq_queue_messages", &q1, at(0)), Some(1.0));
        assert_eq!(store.value_at("rabbitmq_queue_messages", &q2, at(0)), Some(9.0));
    }
}
