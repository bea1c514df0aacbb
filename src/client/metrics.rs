//! Metrics endpoint scraper
//!
//! Fetches a Prometheus text-exposition dump and parses it with
//! `prometheus_parse`. Counter, gauge and untyped series become scalar
//! samples; histogram and summary series have no scalar reading and are
//! skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use prometheus_parse::{Sample, Scrape, Value};

use super::FetchError;
use crate::contracts::{MetricSample, SampleKind};
use crate::engine::{FeedFuture, SampleFeed};

/// Scraper for one element's metrics endpoint
pub struct MetricsClient {
    url: String,
    client: reqwest::Client,
    timeout_ms: u64,
}

impl MetricsClient {
    /// Build a scraper for the endpoint at `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|e| FetchError::Endpoint {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Endpoint {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            url,
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Fetch and parse one exposition dump
    pub async fn scrape(&self) -> Result<Vec<MetricSample>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout_ms))?;

        let lines = body.lines().map(|line| Ok(line.to_owned()));
        let scrape = Scrape::parse(lines).map_err(|e| FetchError::Parse(e.to_string()))?;

        Ok(scrape
            .samples
            .into_iter()
            .filter_map(convert_sample)
            .collect())
    }
}

impl SampleFeed for MetricsClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> FeedFuture<'_, Vec<MetricSample>> {
        Box::pin(self.scrape())
    }
}

fn convert_sample(sample: Sample) -> Option<MetricSample> {
    let (kind, value) = match sample.value {
        Value::Counter(v) => (SampleKind::Counter, v),
        Value::Gauge(v) => (SampleKind::Gauge, v),
        Value::Untyped(v) => (SampleKind::Untyped, v),
        Value::Histogram(_) | Value::Summary(_) => {
            tracing::debug!(
                metric = sample.metric.as_str(),
                "skipping non-scalar series"
            );
            return None;
        }
    };

    let labels: BTreeMap<String, String> = sample
        .labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Some(
        MetricSample::new(sample.metric, kind, value, sample.timestamp).with_labels(labels),
    )
}
