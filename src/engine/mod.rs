//! Health aggregation engine
//!
//! Runs one evaluation tick: concurrent fetches from the alert backend and
//! every element's metrics endpoint, sample-store append, bound evaluation,
//! alert matching, and the fold into a tick report. Fetch failures are
//! isolated per collaborator; a tick that fetches nothing still reports
//! (unknown everywhere).

pub mod alert;
pub mod bound;

pub use alert::AlertRule;
pub use bound::{Bound, BoundRule};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};

use crate::client::{AlertsClient, FetchError, MetricsClient};
use crate::config::{Config, ConfigError};
use crate::contracts::{ActiveAlert, AlertsOutcome, HealthVerdict, MetricSample, TickReport};
use crate::store::SampleStore;

/// Injectable time source, so time-windowed rate logic is testable without
/// wall-clock waits.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Future type returned by feed implementations
pub type FeedFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'a>>;

/// Source of parsed samples for one element
pub trait SampleFeed: Send + Sync {
    /// Endpoint this feed scrapes, for logging
    fn endpoint(&self) -> &str;

    /// Fetch one batch of samples
    fn fetch(&self) -> FeedFuture<'_, Vec<MetricSample>>;
}

/// Source of the currently firing alerts
pub trait AlertFeed: Send + Sync {
    /// Fetch the firing alerts
    fn fetch(&self) -> FeedFuture<'_, Vec<ActiveAlert>>;
}

/// One monitored element: its feed, its ordered bound rules and its
/// exclusively-owned sample store.
pub struct ElementMonitor {
    id: String,
    bounds: Vec<BoundRule>,
    store: SampleStore,
    feed: Box<dyn SampleFeed>,
}

impl ElementMonitor {
    /// Create a monitor. The store retains the largest configured rate
    /// period plus `grace` (one tick interval) of history.
    pub fn new(
        id: impl Into<String>,
        feed: Box<dyn SampleFeed>,
        bounds: Vec<BoundRule>,
        grace: Duration,
    ) -> Self {
        let window = bounds
            .iter()
            .filter_map(|rule| rule.bound.period())
            .max()
            .unwrap_or_else(Duration::zero);

        Self {
            id: id.into(),
            bounds,
            store: SampleStore::new(window + grace),
            feed,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, samples: Vec<MetricSample>) {
        self.store.record_all(samples);
    }

    /// Evaluate every bound in configured order against the current store
    /// snapshot. Pure; bit order matches rule order.
    fn evaluate(&self, now: DateTime<Utc>) -> HealthVerdict {
        let bits = self
            .bounds
            .iter()
            .map(|rule| rule.evaluate(&self.store, now))
            .collect();
        HealthVerdict::from_bits(&self.id, bits)
    }

    /// All-unknown verdict for a tick whose fetch failed, bit positions
    /// still aligned with the configured rules.
    fn unavailable(&self, cause: impl Into<String>) -> HealthVerdict {
        HealthVerdict::unavailable(
            &self.id,
            self.bounds
                .iter()
                .map(|rule| (rule.metric.clone(), rule.bound.describe())),
            cause,
        )
    }
}

/// The aggregation engine: all monitored elements, the alert rules and the
/// alert feed, driven by an injectable clock.
pub struct HealthEngine {
    elements: Vec<ElementMonitor>,
    alert_rules: Vec<AlertRule>,
    alert_feed: Box<dyn AlertFeed>,
    tick_interval: std::time::Duration,
    fetch_timeout: std::time::Duration,
    clock: Arc<dyn Clock>,
}

impl HealthEngine {
    pub fn new(
        elements: Vec<ElementMonitor>,
        alert_rules: Vec<AlertRule>,
        alert_feed: Box<dyn AlertFeed>,
        tick_interval: std::time::Duration,
        fetch_timeout: std::time::Duration,
    ) -> Self {
        Self {
            elements,
            alert_rules,
            alert_feed,
            tick_interval,
            fetch_timeout,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock (deterministic tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the engine from a validated configuration, wiring real HTTP
    /// clients for every collaborator.
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let tick_interval = to_std(cfg.agent.tick_interval(), "tick_interval")?;
        let fetch_timeout = to_std(cfg.agent.fetch_timeout(), "fetch_timeout")?;
        let grace = cfg.agent.tick_interval();

        let alert_feed = AlertsClient::new(&cfg.prometheus.url, fetch_timeout).map_err(|e| {
            ConfigError::InvalidEndpoint {
                url: cfg.prometheus.url.clone(),
                reason: e.to_string(),
            }
        })?;

        let alert_rules: Vec<AlertRule> = cfg
            .prometheus
            .alerts
            .iter()
            .cloned()
            .map(Into::into)
            .collect();

        let mut elements = Vec::with_capacity(cfg.elements.len());
        for element in &cfg.elements {
            let bounds = element
                .bounds
                .iter()
                .map(|spec| spec.to_rule())
                .collect::<Result<Vec<_>, _>>()?;

            let feed = MetricsClient::new(&element.url, fetch_timeout).map_err(|e| {
                ConfigError::InvalidEndpoint {
                    url: element.url.clone(),
                    reason: e.to_string(),
                }
            })?;

            elements.push(ElementMonitor::new(
                element.id(),
                Box::new(feed),
                bounds,
                grace,
            ));
        }

        Ok(Self::new(
            elements,
            alert_rules,
            Box::new(alert_feed),
            tick_interval,
            fetch_timeout,
        ))
    }

    /// Run one evaluation tick.
    ///
    /// Element fetches and the alert fetch run concurrently, each bounded by
    /// the per-fetch timeout; stores are only touched after every fetch has
    /// resolved, by this single task.
    pub async fn run_tick(&mut self) -> TickReport {
        let started = Instant::now();
        let now = self.clock.now();
        let per_fetch = self.fetch_timeout;
        let timeout_ms = per_fetch.as_millis() as u64;

        let alert_future = async {
            match timeout(per_fetch, self.alert_feed.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout { timeout_ms }),
            }
        };

        let sample_futures = self.elements.iter().map(|element| async move {
            match timeout(per_fetch, element.feed.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout { timeout_ms }),
            }
        });

        let (alert_result, sample_results) = tokio::join!(alert_future, join_all(sample_futures));

        let mut verdicts = BTreeMap::new();
        for (element, result) in self.elements.iter_mut().zip(sample_results) {
            let verdict = match result {
                Ok(samples) => {
                    element.apply(samples);
                    element.evaluate(now)
                }
                Err(err) => {
                    tracing::warn!(
                        element = element.id.as_str(),
                        error = %err,
                        "metrics fetch failed; verdict unknown this tick"
                    );
                    element.unavailable(err.to_string())
                }
            };
            verdicts.insert(element.id.clone(), verdict);
        }

        let alerts = match alert_result {
            Ok(active) => AlertsOutcome::Checked {
                triggered: alert::evaluate_alerts(&self.alert_rules, &active),
            },
            Err(err) => {
                tracing::warn!(error = %err, "alert fetch failed; alerts unavailable this tick");
                AlertsOutcome::Unavailable {
                    cause: err.to_string(),
                }
            }
        };

        TickReport::new(now, verdicts, alerts)
            .with_duration(started.elapsed().as_millis() as u64)
    }

    /// Drive ticks on the configured interval, publishing each report.
    ///
    /// A tick that has not finished when the next one is due is abandoned:
    /// its outstanding fetches are dropped and a fresh tick starts, so two
    /// ticks never touch the same store concurrently.
    pub async fn run(mut self, updates: watch::Sender<Option<TickReport>>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match timeout(self.tick_interval, self.run_tick()).await {
                Ok(report) => {
                    tracing::info!(
                        tick_id = %report.tick_id,
                        global = ?report.global,
                        degraded = report.elements_degraded,
                        unknown = report.elements_unknown,
                        duration_ms = report.duration_ms,
                        "tick complete"
                    );
                    let _ = updates.send(Some(report));
                }
                Err(_) => {
                    tracing::warn!("tick overran the interval; stale fetches abandoned");
                }
            }
        }
    }
}

fn to_std(duration: Duration, what: &str) -> Result<std::time::Duration, ConfigError> {
    duration
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| ConfigError::InvalidInterval {
            what: what.to_string(),
        })
}
