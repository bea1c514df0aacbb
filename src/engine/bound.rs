//! Bound evaluation
//!
//! Threshold checks against a metric's absolute value or its rate of change
//! over a window. Pure functions over a sample-store snapshot: evaluating
//! the same snapshot twice with the same rule yields the same bit.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::contracts::{BitOutcome, HealthBit, SampleKind};
use crate::store::{SampleStore, Series};

/// A threshold on a metric's value or on its change over a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Violated when the latest value drops below the limit
    AbsLower(f64),
    /// Violated when the latest value exceeds the limit
    AbsUpper(f64),
    /// Violated when the increase over `period` falls below `limit`
    RateLower { limit: f64, period: Duration },
    /// Violated when the increase over `period` exceeds `limit`
    RateUpper { limit: f64, period: Duration },
}

impl Bound {
    /// Window length for rate bounds
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::AbsLower(_) | Self::AbsUpper(_) => None,
            Self::RateLower { period, .. } | Self::RateUpper { period, .. } => Some(*period),
        }
    }

    /// Whether this bound needs windowed history
    pub fn is_rate(&self) -> bool {
        self.period().is_some()
    }

    /// Short human-readable form used in verdict bits
    pub fn describe(&self) -> String {
        match self {
            Self::AbsLower(limit) => format!("abs_lower({})", limit),
            Self::AbsUpper(limit) => format!("abs_upper({})", limit),
            Self::RateLower { limit, period } => {
                format!("rate_lower({} per {}s)", limit, period.num_seconds())
            }
            Self::RateUpper { limit, period } => {
                format!("rate_upper({} per {}s)", limit, period.num_seconds())
            }
        }
    }

    /// Evaluate against a single series at time `now`
    fn check_series(&self, series: &Series, now: DateTime<Utc>) -> (HealthBit, Option<String>) {
        match self {
            Self::AbsUpper(limit) => match series.latest() {
                Some((_, value)) if value > *limit => (
                    HealthBit::Violated,
                    Some(format!("value {} > limit {}", value, limit)),
                ),
                Some(_) => (HealthBit::Ok, None),
                None => (HealthBit::Unknown, Some("no samples retained".to_string())),
            },
            Self::AbsLower(limit) => match series.latest() {
                Some((_, value)) if value < *limit => (
                    HealthBit::Violated,
                    Some(format!("value {} < limit {}", value, limit)),
                ),
                Some(_) => (HealthBit::Ok, None),
                None => (HealthBit::Unknown, Some("no samples retained".to_string())),
            },
            Self::RateUpper { limit, period } => {
                match window_delta(series, now, *period) {
                    WindowDelta::Delta(delta) if delta > *limit => (
                        HealthBit::Violated,
                        Some(format!(
                            "increase {} over {}s > limit {}",
                            delta,
                            period.num_seconds(),
                            limit
                        )),
                    ),
                    WindowDelta::Delta(_) => (HealthBit::Ok, None),
                    WindowDelta::Insufficient(cause) => (HealthBit::Unknown, Some(cause)),
                }
            }
            Self::RateLower { limit, period } => {
                match window_delta(series, now, *period) {
                    WindowDelta::Delta(delta) if delta < *limit => (
                        HealthBit::Violated,
                        Some(format!(
                            "increase {} over {}s < limit {}",
                            delta,
                            period.num_seconds(),
                            limit
                        )),
                    ),
                    WindowDelta::Delta(_) => (HealthBit::Ok, None),
                    WindowDelta::Insufficient(cause) => (HealthBit::Unknown, Some(cause)),
                }
            }
        }
    }
}

enum WindowDelta {
    Delta(f64),
    Insufficient(String),
}

/// Change in value over the window ending at `now`.
///
/// A counter series whose value decreased within the window has reset
/// (process restart); the delta is undecidable rather than a rate decrease.
fn window_delta(series: &Series, now: DateTime<Utc>, period: Duration) -> WindowDelta {
    let Some(newer) = series.value_at(now) else {
        return WindowDelta::Insufficient("no sample at or before evaluation time".to_string());
    };
    let Some(older) = series.value_at(now - period) else {
        return WindowDelta::Insufficient(format!(
            "insufficient history for {}s window",
            period.num_seconds()
        ));
    };

    if series.kind() == SampleKind::Counter && newer < older {
        return WindowDelta::Insufficient("counter reset within window".to_string());
    }

    WindowDelta::Delta(newer - older)
}

/// One configured bound on one metric. Produces one health bit per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundRule {
    /// Metric name the bound applies to
    pub metric: String,
    /// The threshold
    pub bound: Bound,
}

impl BoundRule {
    pub fn new(metric: impl Into<String>, bound: Bound) -> Self {
        Self {
            metric: metric.into(),
            bound,
        }
    }

    /// Evaluate this rule against the store at time `now`.
    ///
    /// When the metric name carries several label sets, every series is
    /// checked and the outcomes fold with violated > unknown > ok dominance;
    /// the detail names the deciding series.
    pub fn evaluate(&self, store: &SampleStore, now: DateTime<Utc>) -> BitOutcome {
        let check = self.bound.describe();
        let series = store.series(&self.metric);

        if series.is_empty() {
            return BitOutcome::unknown(&self.metric, check, "no samples recorded for metric");
        }

        let mut unknown: Option<String> = None;
        for s in series {
            let (bit, detail) = self.bound.check_series(s, now);
            match bit {
                HealthBit::Violated => {
                    return BitOutcome::violated(
                        &self.metric,
                        check,
                        annotate(detail.unwrap_or_default(), s.labels()),
                    );
                }
                HealthBit::Unknown => {
                    if unknown.is_none() {
                        unknown = Some(annotate(detail.unwrap_or_default(), s.labels()));
                    }
                }
                HealthBit::Ok => {}
            }
        }

        match unknown {
            Some(detail) => BitOutcome::unknown(&self.metric, check, detail),
            None => BitOutcome::ok(&self.metric, check),
        }
    }
}

fn annotate(detail: String, labels: &BTreeMap<String, String>) -> String {
    if labels.is_empty() {
        return detail;
    }
    let rendered = labels
        .iter()
        .map(|(k, v)| format!("{}={:?}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    format!("{} [{}]", detail, rendered)
}
