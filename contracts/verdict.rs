//! Health verdict contract
//!
//! The per-tick output structure handed to downstream consumers. Bit order
//! within a verdict is part of the contract: bit `i` always corresponds to
//! the element's `i`-th configured bound rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Outcome of one rule at one evaluation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBit {
    /// Rule satisfied
    Ok,
    /// Rule violated
    Violated,
    /// Insufficient data to decide
    Unknown,
}

/// Aggregate health levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every rule satisfied
    Ok,
    /// At least one rule violated
    Degraded,
    /// No violation, but at least one rule could not be decided
    Unknown,
}

/// One rule's outcome within a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitOutcome {
    /// Metric the rule applies to
    pub metric: String,

    /// Human-readable rule description, e.g. `abs_upper(1)`
    pub check: String,

    /// The bit itself
    pub state: HealthBit,

    /// Explanation for violated/unknown bits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BitOutcome {
    /// Create a satisfied bit
    pub fn ok(metric: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            check: check.into(),
            state: HealthBit::Ok,
            detail: None,
        }
    }

    /// Create a violated bit with an explanation
    pub fn violated(
        metric: impl Into<String>,
        check: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            check: check.into(),
            state: HealthBit::Violated,
            detail: Some(detail.into()),
        }
    }

    /// Create an undecidable bit with the cause
    pub fn unknown(
        metric: impl Into<String>,
        check: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            check: check.into(),
            state: HealthBit::Unknown,
            detail: Some(detail.into()),
        }
    }
}

/// Per-element health verdict for one tick. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    /// Element identifier
    pub element_id: String,

    /// Bits aligned 1:1 with the element's configured bound rules
    pub bits: Vec<BitOutcome>,

    /// Folded element status
    pub overall: HealthStatus,

    /// Fetch-failure cause when the element could not be scraped this tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl HealthVerdict {
    /// Fold a list of evaluated bits into a verdict.
    ///
    /// Violated dominates unknown, unknown dominates ok.
    pub fn from_bits(element_id: impl Into<String>, bits: Vec<BitOutcome>) -> Self {
        let overall = if bits.iter().any(|b| b.state == HealthBit::Violated) {
            HealthStatus::Degraded
        } else if bits.iter().any(|b| b.state == HealthBit::Unknown) {
            HealthStatus::Unknown
        } else {
            HealthStatus::Ok
        };

        Self {
            element_id: element_id.into(),
            bits,
            overall,
            cause: None,
        }
    }

    /// Verdict for an element whose endpoint could not be fetched this tick.
    ///
    /// Emits one unknown bit per configured rule so bit positions stay
    /// aligned with the configuration.
    pub fn unavailable(
        element_id: impl Into<String>,
        checks: impl IntoIterator<Item = (String, String)>,
        cause: impl Into<String>,
    ) -> Self {
        let cause = cause.into();
        let bits = checks
            .into_iter()
            .map(|(metric, check)| BitOutcome::unknown(metric, check, cause.clone()))
            .collect();

        Self {
            element_id: element_id.into(),
            bits,
            overall: HealthStatus::Unknown,
            cause: Some(cause),
        }
    }
}

/// Result of matching configured alert rules for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlertsOutcome {
    /// The alert backend answered; per-rule trigger states
    Checked {
        /// Alert name to triggered flag
        triggered: BTreeMap<String, bool>,
    },
    /// The alert backend could not be consulted this tick
    Unavailable {
        /// Fetch-failure cause
        cause: String,
    },
}

impl AlertsOutcome {
    /// Whether any configured alert triggered
    pub fn any_triggered(&self) -> bool {
        match self {
            Self::Checked { triggered } => triggered.values().any(|t| *t),
            Self::Unavailable { .. } => false,
        }
    }

    /// Whether the backend answered this tick
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Checked { .. })
    }
}

/// Output of one evaluation tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    /// Correlation identifier for this tick
    pub tick_id: Uuid,

    /// Evaluation timestamp
    pub tick_at: DateTime<Utc>,

    /// Per-element verdicts
    pub elements: BTreeMap<String, HealthVerdict>,

    /// Alert matching outcome
    pub alerts: AlertsOutcome,

    /// Folded global status
    pub global: HealthStatus,

    /// Element count per status
    pub elements_ok: u32,
    pub elements_degraded: u32,
    pub elements_unknown: u32,

    /// Tick duration in milliseconds
    pub duration_ms: u64,
}

impl TickReport {
    /// Fold element verdicts and the alerts outcome into a report.
    ///
    /// Global status: degraded if any element is degraded or any alert
    /// triggered; unknown if any element is unknown or the alert backend
    /// was unavailable; ok otherwise.
    pub fn new(
        tick_at: DateTime<Utc>,
        elements: BTreeMap<String, HealthVerdict>,
        alerts: AlertsOutcome,
    ) -> Self {
        let count = |status: HealthStatus| {
            elements.values().filter(|v| v.overall == status).count() as u32
        };
        let ok = count(HealthStatus::Ok);
        let degraded = count(HealthStatus::Degraded);
        let unknown = count(HealthStatus::Unknown);

        let global = if degraded > 0 || alerts.any_triggered() {
            HealthStatus::Degraded
        } else if unknown > 0 || !alerts.is_available() {
            HealthStatus::Unknown
        } else {
            HealthStatus::Ok
        };

        Self {
            tick_id: Uuid::new_v4(),
            tick_at,
            elements,
            alerts,
            global,
            elements_ok: ok,
            elements_degraded: degraded,
            elements_unknown: unknown,
            duration_ms: 0,
        }
    }

    /// Set duration
    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}
