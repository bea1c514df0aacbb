//! Agent configuration
//!
//! TOML document describing the alert backend and its watched alerts, the
//! monitored elements and their bound rules, and scheduler settings. Invalid
//! bound/period combinations, unknown bound types and duplicate element ids
//! are rejected at load time; they never become runtime failures.
//!
//! ```toml
//! [agent]
//! tick_interval = "30s"
//!
//! [prometheus]
//! url = "http://localhost:9090"
//!
//! [[prometheus.alerts]]
//! name = "KubeStatefulSetReplicasMismatch"
//! labels = { statefulset = "rabbitmq" }
//!
//! [[elements]]
//! url = "http://localhost:9419/metrics"
//!
//! [[elements.bounds]]
//! metric_name = "rabbitmq_global_messages_unroutable_dropped_total"
//! bound_type = "abs_upper"
//! limit = 1
//! ```

use chrono::Duration;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::engine::{AlertRule, Bound, BoundRule};

/// Fatal configuration errors, surfaced at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not valid TOML or does not match the schema
    #[error("config file is malformed: {0}")]
    Parse(#[from] toml::de::Error),

    /// A rate bound is missing its window
    #[error("bound type {bound_type:?} on {metric:?} requires a period")]
    MissingPeriod { metric: String, bound_type: String },

    /// An absolute bound carries a window it cannot use
    #[error("bound type {bound_type:?} on {metric:?} does not take a period")]
    UnexpectedPeriod { metric: String, bound_type: String },

    /// Bound type not one of abs_lower, abs_upper, rate_lower, rate_upper
    #[error("unknown bound type {bound_type:?} on {metric:?}")]
    UnknownBoundType { metric: String, bound_type: String },

    /// Two elements resolve to the same id
    #[error("duplicate element {id:?}")]
    DuplicateElement { id: String },

    /// Endpoint URL cannot be used to build a client
    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// Scheduler durations must be positive
    #[error("{what} must be a positive duration")]
    InvalidInterval { what: String },
}

/// Top-level configuration document
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Scheduler settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Alert backend and watched alerts
    pub prometheus: PrometheusConfig,

    /// Monitored elements
    #[serde(default)]
    pub elements: Vec<ElementConfig>,
}

impl Config {
    /// Read and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse and validate a config document
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for element in &self.elements {
            let id = element.id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateElement { id });
            }
            for bound in &element.bounds {
                bound.to_rule()?;
            }
        }
        Ok(())
    }
}

/// Scheduler settings
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AgentSettings {
    /// Evaluation tick interval; default 30s
    #[serde(
        default,
        deserialize_with = "duration_str::deserialize_option_duration_chrono"
    )]
    pub tick_interval: Option<Duration>,

    /// Per-fetch timeout; defaults to the tick interval
    #[serde(
        default,
        deserialize_with = "duration_str::deserialize_option_duration_chrono"
    )]
    pub fetch_timeout: Option<Duration>,
}

impl AgentSettings {
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval.unwrap_or_else(|| Duration::seconds(30))
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout.unwrap_or_else(|| self.tick_interval())
    }
}

/// Alert backend configuration
#[derive(Clone, Debug, Deserialize)]
pub struct PrometheusConfig {
    /// Base URL of the alerting backend
    pub url: String,

    /// Alerts to watch for
    #[serde(default)]
    pub alerts: Vec<AlertSpec>,
}

/// One watched alert
#[derive(Clone, Debug, Deserialize)]
pub struct AlertSpec {
    /// Alert name
    pub name: String,

    /// Label selector; subset match against the firing alert
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl From<AlertSpec> for AlertRule {
    fn from(spec: AlertSpec) -> Self {
        AlertRule::new(spec.name, spec.labels)
    }
}

/// One monitored element
#[derive(Clone, Debug, Deserialize)]
pub struct ElementConfig {
    /// Metrics endpoint URL
    pub url: String,

    /// Optional element id; defaults to the endpoint URL
    #[serde(default)]
    pub name: Option<String>,

    /// Ordered bound rules; their order fixes verdict bit positions
    #[serde(default)]
    pub bounds: Vec<BoundSpec>,
}

impl ElementConfig {
    pub fn id(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.url.clone())
    }
}

/// One declarative bound rule
#[derive(Clone, Debug, Deserialize)]
pub struct BoundSpec {
    /// Metric the bound applies to
    pub metric_name: String,

    /// abs_lower, abs_upper, rate_lower or rate_upper
    pub bound_type: String,

    /// Threshold
    pub limit: f64,

    /// Window for rate bounds; forbidden for absolute bounds
    #[serde(
        default,
        deserialize_with = "duration_str::deserialize_option_duration_chrono"
    )]
    pub period: Option<Duration>,
}

impl BoundSpec {
    /// Convert to a runtime rule, rejecting invalid bound/period combinations
    pub fn to_rule(&self) -> Result<BoundRule, ConfigError> {
        let bound_type = self.bound_type.to_lowercase();

        let require_period = || {
            self.period.ok_or_else(|| ConfigError::MissingPeriod {
                metric: self.metric_name.clone(),
                bound_type: bound_type.clone(),
            })
        };
        let forbid_period = |bound: Bound| {
            if self.period.is_some() {
                Err(ConfigError::UnexpectedPeriod {
                    metric: self.metric_name.clone(),
                    bound_type: bound_type.clone(),
                })
            } else {
                Ok(bound)
            }
        };

        let bound = match bound_type.as_str() {
            "abs_lower" => forbid_period(Bound::AbsLower(self.limit))?,
            "abs_upper" => forbid_period(Bound::AbsUpper(self.limit))?,
            "rate_lower" => Bound::RateLower {
                limit: self.limit,
                period: require_period()?,
            },
            "rate_upper" => Bound::RateUpper {
                limit: self.limit,
                period: require_period()?,
            },
            _ => {
                return Err(ConfigError::UnknownBoundType {
                    metric: self.metric_name.clone(),
                    bound_type,
                })
            }
        };

        Ok(BoundRule::new(&self.metric_name, bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [agent]
        tick_interval = "15s"
        fetch_timeout = "5s"

        [prometheus]
        url = "http://localhost:9090"

        [[prometheus.alerts]]
        name = "RabbitmqTooManyUnackMessages"

        [[prometheus.alerts]]
        name = "KubeStatefulSetReplicasMismatch"
        labels = { statefulset = "rabbitmq" }

        [[elements]]
        url = "http://localhost:9419/metrics"
        name = "rabbit-0"

        [[elements.bounds]]
        metric_name = "rabbitmq_global_messages_unroutable_dropped_total"
        bound_type = "abs_upper"
        limit = 1

        [[elements.bounds]]
        metric_name = "rabbitmq_queues"
        bound_type = "abs_lower"
        limit = 1

        [[elements.bounds]]
        metric_name = "erlang_vm_memory_processes_bytes_total"
        bound_type = "rate_upper"
        limit = 1000000
        period = "1m"
    "#;

    #[test]
    fn example_config_parses() {
        let config = Config::parse(EXAMPLE).unwrap();
        assert_eq!(config.agent.tick_interval(), Duration::seconds(15));
        assert_eq!(config.agent.fetch_timeout(), Duration::seconds(5));
        assert_eq!(config.prometheus.alerts.len(), 2);

        let element = &config.elements[0];
        assert_eq!(element.id(), "rabbit-0");
        assert_eq!(element.bounds.len(), 3);

        let rules: Vec<_> = element
            .bounds
            .iter()
            .map(|b| b.to_rule().unwrap())
            .collect();
        assert_eq!(rules[0].bound, Bound::AbsUpper(1.0));
        assert_eq!(rules[1].bound, Bound::AbsLower(1.0));
        assert_eq!(
            rules[2].bound,
            Bound::RateUpper {
                limit: 1_000_000.0,
                period: Duration::seconds(60),
            }
        );
    }

    #[test]
    fn fetch_timeout_defaults_to_tick_interval() {
        let config = Config::parse(
            r#"
            [agent]
            tick_interval = "45s"
            [prometheus]
            url = "http://localhost:9090"
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.fetch_timeout(), Duration::seconds(45));
    }

    #[test]
    fn rate_bound_without_period_is_rejected() {
        let err = Config::parse(
            r#"
            [prometheus]
            url = "http://localhost:9090"
            [[elements]]
            url = "http://localhost:9419/metrics"
            [[elements.bounds]]
            metric_name = "tx_total"
            bound_type = "rate_upper"
            limit = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingPeriod { .. }));
    }

    #[test]
    fn abs_bound_with_period_is_rejected() {
        let err = Config::parse(
            r#"
            [prometheus]
            url = "http://localhost:9090"
            [[elements]]
            url = "http://localhost:9419/metrics"
            [[elements.bounds]]
            metric_name = "rabbitmq_queues"
            bound_type = "abs_lower"
            limit = 1
            period = "1m"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedPeriod { .. }));
    }

    #[test]
    fn unknown_bound_type_is_rejected() {
        let err = Config::parse(
            r#"
            [prometheus]
            url = "http://localhost:9090"
            [[elements]]
            url = "http://localhost:9419/metrics"
            [[elements.bounds]]
            metric_name = "rabbitmq_queues"
            bound_type = "median"
            limit = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBoundType { .. }));
    }

    #[test]
    fn duplicate_element_ids_are_rejected() {
        let err = Config::parse(
            r#"
            [prometheus]
            url = "http://localhost:9090"
            [[elements]]
            url = "http://localhost:9419/metrics"
            [[elements]]
            url = "http://localhost:9419/metrics"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateElement { .. }));
    }

    #[test]
    fn bound_type_is_case_insensitive() {
        let spec = BoundSpec {
            metric_name: "m".to_string(),
            bound_type: "ABS_UPPER".to_string(),
            limit: 1.0,
            period: None,
        };
        assert_eq!(spec.to_rule().unwrap().bound, Bound::AbsUpper(1.0));
    }
}
