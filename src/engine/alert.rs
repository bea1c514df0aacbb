//! Alert matching
//!
//! Decides triggered/not-triggered for each configured alert rule against
//! the tick's set of firing alerts. There is no unknown state per rule: an
//! unreachable alert backend degrades the whole tick's alerts outcome
//! instead (see the engine).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::contracts::ActiveAlert;

/// A configured alert to watch for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Alert name to match exactly
    pub name: String,

    /// Label selector; every pair must be present and equal on the firing
    /// alert. Empty selector matches on name alone.
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

impl AlertRule {
    pub fn new(name: impl Into<String>, selector: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            selector,
        }
    }

    /// Subset match: the firing alert may carry extra labels beyond the
    /// selector.
    pub fn matches(&self, alert: &ActiveAlert) -> bool {
        if alert.name != self.name {
            return false;
        }
        self.selector
            .iter()
            .all(|(key, value)| alert.labels.get(key).is_some_and(|v| v == value))
    }
}

/// Match every configured rule against the tick's firing alerts.
///
/// Rules sharing a name fold with OR into one entry.
pub fn evaluate_alerts(
    rules: &[AlertRule],
    active: &[ActiveAlert],
) -> BTreeMap<String, bool> {
    let mut triggered = BTreeMap::new();
    for rule in rules {
        let hit = active.iter().any(|alert| rule.matches(alert));
        let entry = triggered.entry(rule.name.clone()).or_insert(false);
        *entry = *entry || hit;
    }
    triggered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn firing(name: &str, labels: &[(&str, &str)]) -> ActiveAlert {
        let mut map = BTreeMap::new();
        map.insert("alertname".to_string(), name.to_string());
        for (k, v) in labels {
            map.insert(k.to_string(), v.to_string());
        }
        ActiveAlert {
            name: name.to_string(),
            labels: map,
            since: Utc::now(),
        }
    }

    fn selector(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_on_name_alone() {
        let rule = AlertRule::new("RabbitmqTooManyUnackMessages", BTreeMap::new());
        assert!(rule.matches(&firing("RabbitmqTooManyUnackMessages", &[("severity", "warning")])));
        assert!(!rule.matches(&firing("SomeOtherAlert", &[])));
    }

    #[test]
    fn extra_labels_on_the_firing_alert_still_match() {
        let rule = AlertRule::new(
            "KubeStatefulSetReplicasMismatch",
            selector(&[("statefulset", "rabbitmq")]),
        );
        let alert = firing(
            "KubeStatefulSetReplicasMismatch",
            &[
                ("statefulset", "rabbitmq"),
                ("namespace", "messaging"),
                ("severity", "critical"),
            ],
        );
        assert!(rule.matches(&alert));
    }

    #[test]
    fn statefulset_mismatch_scenario() {
        let rule = AlertRule::new(
            "KubeStatefulSetReplicasMismatch",
            selector(&[("statefulset", "rabbitmq")]),
        );

        let other_set = firing(
            "KubeStatefulSetReplicasMismatch",
            &[("statefulset", "postgres")],
        );
        assert!(!rule.matches(&other_set));

        let ours = firing(
            "KubeStatefulSetReplicasMismatch",
            &[("statefulset", "rabbitmq")],
        );
        assert!(rule.matches(&ours));
    }

    #[test]
    fn selector_key_missing_on_alert_does_not_match() {
        let rule = AlertRule::new("A", selector(&[("statefulset", "rabbitmq")]));
        assert!(!rule.matches(&firing("A", &[("namespace", "messaging")])));
    }

    #[test]
    fn evaluate_alerts_reports_every_configured_rule() {
        let rules = vec![
            AlertRule::new("A", BTreeMap::new()),
            AlertRule::new("B", BTreeMap::new()),
        ];
        let active = vec![firing("A", &[])];

        let triggered = evaluate_alerts(&rules, &active);
        assert_eq!(triggered.get("A"), Some(&true));
        assert_eq!(triggered.get("B"), Some(&false));
    }

    #[test]
    fn same_named_rules_fold_with_or() {
        let rules = vec![
            AlertRule::new("A", selector(&[("statefulset", "rabbitmq")])),
            AlertRule::new("A", selector(&[("statefulset", "postgres")])),
        ];
        let active = vec![firing("A", &[("statefulset", "postgres")])];

        let triggered = evaluate_alerts(&rules, &active);
        assert_eq!(triggered.get("A"), Some(&true));
    }
}
