//! Prometheus alerts API client
//!
//! Fetches `GET {base}/api/v1/alerts` and reduces the response to the
//! currently firing alerts. The engine's matcher consumes the parsed list,
//! never the wire format.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::FetchError;
use crate::contracts::ActiveAlert;
use crate::engine::{AlertFeed, FeedFuture};

/// Client for one alerting backend
pub struct AlertsClient {
    base_url: String,
    client: reqwest::Client,
    timeout_ms: u64,
}

impl AlertsClient {
    /// Build a client for the backend at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = base_url.into();
        reqwest::Url::parse(&base_url).map_err(|e| FetchError::Endpoint {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Endpoint {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Fetch the currently firing alerts
    pub async fn active_alerts(&self) -> Result<Vec<ActiveAlert>, FetchError> {
        let url = format!("{}/api/v1/alerts", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body: AlertsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        if body.status != "success" {
            return Err(FetchError::Backend {
                status: body.status,
            });
        }

        Ok(body
            .data
            .alerts
            .into_iter()
            .filter(|a| a.state == "firing")
            .filter_map(ApiAlert::into_active)
            .collect())
    }
}

impl AlertFeed for AlertsClient {
    fn fetch(&self) -> FeedFuture<'_, Vec<ActiveAlert>> {
        Box::pin(self.active_alerts())
    }
}

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    status: String,
    data: AlertsResponseBody,
}

#[derive(Debug, Deserialize)]
struct AlertsResponseBody {
    alerts: Vec<ApiAlert>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAlert {
    labels: BTreeMap<String, String>,
    #[serde(default)]
    #[allow(dead_code)]
    annotations: BTreeMap<String, String>,
    state: String,
    active_at: DateTime<Utc>,
}

impl ApiAlert {
    /// Alerts without an `alertname` label cannot be matched and are skipped
    fn into_active(self) -> Option<ActiveAlert> {
        let name = self.labels.get("alertname")?.clone();
        Some(ActiveAlert {
            name,
            labels: self.labels,
            since: self.active_at,
        })
    }
}
