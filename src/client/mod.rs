//! HTTP clients for the external collaborators
//!
//! The alert source (Prometheus alerts API) and the per-element metrics
//! endpoints (text exposition format). Fetch failures are recoverable per
//! tick: they degrade the affected verdict to unknown, never the process.

mod alerts;
mod metrics;

pub use alerts::AlertsClient;
pub use metrics::MetricsClient;

use thiserror::Error;

/// Per-collaborator fetch failures. Recoverable; recorded as the cause of an
/// unknown verdict for the tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Endpoint unreachable or connection dropped
    #[error("network error: {0}")]
    Network(String),

    /// Endpoint answered with an unexpected HTTP status
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Payload did not parse
    #[error("malformed payload: {0}")]
    Parse(String),

    /// The alert backend answered but reported an error status
    #[error("alert backend reported status {status:?}")]
    Backend { status: String },

    /// Fetch exceeded the per-fetch timeout
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Endpoint URL could not be used to build a client
    #[error("invalid endpoint {url:?}: {reason}")]
    Endpoint { url: String, reason: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_ms }
        } else {
            Self::Network(err.to_string())
        }
    }
}
