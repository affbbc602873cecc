//! Outbound row events ("webhook in")
//!
//! Orca accepts rows posted to a sheet's webhook-in URL as a flat JSON object:
//! the `___orca_action` system field says what to do, every other key is a
//! column value.
//!
//! Sending never fails from the caller's point of view. Each call returns a
//! [`SendOutcome`] that the caller may inspect or ignore; transport problems
//! are logged and reported there instead of being raised.

use crate::config::SenderConfig;
use crate::error::{OrcaError, OrcaResult};
use crate::metrics::RelayMetrics;
use crate::record::{OrcaAction, ACTION_FIELD};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Result of one outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 2xx from Orca; `response` is the body when it decodes as a string map
    Delivered {
        status: u16,
        response: Option<BTreeMap<String, String>>,
    },
    /// Orca answered with a non-success status
    Rejected { status: u16, body: String },
    /// The request never got a response
    TransportFailed { message: String },
}

impl SendOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Delivered { .. } => "delivered",
            SendOutcome::Rejected { .. } => "rejected",
            SendOutcome::TransportFailed { .. } => "transport_failed",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

/// Sample row posted by the startup and HTTP triggers
pub fn example_row() -> BTreeMap<String, String> {
    [
        ("Barcode", "0123456789"),
        ("Name", "New 1"),
        ("Quantity", "12"),
        ("Description", "Add new row example"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Client for Orca's row endpoint
#[derive(Clone)]
pub struct OrcaSender {
    client: Client,
    target_url: Url,
    metrics: Option<RelayMetrics>,
}

impl OrcaSender {
    /// Create a sender for the configured target URL
    pub fn new(config: &SenderConfig) -> OrcaResult<Self> {
        let target_url = Url::parse(&config.target_url).map_err(|e| {
            OrcaError::configuration(format!("Invalid sender target URL: {}", e))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| OrcaError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            target_url,
            metrics: None,
        })
    }

    /// Record send counts and durations in `metrics`
    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    /// Ask Orca to add a row with the given column values
    pub async fn send_add_row_event(&self, fields: BTreeMap<String, String>) -> SendOutcome {
        self.send_row_event(OrcaAction::Add, fields).await
    }

    /// Post a row event; `action` always overrides any `___orca_action` in `fields`
    pub async fn send_row_event(
        &self,
        action: OrcaAction,
        fields: BTreeMap<String, String>,
    ) -> SendOutcome {
        let payload = build_payload(action, fields);
        let start = Instant::now();

        let outcome = self.post(&payload).await;

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_send(action.as_str(), outcome.label(), elapsed);
        }

        match &outcome {
            SendOutcome::Delivered { status, response } => {
                info!(
                    action = action.as_str(),
                    status = *status,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    response = ?response,
                    "Row event delivered"
                );
            }
            SendOutcome::Rejected { status, body } => {
                warn!(
                    action = action.as_str(),
                    status = *status,
                    body = %body,
                    "Row event rejected by Orca"
                );
            }
            SendOutcome::TransportFailed { message } => {
                warn!(
                    action = action.as_str(),
                    target = %self.target_url,
                    error = %message,
                    "Row event could not be sent"
                );
            }
        }

        outcome
    }

    async fn post(&self, payload: &BTreeMap<String, String>) -> SendOutcome {
        let response = match self
            .client
            .post(self.target_url.clone())
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return SendOutcome::TransportFailed {
                    message: e.to_string(),
                }
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "Failed to read response body");
                Default::default()
            }
        };

        if !status.is_success() {
            return SendOutcome::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            };
        }

        let decoded = match serde_json::from_slice::<BTreeMap<String, String>>(&body) {
            Ok(map) => Some(map),
            Err(e) => {
                debug!(error = %e, "Response body is not a string map, discarding");
                None
            }
        };

        SendOutcome::Delivered {
            status: status.as_u16(),
            response: decoded,
        }
    }
}

/// Merge the action into the caller's columns
pub fn build_payload(
    action: OrcaAction,
    mut fields: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    fields.insert(ACTION_FIELD.to_string(), action.as_str().to_string());
    fields
}
