//! Inbound webhook receiver ("webhook out")
//!
//! Orca posts one JSON object per row event. The receiver decodes it, logs the
//! record, hands it to the configured [`ActionHandler`] and acknowledges with
//! `200 OK`. Once a body decodes the answer is always `OK`, whatever the
//! handler does; only decode failures reach the caller.

use crate::config::ReceiverConfig;
use crate::dispatch::{dispatch, ActionHandler, DispatchOutcome};
use crate::error::{OrcaError, OrcaResult};
use crate::metrics::RelayMetrics;
use crate::record::{RecordDecoder, WebhookRecord};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Body returned for every accepted webhook
pub const ACK_BODY: &str = "OK";

/// A decoded and dispatched webhook
#[derive(Debug, Clone)]
pub struct Receipt {
    pub record: WebhookRecord,
    pub outcome: DispatchOutcome,
}

/// Decodes inbound webhooks and dispatches them to an [`ActionHandler`]
#[derive(Clone)]
pub struct WebhookReceiver {
    handler: Arc<dyn ActionHandler>,
    decoder: RecordDecoder,
    decode_error_status: StatusCode,
    metrics: Option<RelayMetrics>,
}

impl WebhookReceiver {
    pub fn new(handler: Arc<dyn ActionHandler>, decoder: RecordDecoder) -> Self {
        Self {
            handler,
            decoder,
            decode_error_status: StatusCode::INTERNAL_SERVER_ERROR,
            metrics: None,
        }
    }

    /// Build a receiver from the `receiver` config section
    pub fn from_config(
        config: &ReceiverConfig,
        handler: Arc<dyn ActionHandler>,
    ) -> OrcaResult<Self> {
        let status = StatusCode::from_u16(config.decode_error_status).map_err(|e| {
            OrcaError::configuration(format!(
                "Invalid decode error status {}: {}",
                config.decode_error_status, e
            ))
        })?;

        Ok(Self::new(handler, RecordDecoder::from_config(config)).with_decode_error_status(status))
    }

    /// Status used when a body fails to decode (500 unless configured)
    pub fn with_decode_error_status(mut self, status: StatusCode) -> Self {
        self.decode_error_status = status;
        self
    }

    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn decode_error_status(&self) -> StatusCode {
        self.decode_error_status
    }

    /// Decode `body` and dispatch it.
    ///
    /// Only decode failures are returned as errors; handler failures are part
    /// of the [`Receipt`].
    pub async fn handle(&self, body: &[u8]) -> OrcaResult<Receipt> {
        let record = match self.decoder.decode(body) {
            Ok(record) => record,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_decode_failure();
                }
                warn!(error = %e, body_len = body.len(), "Failed to decode webhook body");
                return Err(e);
            }
        };

        info!(
            action = record.action.as_deref().unwrap_or(""),
            sheet_name = record.sheet_name(),
            user_email = record.user_email(),
            record = ?record.to_json_map(),
            "Webhook received"
        );

        let outcome = dispatch(self.handler.as_ref(), &record).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_received(outcome.label());
            if let DispatchOutcome::HandlerFailed { action, .. } = &outcome {
                metrics.record_handler_failure(action.as_str());
            }
        }

        Ok(Receipt { record, outcome })
    }

    /// HTTP answer for `body`: `200 OK`, or the decode error status with the
    /// raw decoder message
    pub async fn respond(&self, body: &[u8]) -> Response {
        match self.handle(body).await {
            Ok(_) => (StatusCode::OK, ACK_BODY).into_response(),
            Err(OrcaError::Decode { message }) => {
                (self.decode_error_status, message).into_response()
            }
            Err(e) => e.into_response(),
        }
    }
}
