//! # Orca Webhook Relay
//!
//! A small service sitting between an Orca sheet and your own code.
//!
//! - **Receiver** ("webhook out"): Orca posts a JSON object for every row that
//!   is added, updated or deleted, and when the user presses *test*. The body
//!   is decoded into a [`WebhookRecord`], logged, and dispatched to an
//!   [`ActionHandler`]. The caller always gets `200 OK` once the body decodes.
//! - **Sender** ("webhook in"): [`OrcaSender`] posts a row back to Orca with
//!   `___orca_action` merged into the column values and reports a
//!   [`SendOutcome`] instead of failing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orca_webhook::{NoopHandler, OrcaConfig, OrcaWebhookService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OrcaConfig::from_env()?;
//!     let service = OrcaWebhookService::new(config, Arc::new(NoopHandler))?;
//!     service.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod receiver;
pub mod record;
pub mod sender;
pub mod service;

pub use config::{ObservabilityConfig, OrcaConfig, ReceiverConfig, SenderConfig, ServerConfig};
pub use dispatch::{dispatch, ActionHandler, DispatchOutcome, NoopHandler};
pub use error::{OrcaError, OrcaResult};
pub use metrics::RelayMetrics;
pub use receiver::{Receipt, WebhookReceiver};
pub use record::{DecodeMode, FieldKind, FieldValue, OrcaAction, RecordDecoder, WebhookRecord};
pub use sender::{example_row, OrcaSender, SendOutcome};
pub use service::{AppState, OrcaWebhookService};

/// Version information for the relay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "orca-webhook-relay";

/// Health check information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthStatus {
    pub service: String,
    pub version: String,
    pub status: String,
    pub uptime_seconds: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthStatus {
    pub fn healthy(started_at: chrono::DateTime<chrono::Utc>) -> Self {
        let now = chrono::Utc::now();
        Self {
            service: SERVICE_NAME.to_string(),
            version: VERSION.to_string(),
            status: "healthy".to_string(),
            uptime_seconds: (now - started_at).num_seconds().max(0),
            timestamp: now,
        }
    }
}
