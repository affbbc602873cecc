//! Action dispatch
//!
//! The relay does not react to row events itself. Reactions are supplied by an
//! [`ActionHandler`] injected when the service is built; [`dispatch`] routes a
//! record to exactly one of its methods, or to none when the action is not one
//! Orca defines.

use crate::error::OrcaResult;
use crate::record::{OrcaAction, WebhookRecord};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Reaction to each kind of row event. All methods default to no-ops.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// A row was added
    async fn on_add(&self, _record: &WebhookRecord) -> OrcaResult<()> {
        Ok(())
    }

    /// A row was updated
    async fn on_update(&self, _record: &WebhookRecord) -> OrcaResult<()> {
        Ok(())
    }

    /// A row was deleted
    async fn on_delete(&self, _record: &WebhookRecord) -> OrcaResult<()> {
        Ok(())
    }

    /// The user pressed the test button in the Orca web app
    async fn on_test(&self, _record: &WebhookRecord) -> OrcaResult<()> {
        Ok(())
    }
}

/// Handler that accepts every event and does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ActionHandler for NoopHandler {}

/// What happened to a record after decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The matching handler method ran and succeeded
    Dispatched(OrcaAction),
    /// The matching handler method ran and returned an error
    HandlerFailed { action: OrcaAction, message: String },
    /// Absent or unrecognised action, nothing ran
    Ignored(Option<String>),
}

impl DispatchOutcome {
    /// Label used in logs and metrics
    pub fn label(&self) -> &str {
        match self {
            DispatchOutcome::Dispatched(action) | DispatchOutcome::HandlerFailed { action, .. } => {
                action.as_str()
            }
            DispatchOutcome::Ignored(_) => "ignored",
        }
    }
}

/// Invoke the handler method matching the record's action
pub async fn dispatch(handler: &dyn ActionHandler, record: &WebhookRecord) -> DispatchOutcome {
    let Some(action) = record.orca_action() else {
        debug!(action = ?record.action, "No handler for action");
        return DispatchOutcome::Ignored(record.action.clone());
    };

    let result = match action {
        OrcaAction::Add => handler.on_add(record).await,
        OrcaAction::Update => handler.on_update(record).await,
        OrcaAction::Delete => handler.on_delete(record).await,
        OrcaAction::Test => handler.on_test(record).await,
    };

    match result {
        Ok(()) => DispatchOutcome::Dispatched(action),
        Err(e) => {
            warn!(
                action = action.as_str(),
                sheet_name = record.sheet_name(),
                error = %e,
                "Action handler failed"
            );
            DispatchOutcome::HandlerFailed {
                action,
                message: e.to_string(),
            }
        }
    }
}
