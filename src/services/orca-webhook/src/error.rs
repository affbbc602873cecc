//! Error handling for the Orca webhook relay
//!
//! Every failure the relay can report is an [`OrcaError`]. Decode errors are the
//! only ones that reach a webhook caller; their body is the raw decoder message
//! in plain text, which is what Orca shows in its delivery log.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Result type alias for relay operations
pub type OrcaResult<T> = Result<T, OrcaError>;

/// Error types for the webhook relay
#[derive(Error, Debug)]
pub enum OrcaError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The inbound body could not be decoded into a webhook record
    #[error("{message}")]
    Decode { message: String },

    /// The inbound body could not be read
    #[error("Failed to read request body: {message}")]
    BodyRead { message: String },

    /// An action handler reported a failure
    #[error("Handler for '{action}' failed: {message}")]
    Handler { action: String, message: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl OrcaError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a new body read error
    pub fn body_read<S: Into<String>>(message: S) -> Self {
        Self::BodyRead {
            message: message.into(),
        }
    }

    /// Create a new handler error
    pub fn handler<S1: Into<String>, S2: Into<String>>(action: S1, message: S2) -> Self {
        Self::Handler {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// Decode errors answer 500 here; the receiver overrides this with the
    /// configured `receiver.decode_error_status`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OrcaError::Configuration { .. } => StatusCode::BAD_REQUEST,
            OrcaError::Decode { .. }
            | OrcaError::BodyRead { .. }
            | OrcaError::Handler { .. }
            | OrcaError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error (for logs and metrics labels)
    pub fn error_code(&self) -> &'static str {
        match self {
            OrcaError::Configuration { .. } => "CONFIGURATION_ERROR",
            OrcaError::Decode { .. } => "DECODE_ERROR",
            OrcaError::BodyRead { .. } => "BODY_READ_ERROR",
            OrcaError::Handler { .. } => "HANDLER_ERROR",
            OrcaError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for OrcaError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        tracing::error!(
            error_code = self.error_code(),
            error_message = %self,
            "Webhook relay error"
        );

        (status_code, self.to_string()).into_response()
    }
}
