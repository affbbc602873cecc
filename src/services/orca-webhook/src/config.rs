//! Configuration for the Orca webhook relay
//!
//! Settings are layered: built-in defaults, then an optional config file, then
//! `ORCA_`-prefixed environment variables using `__` between sections
//! (`ORCA_SERVER__PORT=8080`, `ORCA_SENDER__TARGET_URL=...`).

use crate::record::{DecodeMode, FieldKind};
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "ORCA_CONFIG_FILE";

/// Main configuration structure for the relay
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrcaConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Inbound webhook ("webhook out") configuration
    pub receiver: ReceiverConfig,
    /// Outbound webhook ("webhook in") configuration
    pub sender: SenderConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Request timeout in seconds, covers body read and handling (default: 30)
    pub request_timeout: u64,
}

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Route Orca posts row events to
    pub path: String,
    /// Maximum request body size in bytes (default: 1MB)
    pub max_body_size: usize,
    /// Status returned when a body does not decode (default: 500)
    pub decode_error_status: u16,
    /// How bodies are decoded into records
    pub decode_mode: DecodeMode,
    /// Domain field types, used by `DecodeMode::Schema`
    pub schema: Vec<SchemaField>,
    /// Reject fields outside the schema instead of dropping them
    pub reject_unknown_fields: bool,
}

/// One declared domain field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
}

/// Sender configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Orca row endpoint, e.g. https://api.orcascan.com/sheets/{id}
    pub target_url: String,
    /// Outbound request timeout in seconds (default: 10)
    pub timeout: u64,
    /// User agent sent with outbound requests
    pub user_agent: String,
    /// Expose the trigger route
    pub trigger_enabled: bool,
    /// Trigger route path
    pub trigger_path: String,
    /// Send the example row once at startup
    pub fire_on_startup: bool,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub metrics_enabled: bool,
    /// Metrics endpoint path (default: /metrics)
    pub metrics_path: String,
    /// Health check endpoint path (default: /health)
    pub health_path: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty, compact)
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout: 30,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            path: "/orca-webhook-out".to_string(),
            max_body_size: 1024 * 1024, // 1MB
            decode_error_status: 500,
            decode_mode: DecodeMode::Open,
            schema: Vec::new(),
            reject_unknown_fields: false,
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            target_url: "https://httpbin.org/post".to_string(),
            timeout: 10,
            user_agent: format!("orca-webhook-relay/{}", env!("CARGO_PKG_VERSION")),
            trigger_enabled: true,
            trigger_path: "/trigger-webhook-in".to_string(),
            fire_on_startup: false,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
            health_path: "/health".to_string(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl OrcaConfig {
    /// Load configuration from environment variables, honouring `ORCA_CONFIG_FILE`
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config_file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::load(config_file.as_deref())
    }

    /// Load configuration from an optional file plus environment overrides
    pub fn load(config_file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder();

        if let Some(path) = config_file {
            cfg = cfg.add_source(config::File::with_name(path).required(false));
        }

        cfg = cfg.add_source(
            config::Environment::with_prefix("ORCA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        cfg.build()?.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.receiver.max_body_size == 0 {
            return Err("Receiver body limit cannot be 0".to_string());
        }

        if !self.receiver.path.starts_with('/') {
            return Err(format!(
                "Receiver path must start with '/': {}",
                self.receiver.path
            ));
        }

        if !(400..=599).contains(&self.receiver.decode_error_status) {
            return Err(format!(
                "Decode error status must be a 4xx or 5xx code, got {}",
                self.receiver.decode_error_status
            ));
        }

        if self.receiver.decode_mode == DecodeMode::Schema && self.receiver.schema.is_empty() {
            return Err("Schema decoding requires at least one schema field".to_string());
        }

        if self.sender.trigger_enabled && !self.sender.trigger_path.starts_with('/') {
            return Err(format!(
                "Trigger path must start with '/': {}",
                self.sender.trigger_path
            ));
        }

        if self.sender.trigger_enabled && self.sender.trigger_path == self.receiver.path {
            return Err("Trigger path and receiver path must differ".to_string());
        }

        Url::parse(&self.sender.target_url)
            .map_err(|e| format!("Invalid sender target URL: {}", e))?;

        Ok(())
    }
}
