//! Service wiring and lifecycle for the Orca webhook relay
//!
//! Builds the shared state from configuration, layers the middleware stack
//! over the route table and serves it until Ctrl+C or SIGTERM.

use crate::config::OrcaConfig;
use crate::dispatch::ActionHandler;
use crate::error::{OrcaError, OrcaResult};
use crate::handlers::create_routes;
use crate::metrics::RelayMetrics;
use crate::receiver::WebhookReceiver;
use crate::sender::{example_row, OrcaSender, SendOutcome};
use axum::{
    body::Body,
    http::{HeaderName, Request},
    serve, Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// The relay service
pub struct OrcaWebhookService {
    /// Service configuration
    config: OrcaConfig,
    /// Application state
    app_state: Arc<AppState>,
    /// Server address
    addr: SocketAddr,
}

/// Application state shared across handlers
pub struct AppState {
    /// Service configuration
    pub config: OrcaConfig,
    /// Inbound webhook receiver
    pub receiver: WebhookReceiver,
    /// Outbound row sender
    pub sender: OrcaSender,
    /// Metrics collector
    pub metrics: RelayMetrics,
    /// When the service was built
    pub started_at: DateTime<Utc>,
}

/// Request ID generator
#[derive(Clone, Default)]
struct RelayMakeRequestId;

impl MakeRequestId for RelayMakeRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = format!("req-{}", Uuid::new_v4());
        axum::http::HeaderValue::from_str(&id)
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP span carrying the request id set by `SetRequestIdLayer`
fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

impl OrcaWebhookService {
    /// Create a new relay service dispatching to `handler`
    pub fn new(config: OrcaConfig, handler: Arc<dyn ActionHandler>) -> OrcaResult<Self> {
        info!("Initializing Orca webhook relay");

        config.validate().map_err(OrcaError::configuration)?;

        let metrics = RelayMetrics::new()?;

        let receiver =
            WebhookReceiver::from_config(&config.receiver, handler)?.with_metrics(metrics.clone());
        let sender = OrcaSender::new(&config.sender)?.with_metrics(metrics.clone());

        let app_state = Arc::new(AppState {
            config: config.clone(),
            receiver,
            sender,
            metrics,
            started_at: Utc::now(),
        });

        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| OrcaError::configuration(format!("Invalid server address: {}", e)))?;

        Ok(Self {
            config,
            app_state,
            addr,
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.app_state.clone()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Route table with the middleware stack applied
    pub fn router(&self) -> Router {
        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(
                request_id.clone(),
                RelayMakeRequestId,
            ))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(PropagateRequestIdLayer::new(request_id))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout,
            )));

        create_routes(self.app_state.clone()).layer(middleware)
    }

    /// Send the example row once, as the startup trigger does
    pub async fn fire_example_row(&self) -> SendOutcome {
        self.app_state
            .sender
            .send_add_row_event(example_row())
            .await
    }

    /// Start the relay; returns once the server has shut down
    pub async fn start(self) -> OrcaResult<()> {
        if self.config.sender.fire_on_startup {
            let outcome = self.fire_example_row().await;
            info!(outcome = outcome.label(), "Startup row event sent");
        }

        info!("Starting Orca webhook relay on {}", self.addr);

        let app = self.router();

        // A bind failure is fatal
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| OrcaError::internal(format!("Failed to bind to {}: {}", self.addr, e)))?;

        info!(
            receiver = %self.config.receiver.path,
            trigger = self.config.sender.trigger_enabled,
            target = %self.app_state.sender.target_url(),
            "Orca webhook relay listening on {}",
            self.addr
        );

        if let Err(e) = serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
        {
            error!("Server error: {}", e);
            return Err(OrcaError::internal(format!("Server error: {}", e)));
        }

        info!("Orca webhook relay stopped gracefully");
        Ok(())
    }

    /// Wait for shutdown signal
    async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = terminate => {
                info!("Received terminate signal, shutting down");
            }
        }
    }
}
