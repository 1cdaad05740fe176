//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve on a listener until the shutdown future resolves

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::broadcast::BroadcastManager;
use crate::config::{ApiConfig, NodeConfig};
use crate::http::handlers;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BroadcastManager>,
    pub node: NodeConfig,
}

/// HTTP API server for the broadcast node.
pub struct ApiServer {
    router: Router,
    config: ApiConfig,
}

impl ApiServer {
    pub fn new(manager: Arc<BroadcastManager>, node: NodeConfig, config: ApiConfig) -> Self {
        let state = AppState { manager, node };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &ApiConfig, state: AppState) -> Router {
        Router::new()
            .route(
                "/api/v1/namespaces/{ns}/messages/broadcast",
                post(handlers::broadcast_message),
            )
            .route(
                "/api/v1/namespaces/{ns}/datatypes",
                post(handlers::broadcast_datatype),
            )
            .route("/api/v1/namespaces/{ns}/data/blob", post(handlers::upload_blob))
            .route("/api/v1/operations/{id}", get(handlers::get_operation))
            .route("/api/v1/operations/{id}/retry", post(handlers::retry_operation))
            .route("/api/v1/status", get(handlers::status))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            request_timeout_secs = self.config.request_timeout_secs,
            "HTTP API starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP API stopped");
        Ok(())
    }
}
