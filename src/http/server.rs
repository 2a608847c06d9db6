//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the subscription endpoint
//! - Wire up middleware (token check, tracing, timeout, request ID)
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::SubscriptionConfig;
use crate::http::auth::token_auth;
use crate::http::subscription::subscription_handler;
use crate::lifecycle::Shutdown;
use crate::subscription::SubscriptionService;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubscriptionService>,
    pub subscription: Arc<SubscriptionConfig>,
}

/// HTTP server for subscribers.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/sub", get(subscription_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), token_auth))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server on `listener` until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let shutdown = shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
