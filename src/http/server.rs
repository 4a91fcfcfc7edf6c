//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router holding the delegate handlers
//! - Wire up middleware (admission pipeline outermost, then timeout)
//! - Serve with connect info so the limiter can key by client address
//! - Run the limiter purge task alongside the server
//! - Graceful shutdown on the broadcast signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{StatusCode, Uri},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tower_http::timeout::TimeoutLayer;

use crate::config::GateConfig;
use crate::observability::access_log::AccessLogger;
use crate::pipeline::{admission_middleware, Admission};

/// HTTP server fronted by the admission pipeline.
pub struct HttpServer {
    router: Router,
    config: GateConfig,
    admission: Arc<Admission>,
}

impl HttpServer {
    /// Create a server exposing the built-in health and info routes.
    pub fn new(config: GateConfig, logger: AccessLogger) -> Self {
        Self::with_routes(config, logger, default_routes())
    }

    /// Create a server gating an application-supplied router.
    pub fn with_routes(config: GateConfig, logger: AccessLogger, routes: Router) -> Self {
        let admission = Admission::from_config(&config.rate_limit, logger);
        Self::with_admission(config, admission, routes)
    }

    /// Create a server from a pre-built admission state (custom clock,
    /// key extractor...).
    pub fn with_admission(config: GateConfig, admission: Admission, routes: Router) -> Self {
        let admission = Arc::new(admission);
        let router = Self::build_router(&config, routes, Arc::clone(&admission));
        Self {
            router,
            config,
            admission,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, routes: Router, admission: Arc<Admission>) -> Router {
        routes
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(admission, admission_middleware))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if self.admission.limiter().is_some() {
            let interval = Duration::from_secs(self.config.rate_limit.purge_interval_secs.max(1));
            tokio::spawn(purge_windows(
                Arc::clone(&self.admission),
                interval,
                shutdown.resubscribe(),
            ));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn admission(&self) -> &Arc<Admission> {
        &self.admission
    }
}

/// Periodically drop idle limiter windows.
async fn purge_windows(
    admission: Arc<Admission>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                admission.purge_expired();
            }
            _ = shutdown.recv() => {
                tracing::debug!("Limiter purge task exiting");
                return;
            }
        }
    }
}

/// Health and info routes served when no application router is given.
pub fn default_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(root))
        .fallback(not_found)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to {}", env!("CARGO_PKG_NAME")),
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "path": uri.path(),
        })),
    )
}
