//! HTTP surface of orbit-relay.
//!
//! Serves the WebSocket transfer endpoint plus health and metrics.

pub mod health;
mod metrics;

use crate::error::{RelayError, Result};
use crate::protocol::transfer_handler;
use crate::server::OrbitRelay;
use axum::{routing::get, Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<OrbitRelay>) -> Router {
    let transfer_path = relay.config().server.transfer_path.clone();

    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        .route(&transfer_path, get(transfer_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

/// Bind the configured address and serve until the process exits.
pub async fn serve(relay: Arc<OrbitRelay>) -> Result<()> {
    let address = relay.config().server.bind_address.clone();
    let addr: SocketAddr = address
        .parse()
        .map_err(|source| RelayError::BindAddress { address, source })?;

    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, relay).await
}

/// Serve on an already bound listener.
pub async fn serve_on(listener: TcpListener, relay: Arc<OrbitRelay>) -> Result<()> {
    tracing::info!(
        "orbit-relay listening on {} (transfer path {})",
        listener.local_addr()?,
        relay.config().server.transfer_path
    );

    axum::serve(listener, build_router(relay)).await?;
    Ok(())
}
