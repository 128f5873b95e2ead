//! Admin HTTP surface.
//!
//! # Data Flow
//! ```text
//! gatewire-cli / operator
//!     → axum Router (/admin/*)
//!     → auth.rs (bearer API key)
//!     → handlers.rs
//!     → ControlPlane / NodeMonitor
//! ```
//!
//! # Design Decisions
//! - Read-mostly: the only mutation is triggering an expiry sweep
//! - Errors carry the public message only; detail stays in the logs

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::health::NodeMonitor;
use crate::orchestrator::ControlPlane;

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub plane: Arc<ControlPlane>,
    pub monitor: Arc<NodeMonitor>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/nodes", get(get_nodes))
        .route("/admin/nodes/{id}/config", get(get_node_config))
        .route("/admin/expire", post(post_expire))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin router until shutdown.
pub async fn serve(
    state: AdminState,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
