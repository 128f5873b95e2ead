//! gatewire daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                  gatewire                    │
//!   admin API ──────▶│  ┌──────────────┐      ┌──────────────────┐  │
//!   expiry sweep ───▶│  │ ControlPlane │─────▶│      Store       │  │
//!                    │  └──────┬───────┘      └──────────────────┘  │
//!                    │         │                                    │
//!                    │   ┌─────┴─────────────┐                      │
//!                    │   ▼                   ▼                      │
//!                    │ ┌────────────┐  ┌─────────────────┐          │
//!                    │ │MeshManager │  │ProxyReconciler  │          │
//!                    │ └─────┬──────┘  └───────┬─────────┘          │
//!                    └───────┼─────────────────┼────────────────────┘
//!                            ▼                 ▼
//!                 wg / wg-quick / ip     nginx -t / nginx -s reload
//! ```
//!
//! Usage: `gatewire [CONFIG.toml]`. Without a file the configuration comes
//! from defaults and the deployment environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use gatewire::admin::{self, AdminState};
use gatewire::config::{load_config, loader::load_from_env};
use gatewire::health::NodeMonitor;
use gatewire::lifecycle::{wait_for_signal, SignalEvent, Shutdown};
use gatewire::observability::{logging, metrics};
use gatewire::orchestrator::{Adapters, ControlPlane};
use gatewire::store::{MemoryStore, Store};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => load_config(&path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatewire starting");
    tracing::info!(
        interface = %config.wireguard.interface,
        subnet = %config.wireguard.subnet,
        host = %config.wireguard.host,
        nginx_root = %config.nginx.root.display(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store: Arc<dyn Store> = match &config.store.path {
        Some(path) => Arc::new(MemoryStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };

    let adapters = Adapters::system(&config);
    let routes = adapters.routes.clone();
    let plane = Arc::new(ControlPlane::new(config.clone(), store.clone(), adapters));

    plane.bootstrap().await?;
    if let Err(e) = plane.initialize().await {
        tracing::error!(error = %e, "Initialization finished with errors");
    }

    let mut shutdown = Shutdown::new();

    let monitor = Arc::new(NodeMonitor::new(store, routes, config.health.clone()));
    shutdown.track(
        "node-monitor",
        tokio::spawn(Arc::clone(&monitor).run(shutdown.subscribe())),
    );
    shutdown.track(
        "expiry",
        tokio::spawn(Arc::clone(&plane).run_expiry(shutdown.subscribe())),
    );

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            plane: Arc::clone(&plane),
            monitor,
            api_key: Arc::from(config.admin.api_key.as_str()),
        };
        let rx = shutdown.subscribe();
        shutdown.track(
            "admin",
            tokio::spawn(async move {
                if let Err(e) = admin::serve(state, listener, rx).await {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }),
        );
    }

    loop {
        match wait_for_signal().await? {
            SignalEvent::Rebuild => {
                tracing::info!("Rebuilding generated configuration");
                if let Err(e) = plane.initialize().await {
                    tracing::error!(error = %e, "Rebuild finished with errors");
                }
            }
            SignalEvent::Shutdown => break,
        }
    }

    let stopped = shutdown.drain(SHUTDOWN_DEADLINE).await;
    plane.shutdown().await;
    tracing::info!(tasks = stopped, "Shutdown complete");
    Ok(())
}
