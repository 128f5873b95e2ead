//! Lifecycle orchestration.
//!
//! # Data Flow
//! ```text
//! caller (admin API, CLI, expiry sweep)
//!     → ControlPlane::<operation>
//!         → validate (probe backend, allocate port/address, check invariants)
//!         → Store (persist; uniqueness conflicts become field errors)
//!         → MeshManager (node changes)
//!         → ProxyReconciler (domain/service changes)
//! ```
//!
//! # Design Decisions
//! - Backend reachability is checked before anything is persisted
//! - Service updates remove the old file (no reload) before adding the new one
//! - Enable/disable are plain updates, so file presence always tracks `enabled`
//! - Failed infrastructure steps are not retried; `initialize` rebuilds everything

pub mod domain;
pub mod error;
pub mod expiry;
pub mod http_service;
pub mod node;
pub mod startup;
pub mod tcp_service;
pub mod ttl;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;

use crate::config::GatewireConfig;
use crate::control::{
    CertProvider, CommandCertProvider, IpRouteCommand, NetProbe, NginxCommand, ProxyControl,
    RouteControl, SocketProbe, WgCommand, WgControl,
};
use crate::model::{Node, NodeId};
use crate::net::probe::{is_ip, ProbeTarget};
use crate::nginx::location::AuthHeaders;
use crate::nginx::{LocationOptions, NginxLayout, ProxyReconciler};
use crate::store::Store;
use crate::wireguard::MeshManager;

pub use error::{ControlError, FieldError};
pub use expiry::ExpirySweep;

/// The external systems the control plane drives.
#[derive(Clone)]
pub struct Adapters {
    pub wg: Arc<dyn WgControl>,
    pub proxy: Arc<dyn ProxyControl>,
    pub routes: Arc<dyn RouteControl>,
    pub certs: Arc<dyn CertProvider>,
    pub probe: Arc<dyn NetProbe>,
}

impl Adapters {
    /// Adapters backed by the real binaries and sockets.
    pub fn system(config: &GatewireConfig) -> Self {
        Self {
            wg: Arc::new(WgCommand::new()),
            proxy: Arc::new(NginxCommand::new(&config.nginx.binary)),
            routes: Arc::new(IpRouteCommand::new()),
            certs: Arc::new(CommandCertProvider::new(config.ssl.clone())),
            probe: Arc::new(SocketProbe),
        }
    }
}

pub struct ControlPlane {
    config: Arc<GatewireConfig>,
    store: Arc<dyn Store>,
    mesh: MeshManager,
    proxy: ProxyReconciler,
    certs: Arc<dyn CertProvider>,
    probe: Arc<dyn NetProbe>,
    routes: Arc<dyn RouteControl>,

    /// Services with an expiry timer already running.
    pending_expiry: DashSet<expiry::ServiceKey>,
}

impl ControlPlane {
    pub fn new(config: GatewireConfig, store: Arc<dyn Store>, adapters: Adapters) -> Self {
        let mesh = MeshManager::new(
            store.clone(),
            adapters.wg.clone(),
            adapters.routes.clone(),
            &config.wireguard,
        );
        let proxy = ProxyReconciler::new(
            adapters.proxy.clone(),
            NginxLayout::new(&config.nginx),
            LocationOptions {
                client_max_body_size: config.nginx.client_max_body_size.clone(),
                auth: AuthHeaders::from(&config.oauth2),
            },
        );

        Self {
            config: Arc::new(config),
            store,
            mesh,
            proxy,
            certs: adapters.certs,
            probe: adapters.probe,
            routes: adapters.routes,
            pending_expiry: DashSet::new(),
        }
    }

    pub fn config(&self) -> &GatewireConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn mesh(&self) -> &MeshManager {
        &self.mesh
    }

    pub fn proxy(&self) -> &ProxyReconciler {
        &self.proxy
    }

    pub fn routes(&self) -> &Arc<dyn RouteControl> {
        &self.routes
    }

    pub async fn get_node(&self, id: NodeId) -> Result<Node, ControlError> {
        self.store
            .node(id)
            .await?
            .ok_or(ControlError::NotFound("Node"))
    }

    /// Fail with a `backend_port` field error unless `port` answers on the
    /// node. Gateways and the self-hosted node are probed at `host` when one
    /// is given; gateways resolve names through their own address.
    pub async fn check_node_port(
        &self,
        node_id: NodeId,
        port: u16,
        host: Option<&str>,
        tls: bool,
    ) -> Result<(), ControlError> {
        let node = self.get_node(node_id).await?;
        let host = host.filter(|h| !h.is_empty());

        let server = match host {
            Some(h) if node.is_gateway() || node.is_self_hosted() => h.to_string(),
            _ => node.address.to_string(),
        };
        let resolver = match host {
            Some(h) if node.is_gateway() && !is_ip(h) => Some(IpAddr::V4(node.address)),
            _ => None,
        };

        let target = ProbeTarget::new(server.clone(), port, self.probe_timeout())
            .resolver(resolver)
            .tls(tls);
        if !self.probe.reachable(&target).await {
            return Err(ControlError::validation(
                "backend_port",
                format!("Unable to reach out port {} in node {}", port, server),
            ));
        }
        Ok(())
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.config.probe.timeout_ms)
    }

    fn local_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.config.probe.local_timeout_ms)
    }
}
