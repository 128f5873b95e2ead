//! Mesh membership and interface config.
//!
//! # Responsibilities
//! - Allocate addresses and key material for nodes
//! - Rewrite `<config_dir>/<iface>.conf` wholesale after every mesh change
//! - Apply it live (`syncconf`) or bring the interface up
//! - Keep gateway routes in step with node state
//! - Read runtime status without failing callers

use std::collections::HashSet;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::config::schema::WireguardConfig;
use crate::control::{fs, CommandError, RouteControl, WgControl};
use crate::model::{Interface, NewNode, Node, NodeFilter};
use crate::net::allocator::{allocate_address, AllocError};
use crate::observability::metrics;
use crate::store::{Store, StoreError};
use crate::wireguard::conf::{server_config, ClientWgConfig};
use crate::wireguard::dump::parse_dump;
use crate::wireguard::status::NodeWithRuntime;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("interface {0} has not been bootstrapped")]
    MissingInterface(String),

    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Fresh WireGuard credentials for one peer.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub private_key: String,
    pub public_key: String,
    pub preshared_key: String,
}

pub struct MeshManager {
    store: Arc<dyn Store>,
    wg: Arc<dyn WgControl>,
    routes: Arc<dyn RouteControl>,
    interface: String,
    host: String,
    config_dir: PathBuf,
}

impl MeshManager {
    pub fn new(
        store: Arc<dyn Store>,
        wg: Arc<dyn WgControl>,
        routes: Arc<dyn RouteControl>,
        config: &WireguardConfig,
    ) -> Self {
        Self {
            store,
            wg,
            routes,
            interface: config.interface.clone(),
            host: config.host.clone(),
            config_dir: config.config_dir.clone(),
        }
    }

    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(format!("{}.conf", self.interface))
    }

    pub async fn interface(&self) -> Result<Interface, MeshError> {
        self.store
            .interface(&self.interface)
            .await?
            .ok_or_else(|| MeshError::MissingInterface(self.interface.clone()))
    }

    pub async fn generate_keys(&self) -> Result<KeyMaterial, MeshError> {
        let private_key = self.wg.gen_private_key().await?;
        let public_key = self.wg.public_key(&private_key).await?;
        let preshared_key = self.wg.gen_preshared_key().await?;
        Ok(KeyMaterial {
            private_key,
            public_key,
            preshared_key,
        })
    }

    /// First free address in the mesh subnet.
    pub async fn available_address(&self) -> Result<Ipv4Addr, MeshError> {
        let interface = self.interface().await?;
        let subnet = interface.subnet();
        let mut busy: HashSet<Ipv4Addr> = self
            .store
            .nodes(&NodeFilter::default())
            .await?
            .into_iter()
            .map(|n| n.address)
            .collect();
        busy.insert(interface.address.addr());

        allocate_address(subnet, &busy).ok_or(MeshError::Alloc(AllocError::NoAddressAvailable(subnet)))
    }

    /// Persist a new peer, apply the config and route its gateway network.
    pub async fn create_node(&self, new: NewNode) -> Result<Node, MeshError> {
        let address = match new.address {
            Some(address) => address,
            None => self.available_address().await?,
        };
        let keys = self.generate_keys().await?;

        let node = self
            .store
            .insert_node(Node {
                id: 0,
                name: new.name.clone(),
                interface: self.interface.clone(),
                address,
                private_key: keys.private_key,
                public_key: keys.public_key,
                preshared_key: keys.preshared_key,
                allow_internet: new.allow_internet,
                kind: new.kind(),
                enabled: new.enabled.unwrap_or(true),
                created_at: Utc::now(),
            })
            .await?;
        tracing::info!(node_id = node.id, address = %node.address, "Node created");

        self.load_config().await?;
        self.add_route(&node).await;
        Ok(node)
    }

    /// Replace a node's keys in place. The address is kept.
    pub async fn regenerate_keys(&self, node: &Node) -> Result<Node, MeshError> {
        let keys = self.generate_keys().await?;
        let node = self
            .store
            .update_node(Node {
                private_key: keys.private_key,
                public_key: keys.public_key,
                preshared_key: keys.preshared_key,
                ..node.clone()
            })
            .await?;
        tracing::info!(node_id = node.id, "Node keys regenerated");

        self.load_config().await?;
        Ok(node)
    }

    /// Persist `updated` over `old`, moving the gateway route with it. When
    /// the config apply fails the route change is undone; the persisted
    /// record stays for the next apply to pick up.
    pub async fn update_node(&self, old: &Node, updated: Node) -> Result<Node, MeshError> {
        self.remove_route(old).await;
        let node = match self.store.update_node(updated).await {
            Ok(node) => node,
            Err(e) => {
                self.add_route(old).await;
                return Err(e.into());
            }
        };
        self.add_route(&node).await;

        if let Err(e) = self.load_config().await {
            tracing::error!(node_id = node.id, error = %e, "Mesh apply failed, restoring previous route");
            self.remove_route(&node).await;
            self.add_route(old).await;
            return Err(e);
        }
        Ok(node)
    }

    /// Remove a node (cascading in the store) and drop it from the mesh.
    pub async fn delete_node(&self, node: &Node) -> Result<(), MeshError> {
        self.remove_route(node).await;
        self.store.delete_node(node.id).await?;
        tracing::info!(node_id = node.id, "Node deleted");
        self.load_config().await
    }

    /// Write the interface config from the interface record and enabled nodes.
    pub async fn save_config(&self) -> Result<(), MeshError> {
        let interface = self.interface().await?;
        let nodes = self.store.nodes(&NodeFilter::enabled()).await?;
        let path = self.config_path();

        fs::write_private(&path, &server_config(&interface, &nodes))
            .await
            .map_err(|source| MeshError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(file = %path.display(), peers = nodes.len(), "Wrote WireGuard config");
        Ok(())
    }

    /// Rewrite the config and sync the live interface.
    pub async fn load_config(&self) -> Result<(), MeshError> {
        self.save_config().await?;
        self.wg.sync_conf(&self.interface).await?;
        metrics::record_mesh_sync("sync");
        Ok(())
    }

    /// Rewrite the config and bring the interface up.
    pub async fn initialize(&self) -> Result<(), MeshError> {
        self.save_config().await?;
        self.wg.quick_up(&self.interface).await?;
        metrics::record_mesh_sync("up");
        tracing::info!(interface = %self.interface, "WireGuard interface up");
        Ok(())
    }

    /// Best effort; a failure is only logged.
    pub async fn shutdown(&self) {
        if let Err(e) = self.wg.quick_down(&self.interface).await {
            tracing::warn!(interface = %self.interface, error = %e, "Failed to bring interface down");
        }
    }

    /// Route an enabled gateway's network through its mesh address.
    pub async fn add_route(&self, node: &Node) {
        if let Some(network) = node.active_route() {
            match self.routes.add_route(network, node.address, &self.interface).await {
                Ok(()) => tracing::info!(node_id = node.id, network = %network, via = %node.address, "Gateway route added"),
                Err(e) => tracing::warn!(node_id = node.id, network = %network, error = %e, "Failed to add gateway route"),
            }
        }
    }

    pub async fn remove_route(&self, node: &Node) {
        if let Some(network) = node.active_route() {
            match self.routes.del_route(network).await {
                Ok(()) => tracing::info!(node_id = node.id, network = %network, "Gateway route removed"),
                Err(e) => tracing::warn!(node_id = node.id, network = %network, error = %e, "Failed to remove gateway route"),
            }
        }
    }

    pub async fn client_config(&self, node: &Node) -> Result<ClientWgConfig, MeshError> {
        let interface = self.interface().await?;
        Ok(ClientWgConfig::new(&interface, node, &self.host))
    }

    /// Nodes augmented with live tunnel data. When the dump cannot be read
    /// the nodes come back without runtime fields.
    pub async fn runtime(&self, nodes: &[Node]) -> Vec<NodeWithRuntime> {
        match self.wg.dump(&self.interface).await {
            Ok(output) => {
                let peers = parse_dump(&output);
                let now = Utc::now();
                nodes
                    .iter()
                    .map(|n| NodeWithRuntime::with_peers(n, &peers, now))
                    .collect()
            }
            Err(e) => {
                tracing::warn!(interface = %self.interface, error = %e, "Failed to read WireGuard runtime");
                nodes.iter().map(NodeWithRuntime::bare).collect()
            }
        }
    }

    pub async fn node_runtime(&self, node: &Node) -> NodeWithRuntime {
        let mut all = self.runtime(std::slice::from_ref(node)).await;
        all.pop().unwrap_or_else(|| NodeWithRuntime::bare(node))
    }
}
