//! Mesh peers.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

pub type NodeId = u64;

/// What role a node plays in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// A regular client peer.
    Managed,

    /// A peer routing an entire external subnet through the mesh.
    Gateway { network: Ipv4Net },

    /// The control plane's own host. Never a WireGuard peer.
    SelfHosted,
}

/// A mesh peer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub interface: String,
    pub address: Ipv4Addr,
    pub private_key: String,
    pub public_key: String,
    pub preshared_key: String,
    pub allow_internet: bool,
    pub kind: NodeKind,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Node {
    pub fn is_gateway(&self) -> bool {
        matches!(self.kind, NodeKind::Gateway { .. })
    }

    pub fn is_self_hosted(&self) -> bool {
        matches!(self.kind, NodeKind::SelfHosted)
    }

    pub fn gateway_network(&self) -> Option<Ipv4Net> {
        match self.kind {
            NodeKind::Gateway { network } => Some(network),
            _ => None,
        }
    }

    /// Whether this node should appear as a `[Peer]` in the interface config.
    pub fn is_peer(&self) -> bool {
        self.enabled && !self.is_self_hosted()
    }

    /// Route the kernel needs while this node is an enabled gateway.
    pub fn active_route(&self) -> Option<Ipv4Net> {
        if self.enabled {
            self.gateway_network()
        } else {
            None
        }
    }
}

/// Input for creating a node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewNode {
    pub name: String,

    /// Explicit address; allocated from the subnet when `None`.
    pub address: Option<Ipv4Addr>,
    pub allow_internet: bool,
    pub gateway_network: Option<Ipv4Net>,
    pub enabled: Option<bool>,
}

impl NewNode {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn gateway(name: impl Into<String>, network: Ipv4Net) -> Self {
        Self {
            name: name.into(),
            gateway_network: Some(network),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.gateway_network {
            Some(network) => NodeKind::Gateway { network },
            None => NodeKind::Managed,
        }
    }
}

/// Partial update of a node. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub allow_internet: Option<bool>,

    /// `Some(None)` turns a gateway back into a managed node.
    pub gateway_network: Option<Option<Ipv4Net>>,
    pub enabled: Option<bool>,
}

impl NodeUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }
}

/// Explicit lookup filter over node fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeFilter {
    pub enabled: Option<bool>,
    pub gateway: Option<bool>,
    pub search: Option<String>,
}

impl NodeFilter {
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, node: &Node) -> bool {
        if let Some(enabled) = self.enabled {
            if node.enabled != enabled {
                return false;
            }
        }
        if let Some(gateway) = self.gateway {
            if node.is_gateway() != gateway {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !node.name.to_lowercase().contains(&needle)
                && !node.address.to_string().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// Node fields safe to expose outside the control plane.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub name: String,
    pub address: Ipv4Addr,
    pub public_key: String,
    pub allow_internet: bool,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub enabled: bool,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            address: node.address,
            public_key: node.public_key.clone(),
            allow_internet: node.allow_internet,
            kind: node.kind,
            enabled: node.enabled,
        }
    }
}
