//! Node lifecycle.

use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::model::{
    NewNode, Node, NodeFilter, NodeId, NodeKind, NodeSummary, NodeUpdate, PersonalAccessToken,
    ServiceFilter,
};
use crate::orchestrator::{ControlError, ControlPlane};
use crate::wireguard::{ClientWgConfig, NodeWithRuntime};

const DEFAULT_TOKEN: &str = "default";

/// A node returned together with a freshly issued token secret.
#[derive(Debug, Clone, Serialize)]
pub struct NodeWithToken {
    #[serde(flatten)]
    pub node: NodeSummary,
    pub token: String,
}

impl ControlPlane {
    pub async fn nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, ControlError> {
        Ok(self.store.nodes(filter).await?)
    }

    pub async fn create_node(&self, new: NewNode) -> Result<Node, ControlError> {
        if new.name.trim().is_empty() {
            return Err(ControlError::validation("name", "Name is required"));
        }
        if let Some(address) = new.address {
            self.validate_node_address(address).await?;
        }
        if let Some(network) = new.gateway_network {
            self.validate_gateway_network(network)?;
        }

        Ok(self.mesh.create_node(new).await?)
    }

    /// Create a node and issue its default token.
    pub async fn create_node_with_token(&self, new: NewNode) -> Result<NodeWithToken, ControlError> {
        let node = self.create_node(new).await?;
        let token = self.issue_default_token(node.id).await?;
        Ok(NodeWithToken {
            node: NodeSummary::from(&node),
            token: token.secret,
        })
    }

    /// New key material for a node whose credentials may be compromised.
    /// Every existing token is revoked and a new default one issued.
    pub async fn regenerate_node(&self, id: NodeId) -> Result<NodeWithToken, ControlError> {
        let node = self.get_node(id).await?;
        if node.is_self_hosted() {
            return Err(ControlError::validation("id", "The self-hosted node has no keys"));
        }

        let node = self.mesh.regenerate_keys(&node).await?;
        let revoked = self.store.revoke_tokens(id).await?;
        tracing::info!(node_id = id, revoked, "Node tokens revoked");

        let token = self.issue_default_token(id).await?;
        Ok(NodeWithToken {
            node: NodeSummary::from(&node),
            token: token.secret,
        })
    }

    pub async fn update_node(&self, id: NodeId, update: NodeUpdate) -> Result<Node, ControlError> {
        let old = self.get_node(id).await?;
        let mut next = old.clone();

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(ControlError::validation("name", "Name is required"));
            }
            next.name = name;
        }
        if old.is_self_hosted() {
            if update.allow_internet.is_some() || update.gateway_network.is_some() || update.enabled.is_some() {
                return Err(ControlError::validation(
                    "id",
                    "Only the name of the self-hosted node can be changed",
                ));
            }
            return Ok(self.store.update_node(next).await?);
        }

        if let Some(allow_internet) = update.allow_internet {
            next.allow_internet = allow_internet;
        }
        if let Some(network) = update.gateway_network {
            next.kind = match network {
                Some(network) => {
                    self.validate_gateway_network(network)?;
                    NodeKind::Gateway { network }
                }
                None => NodeKind::Managed,
            };
        }
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }

        Ok(self.mesh.update_node(&old, next).await?)
    }

    pub async fn enable_node(&self, id: NodeId) -> Result<Node, ControlError> {
        self.update_node(id, NodeUpdate::enabled(true)).await
    }

    pub async fn disable_node(&self, id: NodeId) -> Result<Node, ControlError> {
        self.update_node(id, NodeUpdate::enabled(false)).await
    }

    /// Self-service change of the network a gateway routes for.
    pub async fn update_gateway_network(&self, id: NodeId, network: Ipv4Net) -> Result<Node, ControlError> {
        let node = self.get_node(id).await?;
        if !node.is_gateway() {
            return Err(ControlError::validation(
                "gateway_network",
                "Only gateway nodes can change their gateway network",
            ));
        }
        self.update_node(
            id,
            NodeUpdate {
                gateway_network: Some(Some(network)),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete a node with its services and tokens.
    pub async fn delete_node(&self, id: NodeId) -> Result<(), ControlError> {
        let node = self.get_node(id).await?;
        if node.is_self_hosted() {
            return Err(ControlError::validation("id", "The self-hosted node can't be deleted"));
        }

        let filter = ServiceFilter::node(id);
        for service in self.store.http_services(&filter).await? {
            self.proxy.remove_http_service(&service, false).await?;
        }
        for service in self.store.tcp_services(&filter).await? {
            self.proxy.remove_tcp_service(&service, false).await?;
        }

        self.mesh.delete_node(&node).await?;
        self.proxy.reload().await?;
        Ok(())
    }

    /// The `wg-quick` file for a node.
    pub async fn node_config(&self, id: NodeId) -> Result<String, ControlError> {
        Ok(self.node_wg_config(id).await?.to_conf())
    }

    pub async fn node_wg_config(&self, id: NodeId) -> Result<ClientWgConfig, ControlError> {
        let node = self.get_node(id).await?;
        if node.is_self_hosted() {
            return Err(ControlError::validation("id", "The self-hosted node has no client config"));
        }
        Ok(self.mesh.client_config(&node).await?)
    }

    pub async fn node_runtime(&self, id: NodeId) -> Result<NodeWithRuntime, ControlError> {
        let node = self.get_node(id).await?;
        Ok(self.mesh.node_runtime(&node).await)
    }

    pub async fn nodes_runtime(&self, filter: &NodeFilter) -> Result<Vec<NodeWithRuntime>, ControlError> {
        let nodes = self.store.nodes(filter).await?;
        Ok(self.mesh.runtime(&nodes).await)
    }

    async fn issue_default_token(&self, node_id: NodeId) -> Result<PersonalAccessToken, ControlError> {
        Ok(self
            .store
            .insert_token(PersonalAccessToken::issue(node_id, DEFAULT_TOKEN))
            .await?)
    }

    /// An explicit address must be a usable host of the mesh subnet other
    /// than the interface's own.
    async fn validate_node_address(&self, address: Ipv4Addr) -> Result<(), ControlError> {
        let interface = self.mesh.interface().await?;
        let subnet = interface.subnet();
        if !subnet.contains(&address)
            || address == subnet.network()
            || address == subnet.broadcast()
            || address == interface.address.addr()
        {
            return Err(ControlError::validation(
                "address",
                format!("Address must be a free host address in {}", subnet),
            ));
        }
        Ok(())
    }

    fn validate_gateway_network(&self, network: Ipv4Net) -> Result<(), ControlError> {
        let subnet = self.config.wireguard.subnet;
        if network.contains(&subnet.network()) || subnet.contains(&network.network()) {
            return Err(ControlError::validation(
                "gateway_network",
                format!("Gateway network overlaps the VPN subnet {}", subnet),
            ));
        }
        if let Ok(IpAddr::V4(host)) = self.config.wireguard.host.parse::<IpAddr>() {
            if network.contains(&host) {
                return Err(ControlError::validation(
                    "gateway_network",
                    "Gateway network can't include this server's address",
                ));
            }
        }
        Ok(())
    }
}
