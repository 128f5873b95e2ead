//! Tunnel status derived from the runtime dump. Never stored.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Node, NodeSummary};
use crate::wireguard::dump::PeerRuntime;

/// A handshake younger than this counts as online.
pub const ONLINE_WINDOW_SECS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Idle,
    Offline,
}

pub fn tunnel_status(node: &Node, peer: Option<&PeerRuntime>, now: DateTime<Utc>) -> NodeStatus {
    let handshake = match peer {
        Some(p) if node.enabled && p.latest_handshake > 0 => p.latest_handshake as i64,
        _ => return NodeStatus::Offline,
    };
    if now.timestamp() - handshake < ONLINE_WINDOW_SECS {
        NodeStatus::Online
    } else {
        NodeStatus::Idle
    }
}

/// Runtime fields for one node. All `None` when the dump had no entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRuntime {
    pub client_ip: Option<String>,

    /// Milliseconds since the epoch.
    pub latest_handshake_timestamp: Option<u64>,
    pub transfer_rx: Option<u64>,
    pub transfer_tx: Option<u64>,
    pub status: NodeStatus,
}

impl NodeRuntime {
    pub fn derive(node: &Node, peer: Option<&PeerRuntime>, now: DateTime<Utc>) -> Self {
        Self {
            client_ip: peer.and_then(|p| p.client_ip.clone()),
            latest_handshake_timestamp: peer.map(|p| p.latest_handshake * 1000),
            transfer_rx: peer.map(|p| p.transfer_rx),
            transfer_tx: peer.map(|p| p.transfer_tx),
            status: tunnel_status(node, peer, now),
        }
    }
}

/// A node as reported to callers. `runtime` is absent when the dump could
/// not be read.
#[derive(Debug, Clone, Serialize)]
pub struct NodeWithRuntime {
    #[serde(flatten)]
    pub node: NodeSummary,

    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<NodeRuntime>,
}

impl NodeWithRuntime {
    pub fn bare(node: &Node) -> Self {
        Self {
            node: NodeSummary::from(node),
            runtime: None,
        }
    }

    pub fn with_peers(node: &Node, peers: &[PeerRuntime], now: DateTime<Utc>) -> Self {
        let peer = peers.iter().find(|p| p.public_key == node.public_key);
        Self {
            node: NodeSummary::from(node),
            runtime: Some(NodeRuntime::derive(node, peer, now)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use chrono::Duration;

    use super::*;
    use crate::model::NodeKind;

    fn node(enabled: bool) -> Node {
        Node {
            id: 1,
            name: "laptop".into(),
            interface: "wg0".into(),
            address: Ipv4Addr::new(10, 0, 0, 2),
            private_key: "priv".into(),
            public_key: "laptop-pub".into(),
            preshared_key: "psk".into(),
            allow_internet: false,
            kind: NodeKind::Managed,
            enabled,
            created_at: Utc::now(),
        }
    }

    fn peer(handshake: i64) -> PeerRuntime {
        PeerRuntime {
            public_key: "laptop-pub".into(),
            preshared_key: "psk".into(),
            endpoint: Some("203.0.113.9:41234".into()),
            client_ip: Some("203.0.113.9".into()),
            allowed_ips: "10.0.0.2/32".into(),
            latest_handshake: handshake as u64,
            transfer_rx: 10,
            transfer_tx: 20,
            persistent_keepalive: 25,
        }
    }

    #[test]
    fn test_status_classification() {
        let now = Utc::now();
        let recent = peer((now - Duration::seconds(30)).timestamp());
        let stale = peer((now - Duration::seconds(600)).timestamp());

        assert_eq!(tunnel_status(&node(true), Some(&recent), now), NodeStatus::Online);
        assert_eq!(tunnel_status(&node(true), Some(&stale), now), NodeStatus::Idle);
        assert_eq!(tunnel_status(&node(false), Some(&recent), now), NodeStatus::Offline);
        assert_eq!(tunnel_status(&node(true), Some(&peer(0)), now), NodeStatus::Offline);
        assert_eq!(tunnel_status(&node(true), None, now), NodeStatus::Offline);
    }

    #[test]
    fn test_runtime_fields() {
        let now = Utc::now();
        let handshake = now.timestamp() - 10;
        let info = NodeWithRuntime::with_peers(&node(true), &[peer(handshake)], now);
        let runtime = info.runtime.unwrap();

        assert_eq!(runtime.client_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(runtime.latest_handshake_timestamp, Some(handshake as u64 * 1000));
        assert_eq!(runtime.transfer_rx, Some(10));

        let json = serde_json::to_value(NodeWithRuntime::bare(&node(true))).unwrap();
        assert!(json.get("status").is_none());
        assert!(json.get("private_key").is_none());
    }
}
