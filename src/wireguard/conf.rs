//! WireGuard config synthesis.
//!
//! # Responsibilities
//! - Server config: the interface plus one `[Peer]` per enabled node
//! - Client config for one node, as text and as a structured object

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::model::{Interface, Node};

/// Keepalive pushed to every client, in seconds.
pub const PERSISTENT_KEEPALIVE: u16 = 25;

/// Egress device assumed on gateway hosts.
const GATEWAY_EGRESS: &str = "eth0";

/// Full `<iface>.conf` content. Nodes that are not peers are skipped.
pub fn server_config(interface: &Interface, nodes: &[Node]) -> String {
    let mut conf = format!(
        "# Server\n[Interface]\nPrivateKey = {}\nAddress = {}\nListenPort = {}\nPreUp = {}\nPostUp = {}\nPreDown = {}\nPostDown = {}\n",
        interface.private_key,
        interface.address,
        interface.port,
        interface.pre_up,
        interface.post_up,
        interface.pre_down,
        interface.post_down,
    );

    for node in nodes.iter().filter(|n| n.is_peer()) {
        let role = if node.is_gateway() { "Gateway" } else { "Client" };
        let mut allowed = format!("{}/32", node.address);
        if let Some(network) = node.gateway_network() {
            allowed.push_str(&format!(", {}", network));
        }
        conf.push_str(&format!(
            "\n# {} {} ({})\n[Peer]\nPublicKey = {}\nPresharedKey = {}\nAllowedIPs = {}\n",
            role, node.name, node.id, node.public_key, node.preshared_key, allowed,
        ));
    }

    conf
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub url: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPeer {
    pub public_key: String,
    pub preshared_key: String,
    pub allowed_ips: Vec<String>,
    pub persistent_keepalive: u16,
    pub endpoint: Endpoint,
}

/// A node's client config in structured form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientWgConfig {
    pub private_key: String,
    pub address: String,
    pub post_up: Vec<String>,
    pub post_down: Vec<String>,
    pub peer: ClientPeer,
}

impl ClientWgConfig {
    /// `host` is the public endpoint clients dial.
    pub fn new(interface: &Interface, node: &Node, host: &str) -> Self {
        let subnet = interface.subnet();
        let (post_up, post_down) = if node.is_gateway() {
            (vec![masquerade('A', subnet)], vec![masquerade('D', subnet)])
        } else {
            (Vec::new(), Vec::new())
        };
        let allowed_ips = if node.allow_internet {
            vec!["0.0.0.0/0".to_string(), "::/0".to_string()]
        } else {
            vec![subnet.to_string()]
        };

        Self {
            private_key: node.private_key.clone(),
            address: format!("{}/32", node.address),
            post_up,
            post_down,
            peer: ClientPeer {
                public_key: interface.public_key.clone(),
                preshared_key: node.preshared_key.clone(),
                allowed_ips,
                persistent_keepalive: PERSISTENT_KEEPALIVE,
                endpoint: Endpoint {
                    url: format!("{}:{}", host, interface.port),
                    host: host.to_string(),
                    port: interface.port,
                },
            },
        }
    }

    /// The `wg-quick` file a node installs.
    pub fn to_conf(&self) -> String {
        let mut conf = format!(
            "[Interface]\nPrivateKey = {}\nAddress = {}\n",
            self.private_key, self.address
        );
        for rule in &self.post_up {
            conf.push_str(&format!("PostUp = {}\n", rule));
        }
        for rule in &self.post_down {
            conf.push_str(&format!("PostDown = {}\n", rule));
        }
        conf.push_str(&format!(
            "\n[Peer]\nPublicKey = {}\nPresharedKey = {}\nAllowedIPs = {}\nPersistentKeepalive = {}\nEndpoint = {}",
            self.peer.public_key,
            self.peer.preshared_key,
            self.peer.allowed_ips.join(", "),
            self.peer.persistent_keepalive,
            self.peer.endpoint.url,
        ));
        conf
    }
}

fn masquerade(action: char, subnet: Ipv4Net) -> String {
    format!(
        "iptables -t nat -{} POSTROUTING -s {} -o {} -j MASQUERADE",
        action, subnet, GATEWAY_EGRESS
    )
}
