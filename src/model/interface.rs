//! The WireGuard interface record.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// One VPN network. Created once at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name, e.g. "wg0".
    pub name: String,

    /// Interface address carrying the subnet prefix, e.g. `10.0.0.1/24`.
    pub address: Ipv4Net,

    pub port: u16,
    pub private_key: String,
    pub public_key: String,

    #[serde(default)]
    pub pre_up: String,
    #[serde(default)]
    pub post_up: String,
    #[serde(default)]
    pub pre_down: String,
    #[serde(default)]
    pub post_down: String,
}

impl Interface {
    /// The mesh subnet, e.g. `10.0.0.0/24`.
    pub fn subnet(&self) -> Ipv4Net {
        self.address.trunc()
    }
}
