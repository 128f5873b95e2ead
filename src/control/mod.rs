//! External control adapters.
//!
//! # Data Flow
//! ```text
//! MeshManager      → WgControl     → wg / wg-quick
//! ProxyReconciler  → ProxyControl  → nginx -t / nginx -s reload
//! MeshManager      → RouteControl  → ip route / ping
//! ControlPlane     → CertProvider  → openssl / certbot
//! ControlPlane     → NetProbe      → TCP/TLS connect, DNS
//! ```
//!
//! # Design Decisions
//! - Every side effect outside the process goes through one of these traits so
//!   the orchestration can be exercised against recording fakes
//! - Adapters never retry; failures surface as `CommandError`
//! - Command implementations log stderr themselves; callers only see a summary

pub mod certs;
pub mod command;
pub mod fs;
pub mod nginx;
pub mod route;
pub mod wg;

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use ipnet::Ipv4Net;

use crate::model::{SslMode, SslPair};
use crate::net::probe::{self, ProbeTarget};

pub use certs::CommandCertProvider;
pub use command::CommandError;
pub use nginx::NginxCommand;
pub use route::IpRouteCommand;
pub use wg::WgCommand;

/// The WireGuard userspace utilities.
#[async_trait]
pub trait WgControl: Send + Sync {
    async fn gen_private_key(&self) -> Result<String, CommandError>;
    async fn public_key(&self, private_key: &str) -> Result<String, CommandError>;
    async fn gen_preshared_key(&self) -> Result<String, CommandError>;

    /// Apply the on-disk config to the live interface without a restart.
    async fn sync_conf(&self, interface: &str) -> Result<(), CommandError>;
    async fn quick_up(&self, interface: &str) -> Result<(), CommandError>;
    async fn quick_down(&self, interface: &str) -> Result<(), CommandError>;

    /// Raw `wg show <iface> dump` output.
    async fn dump(&self, interface: &str) -> Result<String, CommandError>;
}

/// The reverse proxy process.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Validate the whole active config tree.
    async fn test_config(&self) -> Result<(), CommandError>;
    async fn reload(&self) -> Result<(), CommandError>;
}

/// Kernel routing and ICMP.
#[async_trait]
pub trait RouteControl: Send + Sync {
    async fn add_route(&self, network: Ipv4Net, via: Ipv4Addr, device: &str) -> Result<(), CommandError>;
    async fn del_route(&self, network: Ipv4Net) -> Result<(), CommandError>;

    /// Round-trip time in milliseconds, `None` when unreachable.
    async fn ping(&self, addr: IpAddr) -> Option<f64>;
}

/// Issues certificates and reports the paths nginx should read.
#[async_trait]
pub trait CertProvider: Send + Sync {
    /// Paths for `domain` (the default pair when `None`), without issuing anything.
    fn ssl_pair(&self, domain: Option<&str>, mode: SslMode) -> SslPair;

    /// Issue the certificate if it does not exist yet.
    async fn certificates(&self, domain: &str, mode: SslMode) -> Result<SslPair, CommandError>;

    /// Create the default self-signed pair and link it where nginx expects it.
    async fn default_certificates(&self) -> Result<SslPair, CommandError>;

    async fn remove(&self, domain: &str, mode: SslMode) -> Result<(), CommandError>;
}

/// Live network checks.
#[async_trait]
pub trait NetProbe: Send + Sync {
    async fn reachable(&self, target: &ProbeTarget) -> bool;

    /// Whether public DNS for `domain` resolves to `host`.
    async fn points_to(&self, domain: &str, host: &str) -> bool;
}

/// `NetProbe` backed by real sockets and the system resolver.
#[derive(Debug, Default, Clone)]
pub struct SocketProbe;

#[async_trait]
impl NetProbe for SocketProbe {
    async fn reachable(&self, target: &ProbeTarget) -> bool {
        probe::probe_tcp_connect(target).await
    }

    async fn points_to(&self, domain: &str, host: &str) -> bool {
        probe::domain_points_to(domain, host).await
    }
}
