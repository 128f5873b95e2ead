//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the control
//! plane. All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Root configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewireConfig {
    /// The control plane's own HTTP application (served through the proxy).
    pub app: AppConfig,

    /// WireGuard mesh settings.
    pub wireguard: WireguardConfig,

    /// nginx file layout and binary.
    pub nginx: NginxConfig,

    /// Certificate locations.
    pub ssl: SslConfig,

    /// TCP service exposure.
    pub services: ServicesConfig,

    /// OAuth2 gate settings for domains.
    pub oauth2: OAuth2Config,

    /// Socket probe timeouts.
    pub probe: ProbeConfig,

    /// TTL expiry sweep.
    pub expiry: ExpiryConfig,

    /// Node reachability monitor.
    pub health: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin surface.
    pub admin: AdminConfig,

    /// Persistence snapshot.
    pub store: StoreConfig,
}

/// The control plane's own HTTP application.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,

    /// Port the application listens on, behind the proxy's default location.
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Gatewire".to_string(),
            port: 3000,
        }
    }
}

/// WireGuard mesh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WireguardConfig {
    /// Interface name (e.g., "wg0").
    pub interface: String,

    /// Public host advertised to clients as the endpoint.
    pub host: String,

    /// UDP listen port.
    pub port: u16,

    /// Mesh subnet.
    pub subnet: Ipv4Net,

    /// Directory holding `<iface>.conf`.
    pub config_dir: PathBuf,

    /// Egress interface used by gateway MASQUERADE rules.
    pub egress_interface: String,

    pub pre_up: Option<String>,
    pub post_up: Option<String>,
    pub pre_down: Option<String>,
    pub post_down: Option<String>,
}

impl Default for WireguardConfig {
    fn default() -> Self {
        Self {
            interface: "wg0".to_string(),
            host: "localhost".to_string(),
            port: 51820,
            subnet: Ipv4Net::new(std::net::Ipv4Addr::new(10, 0, 0, 0), 24)
                .unwrap_or_default(),
            config_dir: PathBuf::from("/etc/wireguard"),
            egress_interface: "eth0".to_string(),
            pre_up: None,
            post_up: None,
            pre_down: None,
            post_down: None,
        }
    }
}

impl WireguardConfig {
    pub fn pre_up_script(&self) -> String {
        self.pre_up.as_deref().map(one_line).unwrap_or_default()
    }

    pub fn post_up_script(&self) -> String {
        match &self.post_up {
            Some(script) => one_line(script),
            None => one_line(&self.default_rules("-A")),
        }
    }

    pub fn pre_down_script(&self) -> String {
        self.pre_down.as_deref().map(one_line).unwrap_or_default()
    }

    pub fn post_down_script(&self) -> String {
        match &self.post_down {
            Some(script) => one_line(script),
            None => one_line(&self.default_rules("-D")),
        }
    }

    fn default_rules(&self, action: &str) -> String {
        let iface = &self.interface;
        format!(
            "\niptables -t nat {action} POSTROUTING -s {subnet} -o {egress} -j MASQUERADE;\n\
             iptables {action} INPUT -p udp -m udp --dport {port} -j ACCEPT;\n\
             iptables {action} FORWARD -i {iface} -j ACCEPT;\n\
             iptables {action} FORWARD -o {iface} -j ACCEPT;\n",
            subnet = self.subnet,
            egress = self.egress_interface,
            port = self.port,
        )
    }
}

/// Scripts are stored on a single line in the interface config.
fn one_line(script: &str) -> String {
    script.split('\n').collect::<Vec<_>>().join(" ")
}

/// nginx layout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NginxConfig {
    /// nginx configuration root; `conf.d`, `locations` and `stream.d` live here.
    pub root: PathBuf,

    /// Static fallback pages served at a domain's `/` location.
    pub default_pages: PathBuf,

    /// Per-domain access/error logs.
    pub logs_dir: PathBuf,

    /// `client_max_body_size` for HTTP locations.
    pub client_max_body_size: String,

    /// nginx binary.
    pub binary: String,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/etc/nginx"),
            default_pages: PathBuf::from("/etc/nginx/default_pages"),
            logs_dir: PathBuf::from("/var/log/nginx"),
            client_max_body_size: "100m".to_string(),
            binary: "nginx".to_string(),
        }
    }
}

/// Certificate provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SslConfig {
    /// Self-signed certificates, one directory per domain.
    pub self_signed_dir: PathBuf,

    /// Certbot live directory.
    pub letsencrypt_dir: PathBuf,

    /// ACME webroot.
    pub webroot: PathBuf,

    pub openssl_conf: PathBuf,

    /// Directory nginx reads the default certificate pair from.
    pub nginx_ssl_dir: PathBuf,

    /// Registration email for certbot.
    pub admin_email: Option<String>,
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            self_signed_dir: PathBuf::from("/data/ssl"),
            letsencrypt_dir: PathBuf::from("/etc/letsencrypt/live"),
            webroot: PathBuf::from("/var/www/letsencrypt"),
            openssl_conf: PathBuf::from("/etc/openssl/openssl.cnf"),
            nginx_ssl_dir: PathBuf::from("/etc/nginx/ssl"),
            admin_email: None,
        }
    }
}

/// TCP service exposure.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServicesConfig {
    /// Public port range, "min-max" or a single port.
    pub port_range: Option<String>,
}

/// OAuth2 gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuth2Config {
    pub provider: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    /// Forward X-User / X-Email from the auth request.
    pub set_xauthrequest: bool,

    /// Forward X-Access-Token from the auth request.
    pub pass_access_token: bool,

    /// Local port range for per-domain oauth2-proxy processes.
    pub port_min: u16,
    pub port_max: u16,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            provider: None,
            client_id: None,
            client_secret: None,
            set_xauthrequest: false,
            pass_access_token: false,
            port_min: 4180,
            port_max: 5180,
        }
    }
}

impl OAuth2Config {
    /// Whether the provider credentials needed to gate a domain are present.
    pub fn is_configured(&self) -> bool {
        [&self.provider, &self.client_id, &self.client_secret]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Socket probe timeouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Backend reachability probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Local port probe timeout in milliseconds.
    pub local_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            local_timeout_ms: 500,
        }
    }
}

/// TTL expiry sweep.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// Node reachability monitor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,

    /// Ping interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin surface.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Persistence snapshot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot written after every mutation. `None` keeps state in memory only.
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("/data/gatewire.json")),
        }
    }
}
