//! Published services: HTTP locations and TCP/UDP streams.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::node::NodeId;

pub type ServiceId = u64;

/// IP allow/deny lists applied to a published service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRules {
    pub allowed_ips: Vec<String>,
    pub blocked_ips: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProto {
    #[default]
    Http,
    Https,
}

impl fmt::Display for BackendProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendProto::Http => write!(f, "http"),
            BackendProto::Https => write!(f, "https"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProto {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for StreamProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamProto::Tcp => write!(f, "tcp"),
            StreamProto::Udp => write!(f, "udp"),
        }
    }
}

/// A backend published under a domain (or the default server) at a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpService {
    pub id: ServiceId,
    pub name: String,
    pub node_id: NodeId,
    pub domain: Option<String>,
    pub path_location: String,
    pub backend_host: String,
    pub backend_port: u16,
    pub backend_proto: BackendProto,
    pub require_auth: bool,
    pub access: AccessRules,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl HttpService {
    /// Name of the nginx variable bound to the backend host.
    pub fn identifier(&self) -> String {
        format!("node{}service{}", self.node_id, self.id)
    }

    pub fn public_url(&self, vpn_host: &str) -> String {
        let host = self.domain.as_deref().unwrap_or(vpn_host);
        format!("https://{}{}", host, self.path_location)
    }
}

/// Input for creating an HTTP service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewHttpService {
    pub name: String,
    pub domain: Option<String>,

    /// Required when `domain` is unset; defaults to `/` otherwise.
    pub path_location: Option<String>,
    pub backend_host: String,
    pub backend_port: u16,
    pub backend_proto: BackendProto,
    pub require_auth: bool,
    pub access: AccessRules,
    pub enabled: Option<bool>,
    pub ttl: Option<String>,
}

/// Partial update of an HTTP service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpServiceUpdate {
    pub name: Option<String>,
    pub domain: Option<Option<String>>,
    pub path_location: Option<String>,
    pub backend_host: Option<String>,
    pub backend_port: Option<u16>,
    pub backend_proto: Option<BackendProto>,
    pub require_auth: Option<bool>,
    pub access: Option<AccessRules>,
    pub enabled: Option<bool>,

    /// Applied together with `enabled: Some(true)`.
    pub ttl: Option<String>,
}

impl HttpServiceUpdate {
    /// Whether any field beyond name, domain and ACLs is set.
    pub fn touches_restricted(&self) -> bool {
        self.backend_host.is_some()
            || self.backend_port.is_some()
            || self.backend_proto.is_some()
            || self.path_location.is_some()
            || self.require_auth.is_some()
            || self.enabled.is_some()
    }
}

/// A backend published on a dedicated public port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpService {
    pub id: ServiceId,
    pub name: String,
    pub node_id: NodeId,
    pub domain: Option<String>,
    pub proto: StreamProto,
    pub backend_host: String,
    pub backend_port: u16,
    pub port: u16,
    pub ssl: bool,
    pub access: AccessRules,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TcpService {
    /// Upstream name and stream file stem.
    pub fn identifier(&self) -> String {
        format!("n{}s{}_stream", self.node_id, self.id)
    }

    pub fn public_url(&self, vpn_host: &str) -> String {
        let host = self.domain.as_deref().unwrap_or(vpn_host);
        format!("{}://{}:{}", self.proto, host, self.port)
    }
}

/// Input for creating a TCP/UDP service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewTcpService {
    pub name: String,
    pub domain: Option<String>,
    pub proto: StreamProto,
    pub backend_host: String,
    pub backend_port: u16,

    /// Allocated from the configured range when `None`.
    pub port: Option<u16>,
    pub ssl: bool,
    pub access: AccessRules,
    pub enabled: Option<bool>,
    pub ttl: Option<String>,
}

/// Partial update of a TCP/UDP service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TcpServiceUpdate {
    pub name: Option<String>,
    pub domain: Option<Option<String>>,
    pub proto: Option<StreamProto>,
    pub backend_host: Option<String>,
    pub backend_port: Option<u16>,
    pub port: Option<u16>,
    pub ssl: Option<bool>,
    pub access: Option<AccessRules>,
    pub enabled: Option<bool>,
    pub ttl: Option<String>,
}

/// Explicit lookup filter shared by both service kinds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceFilter {
    pub node_id: Option<NodeId>,
    pub domain: Option<String>,
    pub enabled: Option<bool>,
}

impl ServiceFilter {
    pub fn node(node_id: NodeId) -> Self {
        Self {
            node_id: Some(node_id),
            ..Default::default()
        }
    }

    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, node_id: NodeId, domain: Option<&str>, enabled: bool) -> bool {
        if self.node_id.is_some_and(|id| id != node_id) {
            return false;
        }
        if let Some(wanted) = &self.domain {
            if domain != Some(wanted.as_str()) {
                return false;
            }
        }
        if self.enabled.is_some_and(|e| e != enabled) {
            return false;
        }
        true
    }

    pub fn matches_http(&self, service: &HttpService) -> bool {
        self.matches(service.node_id, service.domain.as_deref(), service.enabled)
    }

    pub fn matches_tcp(&self, service: &TcpService) -> bool {
        self.matches(service.node_id, service.domain.as_deref(), service.enabled)
    }
}

/// Normalize a path location to start with a single `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http() -> HttpService {
        HttpService {
            id: 1,
            name: "api".into(),
            node_id: 1,
            domain: None,
            path_location: "/api".into(),
            backend_host: "10.0.0.5".into(),
            backend_port: 8080,
            backend_proto: BackendProto::Http,
            require_auth: false,
            access: AccessRules::default(),
            enabled: true,
            expires_at: None,
        }
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(http().identifier(), "node1service1");

        let tcp = TcpService {
            id: 1,
            name: "mqtt".into(),
            node_id: 2,
            domain: Some("x.example.com".into()),
            proto: StreamProto::Tcp,
            backend_host: "172.8.0.7".into(),
            backend_port: 1883,
            port: 15004,
            ssl: false,
            access: AccessRules::default(),
            enabled: true,
            expires_at: None,
        };
        assert_eq!(tcp.identifier(), "n2s1_stream");
        assert_eq!(tcp.public_url("vpn.example.com"), "tcp://x.example.com:15004");
    }

    #[test]
    fn test_public_url_falls_back_to_vpn_host() {
        assert_eq!(http().public_url("vpn.example.com"), "https://vpn.example.com/api");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("api"), "/api");
        assert_eq!(normalize_path(" /api/v1 "), "/api/v1");
    }

    #[test]
    fn test_service_filter() {
        let service = http();
        assert!(ServiceFilter::node(1).matches_http(&service));
        assert!(!ServiceFilter::node(2).matches_http(&service));
        assert!(!ServiceFilter {
            domain: Some("x.example.com".into()),
            ..Default::default()
        }
        .matches_http(&service));
    }
}
