//! Public hostnames with their own TLS identity.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub type DomainId = u64;

/// How a domain's certificate is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    SelfSigned,
    Certbot,
}

/// Certificate/key paths as consumed by nginx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// OAuth2 challenge in front of a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthGate {
    /// Local port of the domain's auth proxy process.
    pub port: u16,
    pub allowed_emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub domain: String,
    pub ssl: SslMode,
    pub ssl_pair: SslPair,
    pub oauth: Option<OAuthGate>,
}

/// Input for creating a domain.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewDomain {
    pub domain: String,

    /// Chosen by DNS lookup when `None`.
    pub ssl: Option<SslMode>,
    pub authentication: bool,
    pub allowed_emails: Vec<String>,
}

impl NewDomain {
    pub fn named(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }
}

/// Partial update of a domain.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainUpdate {
    /// Must equal the current name; renames are rejected.
    pub domain: Option<String>,

    /// Switching modes issues a new certificate pair.
    pub ssl: Option<SslMode>,
    pub authentication: Option<bool>,
    pub allowed_emails: Option<Vec<String>>,
}

/// Canonical form of a domain name: trimmed and lowercase. Records, file
/// paths and server blocks all use this form.
pub fn normalize_domain_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Whether `name` looks like a DNS hostname.
pub fn is_valid_domain_name(name: &str) -> bool {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.len() > 253 || !name.contains('.') {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
