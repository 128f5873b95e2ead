//! HTTP `location` blocks.

use std::net::Ipv4Addr;
use std::path::Path;

use crate::config::schema::OAuth2Config;
use crate::model::{AccessRules, BackendProto, HttpService, Node};
use crate::net::probe::is_ip;
use crate::nginx::block::NginxConf;

/// Where the proxy sends traffic for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub host: String,

    /// Set when the host must be resolved by the gateway's own DNS.
    pub resolver: Option<Ipv4Addr>,
}

impl Backend {
    /// Gateways forward to the declared backend host; every other node is
    /// reached at its mesh address.
    pub fn for_node(node: &Node, backend_host: &str) -> Self {
        if node.is_gateway() && !backend_host.is_empty() {
            let resolver = if is_ip(backend_host) { None } else { Some(node.address) };
            Self {
                host: backend_host.to_string(),
                resolver,
            }
        } else {
            Self {
                host: node.address.to_string(),
                resolver: None,
            }
        }
    }
}

/// Header propagation from the OAuth2 auth request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthHeaders {
    pub user_and_email: bool,
    pub access_token: bool,
}

impl From<&OAuth2Config> for AuthHeaders {
    fn from(config: &OAuth2Config) -> Self {
        Self {
            user_and_email: config.set_xauthrequest,
            access_token: config.pass_access_token,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationOptions {
    pub client_max_body_size: String,
    pub auth: AuthHeaders,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            client_max_body_size: "100m".to_string(),
            auth: AuthHeaders::default(),
        }
    }
}

/// Builder for the body of a `location` block.
#[derive(Debug, Default)]
pub struct LocationBlock {
    conf: NginxConf,
}

impl LocationBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access(&mut self, rules: &AccessRules) -> &mut Self {
        self.conf.access_rules(rules);
        self
    }

    pub fn resolver(&mut self, nameserver: Ipv4Addr) -> &mut Self {
        self.conf
            .add("resolver", format!("{} valid=30s", nameserver))
            .add("resolver_timeout", "10s");
        self
    }

    pub fn client_max_body_size(&mut self, size: &str) -> &mut Self {
        self.conf.add("client_max_body_size", size);
        self
    }

    pub fn auth_required(&mut self, headers: AuthHeaders) -> &mut Self {
        self.conf.add("include", "partials/require_oauth2.conf");
        if headers.user_and_email {
            self.conf
                .add("auth_request_set $user", "$upstream_http_x_auth_request_user")
                .add("auth_request_set $email", "$upstream_http_x_auth_request_email")
                .add("proxy_set_header X-User", "$user")
                .add("proxy_set_header X-Email", "$email");
        }
        if headers.access_token {
            self.conf
                .add("auth_request_set $token", "$upstream_http_x_auth_request_access_token")
                .add("proxy_set_header X-Access-Token", "$token");
        }
        self
    }

    /// `set $<var> <value>`
    pub fn bind(&mut self, var: &str, value: &str) -> &mut Self {
        self.conf.add(format!("set ${}", var), value);
        self
    }

    pub fn proxy_pass(&mut self, target: &str) -> &mut Self {
        self.conf
            .add("proxy_pass", target)
            .add("include", "partials/proxy.conf");
        self
    }

    pub fn proxy_ssl_verify(&mut self, verify: bool) -> &mut Self {
        self.conf.add("proxy_ssl_verify", if verify { "on" } else { "off" });
        self
    }

    pub fn root(&mut self, path: &Path) -> &mut Self {
        self.conf.add("root", path.to_string_lossy());
        self
    }

    /// The complete `location <path> { ... }` file content.
    pub fn into_location(self, path: &str) -> NginxConf {
        self.conf.wrap(format!("location {}", path))
    }
}

/// Location publishing an HTTP service.
pub fn service_location(service: &HttpService, node: &Node, options: &LocationOptions) -> NginxConf {
    let identifier = service.identifier();
    let backend = Backend::for_node(node, &service.backend_host);

    let mut location = LocationBlock::new();
    location.access(&service.access);
    if let Some(nameserver) = backend.resolver {
        location.resolver(nameserver);
    }
    location.client_max_body_size(&options.client_max_body_size);
    if service.require_auth {
        location.auth_required(options.auth);
    }
    location.bind(&identifier, &backend.host).proxy_pass(&format!(
        "{}://${}:{}",
        service.backend_proto, identifier, service.backend_port
    ));
    if service.backend_proto == BackendProto::Https {
        location.proxy_ssl_verify(false);
    }
    location.into_location(&service.path_location)
}

/// Static fallback served at a domain's `/` until a service claims it.
pub fn default_main_location(default_pages: &Path) -> NginxConf {
    let mut location = LocationBlock::new();
    location.root(default_pages);
    location.into_location("/")
}
