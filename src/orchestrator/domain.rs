//! Domain lifecycle.
//!
//! # Responsibilities
//! - Create domains explicitly or lazily on first reference by a service
//! - Pick certbot when public DNS already points here, self-signed otherwise
//! - Allocate and release the local port of a domain's OAuth2 gate
//! - Keep names immutable once created

use std::collections::HashSet;

use crate::model::domain::{is_valid_domain_name, normalize_domain_name};
use crate::model::{Domain, DomainId, DomainUpdate, NewDomain, OAuthGate, SslMode};
use crate::net::allocator::{allocate_probed_port, PortRange};
use crate::net::probe::ProbeTarget;
use crate::orchestrator::{ControlError, ControlPlane};

const OAUTH_NOT_CONFIGURED: &str = "OAuth2 authentication cannot be enabled: required environment variables are missing. Please define OAUTH2_PROXY_PROVIDER, OAUTH2_PROXY_CLIENT_ID, and OAUTH2_PROXY_CLIENT_SECRET and restart the server.";

const RENAME_FORBIDDEN: &str =
    "Domain names can't be changed. Add a new one and delete this one instead.";

/// The domain a service refers to, in canonical form. Blank means none.
pub(super) fn service_domain(domain: Option<String>) -> Result<Option<String>, ControlError> {
    let Some(name) = domain.map(|d| normalize_domain_name(&d)).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if !is_valid_domain_name(&name) {
        return Err(ControlError::validation(
            "domain",
            format!("{} is not a valid domain name", name),
        ));
    }
    Ok(Some(name))
}

impl ControlPlane {
    pub async fn get_domain(&self, id: DomainId) -> Result<Domain, ControlError> {
        self.store
            .domain(id)
            .await?
            .ok_or(ControlError::NotFound("Domain"))
    }

    pub async fn domains(&self) -> Result<Vec<Domain>, ControlError> {
        Ok(self.store.domains().await?)
    }

    /// The existing record for `name`, or a new one written without reload.
    pub async fn create_domain_if_not_exists(&self, name: &str) -> Result<Domain, ControlError> {
        if let Some(domain) = self.store.domain_by_name(name).await? {
            return Ok(domain);
        }

        let ssl = if self.probe.points_to(name, &self.config.wireguard.host).await {
            SslMode::Certbot
        } else {
            SslMode::SelfSigned
        };
        tracing::info!(domain = name, ssl = ?ssl, "Creating domain on first use");

        self.create_domain_with(
            NewDomain {
                domain: name.to_string(),
                ssl: Some(ssl),
                ..Default::default()
            },
            false,
        )
        .await
    }

    pub async fn create_domain(&self, new: NewDomain) -> Result<Domain, ControlError> {
        self.create_domain_with(new, true).await
    }

    async fn create_domain_with(&self, new: NewDomain, restart: bool) -> Result<Domain, ControlError> {
        let name = normalize_domain_name(&new.domain);
        if !is_valid_domain_name(&name) {
            return Err(ControlError::validation(
                "domain",
                format!("{} is not a valid domain name", name),
            ));
        }
        if self.store.domain_by_name(&name).await?.is_some() {
            return Err(ControlError::validation("domain", "Domain already exists"));
        }

        let oauth = if new.authentication {
            Some(OAuthGate {
                port: self.allocate_oauth_port().await?,
                allowed_emails: new.allowed_emails,
            })
        } else {
            None
        };

        let ssl = match new.ssl {
            Some(ssl) => ssl,
            None if self.probe.points_to(&name, &self.config.wireguard.host).await => SslMode::Certbot,
            None => SslMode::SelfSigned,
        };
        let ssl_pair = self.certs.certificates(&name, ssl).await?;

        let domain = self
            .store
            .insert_domain(Domain {
                id: 0,
                domain: name,
                ssl,
                ssl_pair,
                oauth,
            })
            .await?;

        self.proxy.add_domain_server(&domain, restart).await?;
        Ok(domain)
    }

    pub async fn update_domain(&self, id: DomainId, update: DomainUpdate) -> Result<Domain, ControlError> {
        let old = self.get_domain(id).await?;

        if let Some(name) = &update.domain {
            if !name.eq_ignore_ascii_case(&old.domain) {
                return Err(ControlError::validation("domain", RENAME_FORBIDDEN));
            }
        }

        let mut next = old.clone();
        if let Some(ssl) = update.ssl {
            if ssl != old.ssl {
                next.ssl_pair = self.certs.certificates(&old.domain, ssl).await?;
                next.ssl = ssl;
            }
        }

        let authentication = update.authentication.unwrap_or(old.oauth.is_some());
        next.oauth = if authentication {
            let allowed_emails = update
                .allowed_emails
                .or_else(|| old.oauth.as_ref().map(|o| o.allowed_emails.clone()))
                .unwrap_or_default();
            let port = match &old.oauth {
                Some(gate) => gate.port,
                None => self.allocate_oauth_port().await?,
            };
            Some(OAuthGate { port, allowed_emails })
        } else {
            if let Some(gate) = &old.oauth {
                tracing::info!(domain = %old.domain, port = gate.port, "OAuth2 gate released");
            }
            None
        };

        let domain = self.store.update_domain(next).await?;
        self.proxy.add_domain_server(&domain, true).await?;
        Ok(domain)
    }

    /// Remove a domain with its server block, certificates and logs.
    /// Services published under it keep their records.
    pub async fn delete_domain(&self, id: DomainId) -> Result<(), ControlError> {
        let domain = self.get_domain(id).await?;

        if let Err(e) = self.certs.remove(&domain.domain, domain.ssl).await {
            tracing::warn!(domain = %domain.domain, error = %e, "Failed to remove certificates");
        }
        self.proxy.remove_domain_server(&domain, true).await?;
        self.store.delete_domain(id).await?;
        tracing::info!(domain = %domain.domain, "Domain deleted");
        Ok(())
    }

    /// Local port for a new OAuth2 gate: unreferenced by any domain and
    /// with nothing listening on it.
    async fn allocate_oauth_port(&self) -> Result<u16, ControlError> {
        let oauth2 = &self.config.oauth2;
        if !oauth2.is_configured() {
            return Err(ControlError::validation("authentication", OAUTH_NOT_CONFIGURED));
        }

        let range = PortRange::new(oauth2.port_min, oauth2.port_max)?;
        let busy: HashSet<u16> = self
            .store
            .domains()
            .await?
            .iter()
            .filter_map(|d| d.oauth.as_ref().map(|o| o.port))
            .collect();

        let timeout = self.local_probe_timeout();
        let probe = self.probe.clone();
        let port = allocate_probed_port(range, &busy, |port| {
            let probe = probe.clone();
            async move {
                probe
                    .reachable(&ProbeTarget::new("127.0.0.1", port, timeout))
                    .await
            }
        })
        .await?;
        Ok(port)
    }
}
