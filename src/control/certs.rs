//! Certificate issuance through openssl and certbot.
//!
//! # Responsibilities
//! - Self-signed pairs under `<self_signed_dir>/<domain>/`
//! - ACME pairs under `<letsencrypt_dir>/<domain>/` via certbot webroot
//! - The default pair, linked into nginx's ssl directory

use std::path::Path;

use async_trait::async_trait;

use crate::config::schema::SslConfig;
use crate::control::command::run;
use crate::control::fs;
use crate::control::{CertProvider, CommandError};
use crate::model::{SslMode, SslPair};

pub struct CommandCertProvider {
    config: SslConfig,
}

impl CommandCertProvider {
    pub fn new(config: SslConfig) -> Self {
        Self { config }
    }

    fn self_signed_pair(&self, dir: &Path) -> SslPair {
        SslPair {
            cert: dir.join("cert.crt"),
            key: dir.join("privkey.key"),
        }
    }

    fn certbot_pair(&self, domain: &str) -> SslPair {
        let dir = self.config.letsencrypt_dir.join(domain);
        SslPair {
            cert: dir.join("fullchain.pem"),
            key: dir.join("privkey.pem"),
        }
    }

    async fn generate_self_signed(&self, dir: &Path, csr_name: &str) -> Result<SslPair, CommandError> {
        let pair = self.self_signed_pair(dir);
        if fs::exists(&pair.cert).await || fs::exists(&pair.key).await {
            return Ok(pair);
        }
        tokio::fs::create_dir_all(dir).await?;

        let key = path_str(&pair.key);
        let cert = path_str(&pair.cert);
        let csr = path_str(&dir.join(csr_name));
        let openssl_conf = path_str(&self.config.openssl_conf);

        run("openssl", &["genpkey", "-algorithm", "RSA", "-out", &key], None).await?;
        run(
            "openssl",
            &["req", "-new", "-key", &key, "-out", &csr, "-config", &openssl_conf],
            None,
        )
        .await?;
        run(
            "openssl",
            &["x509", "-req", "-days", "3650", "-in", &csr, "-signkey", &key, "-out", &cert],
            None,
        )
        .await?;

        tracing::info!(dir = %dir.display(), "Generated self-signed certificate");
        Ok(pair)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl CertProvider for CommandCertProvider {
    fn ssl_pair(&self, domain: Option<&str>, mode: SslMode) -> SslPair {
        match (domain, mode) {
            (None, _) => self.self_signed_pair(&self.config.nginx_ssl_dir),
            (Some(domain), SslMode::SelfSigned) => {
                self.self_signed_pair(&self.config.self_signed_dir.join(domain))
            }
            (Some(domain), SslMode::Certbot) => self.certbot_pair(domain),
        }
    }

    async fn certificates(&self, domain: &str, mode: SslMode) -> Result<SslPair, CommandError> {
        match mode {
            SslMode::SelfSigned => {
                let dir = self.config.self_signed_dir.join(domain);
                self.generate_self_signed(&dir, "gatewire.csr").await
            }
            SslMode::Certbot => {
                let pair = self.certbot_pair(domain);
                if fs::exists(&pair.cert).await || fs::exists(&pair.key).await {
                    return Ok(pair);
                }
                let webroot = path_str(&self.config.webroot);
                let mut args = vec![
                    "certonly",
                    "--non-interactive",
                    "--agree-tos",
                    "--webroot",
                    "-w",
                    webroot.as_str(),
                ];
                match self.config.admin_email.as_deref() {
                    Some(email) => args.extend(["-m", email]),
                    None => args.push("--register-unsafely-without-email"),
                }
                args.extend(["-d", domain]);
                run("certbot", &args, None).await?;
                tracing::info!(domain, "Issued certbot certificate");
                Ok(pair)
            }
        }
    }

    async fn default_certificates(&self) -> Result<SslPair, CommandError> {
        let generated = self
            .generate_self_signed(&self.config.self_signed_dir, "default.csr")
            .await?;
        let linked = self.self_signed_pair(&self.config.nginx_ssl_dir);
        tokio::fs::create_dir_all(&self.config.nginx_ssl_dir).await?;

        for (target, link) in [(&generated.key, &linked.key), (&generated.cert, &linked.cert)] {
            fs::symlink(target, link).await?;
        }
        Ok(linked)
    }

    async fn remove(&self, domain: &str, mode: SslMode) -> Result<(), CommandError> {
        match mode {
            SslMode::SelfSigned => {
                fs::remove_dir(&self.config.self_signed_dir.join(domain)).await?;
            }
            SslMode::Certbot => {
                if fs::exists(&self.certbot_pair(domain).key).await {
                    run("certbot", &["delete", "--cert-name", domain, "-n"], None).await?;
                }
            }
        }
        Ok(())
    }
}
