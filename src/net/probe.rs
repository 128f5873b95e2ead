//! Socket reachability probes and DNS helpers.
//!
//! # Responsibilities
//! - Bounded TCP connect, optionally followed by a TLS handshake
//! - Name resolution through a caller-chosen nameserver (gateway-scoped DNS)
//! - Checking whether a public name already points at this server

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Where and how to probe.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,

    /// Nameserver used when `host` is not an IP literal.
    pub resolver: Option<IpAddr>,
    pub tls: bool,
    pub timeout: Duration,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            resolver: None,
            tls: false,
            timeout,
        }
    }

    pub fn resolver(mut self, resolver: Option<IpAddr>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }
}

/// Whether `host` is an IP literal.
pub fn is_ip(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}

/// Try to open a connection to the target within its timeout.
pub async fn probe_tcp_connect(target: &ProbeTarget) -> bool {
    match tokio::time::timeout(target.timeout, connect(target)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(host = %target.host, port = target.port, error = %e, "Probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(
                host = %target.host,
                port = target.port,
                timeout_ms = target.timeout.as_millis() as u64,
                "Probe timed out"
            );
            false
        }
    }
}

async fn connect(target: &ProbeTarget) -> io::Result<()> {
    let ip = resolve_host(&target.host, target.resolver).await?;
    let stream = TcpStream::connect((ip, target.port)).await?;

    if target.tls {
        let connector = TlsConnector::from(Arc::new(insecure_client_config()?));
        let server_name = ServerName::try_from(target.host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        connector.connect(server_name, stream).await?;
    }
    Ok(())
}

/// Resolve `host` to one address, through `nameserver` when given.
pub async fn resolve_host(host: &str, nameserver: Option<IpAddr>) -> io::Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let not_found = || io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", host));

    match nameserver {
        Some(ns) => {
            let config = ResolverConfig::from_parts(
                None,
                vec![],
                NameServerConfigGroup::from_ips_clear(&[ns], 53, true),
            );
            let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
            let lookup = resolver
                .lookup_ip(host)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
            lookup.iter().next().ok_or_else(not_found)
        }
        None => tokio::net::lookup_host((host, 0))
            .await?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(not_found),
    }
}

/// All addresses `host` resolves to via the system resolver.
pub async fn lookup_all(host: &str) -> io::Result<Vec<IpAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    Ok(tokio::net::lookup_host((host, 0))
        .await?
        .map(|addr| addr.ip())
        .collect())
}

/// Whether public DNS for `domain` already includes the address of `host`.
pub async fn domain_points_to(domain: &str, host: &str) -> bool {
    let (domain_ips, host_ips) = match tokio::join!(lookup_all(domain), lookup_all(host)) {
        (Ok(d), Ok(h)) => (d, h),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(domain, host, error = %e, "DNS lookup failed");
            return false;
        }
    };
    domain_ips.iter().any(|ip| host_ips.contains(ip))
}

fn insecure_client_config() -> io::Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();
    Ok(config)
}

/// Backends are reached over the mesh with self-signed certificates; the
/// probe only checks that a handshake completes.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let target = ProbeTarget::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(probe_tcp_connect(&target).await);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = ProbeTarget::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(!probe_tcp_connect(&target).await);
    }

    #[tokio::test]
    async fn test_tls_probe_fails_against_plain_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // accept and immediately close
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let target = ProbeTarget::new("127.0.0.1", port, Duration::from_secs(1)).tls(true);
        assert!(!probe_tcp_connect(&target).await);
    }

    #[test]
    fn test_is_ip() {
        assert!(is_ip("10.0.0.5"));
        assert!(is_ip("::1"));
        assert!(!is_ip("db.internal"));
    }

    #[tokio::test]
    async fn test_resolve_ip_literal_skips_dns() {
        let ip = resolve_host("172.8.0.7", Some("10.0.0.2".parse().unwrap())).await.unwrap();
        assert_eq!(ip, "172.8.0.7".parse::<IpAddr>().unwrap());
    }
}
