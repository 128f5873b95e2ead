//! Write-test-activate protocol for generated nginx files.
//!
//! # Responsibilities
//! - Write one generated file, validate the whole tree, quarantine on failure
//! - Remove files without testing
//! - Reload only when asked, so bulk callers can defer to one final reload
//! - Serialize every apply behind one lock
//!
//! A disabled service has no file at all; `add_*` on one only reloads.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::control::{fs, CommandError, ProxyControl};
use crate::model::{Domain, HttpService, Node, SslPair, TcpService};
use crate::nginx::block::NginxConf;
use crate::nginx::layout::{quarantine_path, NginxLayout};
use crate::nginx::location::{default_main_location, service_location, LocationOptions};
use crate::nginx::server::{domain_server, stream_conf};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The config test failed and the file was moved aside.
    #[error("nginx rejected {}", file.display())]
    Rejected { file: PathBuf },

    #[error("filesystem error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Command(#[from] CommandError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ProxyError + '_ {
    move |source| ProxyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub struct ProxyReconciler {
    control: Arc<dyn ProxyControl>,
    layout: NginxLayout,
    options: LocationOptions,
    apply_lock: Mutex<()>,
}

impl ProxyReconciler {
    pub fn new(control: Arc<dyn ProxyControl>, layout: NginxLayout, options: LocationOptions) -> Self {
        Self {
            control,
            layout,
            options,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &NginxLayout {
        &self.layout
    }

    /// Server block for a domain plus its default `/` page when nothing
    /// else serves `/` yet.
    pub async fn add_domain_server(&self, domain: &Domain, restart: bool) -> Result<(), ProxyError> {
        let _guard = self.apply_lock.lock().await;
        let file = self.layout.server_file(&domain.domain);
        write(&file, &domain_server(domain, &self.layout)).await?;

        let main = self.layout.location_file(Some(&domain.domain), "/");
        if !fs::exists(&main).await {
            write(&main, &default_main_location(self.layout.default_pages())).await?;
        }

        self.check_config(&file, restart).await
    }

    /// Drop a domain's server block, locations and logs.
    pub async fn remove_domain_server(&self, domain: &Domain, restart: bool) -> Result<(), ProxyError> {
        let _guard = self.apply_lock.lock().await;
        let name = Some(domain.domain.as_str());

        let file = self.layout.server_file(&domain.domain);
        fs::remove_file(&file).await.map_err(io_error(&file))?;
        for dir in [self.layout.location_dir(name), self.layout.log_dir(name)] {
            fs::remove_dir(&dir).await.map_err(io_error(&dir))?;
        }

        self.reload_if(restart).await
    }

    pub async fn add_http_service(
        &self,
        service: &HttpService,
        node: &Node,
        restart: bool,
    ) -> Result<(), ProxyError> {
        let _guard = self.apply_lock.lock().await;
        if !service.enabled {
            return self.reload_if(restart).await;
        }

        let file = self
            .layout
            .location_file(service.domain.as_deref(), &service.path_location);
        write(&file, &service_location(service, node, &self.options)).await?;
        self.check_config(&file, restart).await
    }

    pub async fn remove_http_service(&self, service: &HttpService, restart: bool) -> Result<(), ProxyError> {
        let _guard = self.apply_lock.lock().await;
        let file = self
            .layout
            .location_file(service.domain.as_deref(), &service.path_location);
        fs::remove_file(&file).await.map_err(io_error(&file))?;
        self.reload_if(restart).await
    }

    /// `ssl` is the pair the stream terminates TLS with when `service.ssl` is set.
    pub async fn add_tcp_service(
        &self,
        service: &TcpService,
        node: &Node,
        ssl: Option<&SslPair>,
        restart: bool,
    ) -> Result<(), ProxyError> {
        let _guard = self.apply_lock.lock().await;
        if !service.enabled {
            return self.reload_if(restart).await;
        }

        let file = self.layout.stream_file(&service.identifier());
        write(&file, &stream_conf(service, node, ssl, &self.layout)).await?;
        self.check_config(&file, restart).await
    }

    pub async fn remove_tcp_service(&self, service: &TcpService, restart: bool) -> Result<(), ProxyError> {
        let _guard = self.apply_lock.lock().await;
        let file = self.layout.stream_file(&service.identifier());
        fs::remove_file(&file).await.map_err(io_error(&file))?;
        self.reload_if(restart).await
    }

    pub async fn reload(&self) -> Result<(), ProxyError> {
        let _guard = self.apply_lock.lock().await;
        self.reload_if(true).await
    }

    /// Test the whole tree after `file` was written. On failure the file is
    /// renamed to `<file>.err` and nothing is reloaded.
    async fn check_config(&self, file: &Path, restart: bool) -> Result<(), ProxyError> {
        if let Err(e) = self.control.test_config().await {
            metrics::record_config_test(false);
            tracing::error!(file = %file.display(), error = %e, "nginx config test failed, quarantining file");

            let quarantined = quarantine_path(file);
            tokio::fs::rename(file, &quarantined)
                .await
                .map_err(io_error(file))?;
            metrics::record_quarantine();

            return Err(ProxyError::Rejected {
                file: file.to_path_buf(),
            });
        }
        metrics::record_config_test(true);

        self.reload_if(restart).await
    }

    async fn reload_if(&self, restart: bool) -> Result<(), ProxyError> {
        if !restart {
            return Ok(());
        }
        let result = self.control.reload().await;
        metrics::record_reload(result.is_ok());
        result?;
        tracing::debug!("nginx reloaded");
        Ok(())
    }
}

async fn write(file: &Path, conf: &NginxConf) -> Result<(), ProxyError> {
    fs::write_file(file, &conf.render())
        .await
        .map_err(io_error(file))?;
    tracing::debug!(file = %file.display(), "Wrote nginx config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::config::schema::NginxConfig;
    use crate::model::{AccessRules, BackendProto, NodeKind, SslMode};

    #[derive(Default)]
    struct FakeNginx {
        reject: AtomicBool,
        tests: AtomicUsize,
        reloads: AtomicUsize,
    }

    #[async_trait]
    impl ProxyControl for FakeNginx {
        async fn test_config(&self) -> Result<(), CommandError> {
            self.tests.fetch_add(1, Ordering::SeqCst);
            if self.reject.load(Ordering::SeqCst) {
                return Err(CommandError::Failed {
                    cmd: "nginx".into(),
                    args: "-t".into(),
                    status: "exit status: 1".into(),
                    stderr: "emerg".into(),
                });
            }
            Ok(())
        }

        async fn reload(&self) -> Result<(), CommandError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn reconciler(root: &Path) -> (ProxyReconciler, Arc<FakeNginx>) {
        let nginx = Arc::new(FakeNginx::default());
        let config = NginxConfig {
            root: root.join("nginx"),
            logs_dir: root.join("logs"),
            ..NginxConfig::default()
        };
        let reconciler = ProxyReconciler::new(
            nginx.clone(),
            NginxLayout::new(&config),
            LocationOptions::default(),
        );
        (reconciler, nginx)
    }

    fn node() -> Node {
        Node {
            id: 1,
            name: "n".into(),
            interface: "wg0".into(),
            address: Ipv4Addr::new(10, 0, 0, 5),
            private_key: String::new(),
            public_key: String::new(),
            preshared_key: String::new(),
            allow_internet: false,
            kind: NodeKind::Managed,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    fn service() -> HttpService {
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

    #[tokio::test]
    async fn test_add_http_service_writes_tests_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, nginx) = reconciler(dir.path());

        reconciler.add_http_service(&service(), &node(), true).await.unwrap();

        let file = dir.path().join("nginx/locations/default/api.conf");
        assert!(std::fs::read_to_string(file).unwrap().contains("proxy_pass           http://$node1service1:8080;"));
        assert_eq!(nginx.tests.load(Ordering::SeqCst), 1);
        assert_eq!(nginx.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, nginx) = reconciler(dir.path());
        nginx.reject.store(true, Ordering::SeqCst);

        let err = reconciler.add_http_service(&service(), &node(), true).await.unwrap_err();
        assert!(matches!(err, ProxyError::Rejected { .. }));

        let file = dir.path().join("nginx/locations/default/api.conf");
        assert!(!file.exists());
        assert!(dir.path().join("nginx/locations/default/api.conf.err").exists());
        assert_eq!(nginx.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_service_only_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, nginx) = reconciler(dir.path());
        let mut svc = service();
        svc.enabled = false;

        reconciler.add_http_service(&svc, &node(), true).await.unwrap();
        assert!(!dir.path().join("nginx/locations/default/api.conf").exists());
        assert_eq!(nginx.tests.load(Ordering::SeqCst), 0);
        assert_eq!(nginx.reloads.load(Ordering::SeqCst), 1);

        reconciler.add_http_service(&svc, &node(), false).await.unwrap();
        assert_eq!(nginx.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removal_skips_config_test() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, nginx) = reconciler(dir.path());
        reconciler.add_http_service(&service(), &node(), false).await.unwrap();

        reconciler.remove_http_service(&service(), true).await.unwrap();
        assert!(!dir.path().join("nginx/locations/default/api.conf").exists());
        assert_eq!(nginx.tests.load(Ordering::SeqCst), 1);
        assert_eq!(nginx.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_domain_server_keeps_existing_main_location() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, _) = reconciler(dir.path());
        let domain = Domain {
            id: 1,
            domain: "x.example.com".into(),
            ssl: SslMode::SelfSigned,
            ssl_pair: SslPair {
                cert: "/c.crt".into(),
                key: "/k.key".into(),
            },
            oauth: None,
        };

        reconciler.add_domain_server(&domain, false).await.unwrap();
        let main = dir.path().join("nginx/locations/x.example.com/__main.conf");
        assert!(std::fs::read_to_string(&main).unwrap().contains("root /etc/nginx/default_pages;"));
        assert!(dir.path().join("nginx/conf.d/x.example.com.conf").exists());

        let mut root_service = service();
        root_service.domain = Some("x.example.com".into());
        root_service.path_location = "/".into();
        reconciler.add_http_service(&root_service, &node(), false).await.unwrap();
        reconciler.add_domain_server(&domain, false).await.unwrap();
        assert!(std::fs::read_to_string(&main).unwrap().contains("proxy_pass"));

        reconciler.remove_domain_server(&domain, false).await.unwrap();
        assert!(!main.exists());
        assert!(!dir.path().join("nginx/conf.d/x.example.com.conf").exists());
    }
}
