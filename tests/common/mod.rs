//! Recording fakes for the control adapters and a temp-dir harness.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use gatewire::config::schema::{NginxConfig, SslConfig, WireguardConfig};
use gatewire::control::{
    CertProvider, CommandError, NetProbe, ProxyControl, RouteControl, WgControl,
};
use gatewire::model::{NewNode, Node, SslMode, SslPair};
use gatewire::net::probe::ProbeTarget;
use gatewire::orchestrator::{Adapters, ControlPlane};
use gatewire::store::MemoryStore;
use gatewire::GatewireConfig;

/// Text that makes the fake nginx reject the tree.
pub const INVALID_MARKER: &str = "invalid";

fn failed(cmd: &str, stderr: &str) -> CommandError {
    CommandError::Failed {
        cmd: cmd.to_string(),
        args: String::new(),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

#[derive(Default)]
pub struct FakeWg {
    keys: AtomicUsize,
    pub syncs: AtomicUsize,
    pub ups: AtomicUsize,
    pub downs: AtomicUsize,
    pub fail_sync: AtomicBool,
    pub dump: Mutex<Option<String>>,
}

#[async_trait]
impl WgControl for FakeWg {
    async fn gen_private_key(&self) -> Result<String, CommandError> {
        Ok(format!("priv{}", self.keys.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn public_key(&self, private_key: &str) -> Result<String, CommandError> {
        Ok(private_key.replace("priv", "pub"))
    }

    async fn gen_preshared_key(&self) -> Result<String, CommandError> {
        Ok(format!("psk{}", self.keys.load(Ordering::SeqCst)))
    }

    async fn sync_conf(&self, _interface: &str) -> Result<(), CommandError> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(failed("wg", "syncconf failed"));
        }
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn quick_up(&self, _interface: &str) -> Result<(), CommandError> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn quick_down(&self, _interface: &str) -> Result<(), CommandError> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dump(&self, _interface: &str) -> Result<String, CommandError> {
        self.dump
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| failed("wg", "Unable to access interface: No such device"))
    }
}

/// Rejects the tree when any active `.conf` file contains [`INVALID_MARKER`].
pub struct FakeNginx {
    root: PathBuf,
    pub tests: AtomicUsize,
    pub reloads: AtomicUsize,
}

impl FakeNginx {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            tests: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

fn active_confs(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            active_confs(&path, out);
        } else if path.extension().is_some_and(|e| e == "conf") {
            out.push(path);
        }
    }
}

#[async_trait]
impl ProxyControl for FakeNginx {
    async fn test_config(&self) -> Result<(), CommandError> {
        self.tests.fetch_add(1, Ordering::SeqCst);
        let mut files = Vec::new();
        active_confs(&self.root, &mut files);
        for file in files {
            let content = std::fs::read_to_string(&file).unwrap_or_default();
            if content.contains(INVALID_MARKER) {
                return Err(failed("nginx", &format!("invalid directive in {}", file.display())));
            }
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), CommandError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRoutes {
    pub routes: Mutex<Vec<(Ipv4Net, Ipv4Addr)>>,
}

impl FakeRoutes {
    pub fn current(&self) -> Vec<(Ipv4Net, Ipv4Addr)> {
        self.routes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RouteControl for FakeRoutes {
    async fn add_route(&self, network: Ipv4Net, via: Ipv4Addr, _device: &str) -> Result<(), CommandError> {
        let mut routes = self.routes.lock().unwrap();
        if routes.iter().any(|(n, _)| *n == network) {
            return Err(failed("ip", "RTNETLINK answers: File exists"));
        }
        routes.push((network, via));
        Ok(())
    }

    async fn del_route(&self, network: Ipv4Net) -> Result<(), CommandError> {
        self.routes.lock().unwrap().retain(|(n, _)| *n != network);
        Ok(())
    }

    async fn ping(&self, _addr: IpAddr) -> Option<f64> {
        None
    }
}

pub struct FakeCerts {
    dir: PathBuf,
    pub issued: Mutex<Vec<(String, SslMode)>>,
    pub removed: Mutex<Vec<String>>,
}

impl FakeCerts {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            issued: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CertProvider for FakeCerts {
    fn ssl_pair(&self, domain: Option<&str>, mode: SslMode) -> SslPair {
        let dir = match (domain, mode) {
            (None, _) => self.dir.join("default"),
            (Some(d), SslMode::SelfSigned) => self.dir.join(d),
            (Some(d), SslMode::Certbot) => self.dir.join("live").join(d),
        };
        SslPair {
            cert: dir.join("cert.crt"),
            key: dir.join("privkey.key"),
        }
    }

    async fn certificates(&self, domain: &str, mode: SslMode) -> Result<SslPair, CommandError> {
        self.issued.lock().unwrap().push((domain.to_string(), mode));
        Ok(self.ssl_pair(Some(domain), mode))
    }

    async fn default_certificates(&self) -> Result<SslPair, CommandError> {
        Ok(self.ssl_pair(None, SslMode::SelfSigned))
    }

    async fn remove(&self, domain: &str, _mode: SslMode) -> Result<(), CommandError> {
        self.removed.lock().unwrap().push(domain.to_string());
        Ok(())
    }
}

/// Every target is reachable unless its port is listed; only the listed
/// domains point at this server.
#[derive(Default)]
pub struct FakeProbe {
    pub closed_ports: Mutex<HashSet<u16>>,
    pub local_domains: Mutex<HashSet<String>>,
    pub probed: Mutex<Vec<(String, u16)>>,
}

impl FakeProbe {
    pub fn close(&self, port: u16) {
        self.closed_ports.lock().unwrap().insert(port);
    }
}

#[async_trait]
impl NetProbe for FakeProbe {
    async fn reachable(&self, target: &ProbeTarget) -> bool {
        self.probed
            .lock()
            .unwrap()
            .push((target.host.clone(), target.port));
        !self.closed_ports.lock().unwrap().contains(&target.port)
    }

    async fn points_to(&self, domain: &str, _host: &str) -> bool {
        self.local_domains.lock().unwrap().contains(domain)
    }
}

/// A bootstrapped control plane over fakes, rooted in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub plane: Arc<ControlPlane>,
    pub store: Arc<MemoryStore>,
    pub wg: Arc<FakeWg>,
    pub nginx: Arc<FakeNginx>,
    pub routes: Arc<FakeRoutes>,
    pub certs: Arc<FakeCerts>,
    pub probe: Arc<FakeProbe>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut GatewireConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut config = GatewireConfig::default();
        config.wireguard = WireguardConfig {
            host: "203.0.113.10".into(),
            config_dir: root.join("wireguard"),
            ..WireguardConfig::default()
        };
        config.nginx = NginxConfig {
            root: root.join("nginx"),
            default_pages: root.join("pages"),
            logs_dir: root.join("logs"),
            ..NginxConfig::default()
        };
        config.ssl = SslConfig {
            self_signed_dir: root.join("ssl"),
            nginx_ssl_dir: root.join("nginx").join("ssl"),
            ..SslConfig::default()
        };
        config.services.port_range = Some("15000-15010".into());
        config.store.path = None;
        customize(&mut config);

        let store = Arc::new(MemoryStore::new());
        let wg = Arc::new(FakeWg::default());
        let nginx = Arc::new(FakeNginx::new(&config.nginx.root));
        let routes = Arc::new(FakeRoutes::default());
        let certs = Arc::new(FakeCerts::new(&root.join("certs")));
        let probe = Arc::new(FakeProbe::default());

        let adapters = Adapters {
            wg: wg.clone(),
            proxy: nginx.clone(),
            routes: routes.clone(),
            certs: certs.clone(),
            probe: probe.clone(),
        };
        let plane = Arc::new(ControlPlane::new(config, store.clone(), adapters));
        plane.bootstrap().await.unwrap();

        Self {
            dir,
            plane,
            store,
            wg,
            nginx,
            routes,
            certs,
            probe,
        }
    }

    pub fn nginx_root(&self) -> PathBuf {
        self.dir.path().join("nginx")
    }

    pub fn nginx_file(&self, relative: &str) -> PathBuf {
        self.nginx_root().join(relative)
    }

    pub fn read_nginx(&self, relative: &str) -> String {
        std::fs::read_to_string(self.nginx_file(relative))
            .unwrap_or_else(|e| panic!("{}: {}", relative, e))
    }

    pub fn wg_conf(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("wireguard").join("wg0.conf")).unwrap()
    }

    /// Every file under the nginx root with its content, sorted by path.
    pub fn nginx_tree(&self) -> Vec<(PathBuf, String)> {
        let mut files = Vec::new();
        collect(&self.nginx_root(), &mut files);
        files.sort();
        files
            .into_iter()
            .map(|p| {
                let content = std::fs::read_to_string(&p).unwrap();
                (p, content)
            })
            .collect()
    }

    pub async fn managed_node(&self, name: &str, address: Ipv4Addr) -> Node {
        self.plane
            .create_node(NewNode {
                address: Some(address),
                ..NewNode::named(name)
            })
            .await
            .unwrap()
    }

    pub async fn gateway_node(&self, name: &str, network: &str) -> Node {
        self.plane
            .create_node(NewNode::gateway(name, network.parse().unwrap()))
            .await
            .unwrap()
    }
}

fn collect(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, out);
        } else {
            out.push(path);
        }
    }
}

/// Start a backend answering every request with `status`. Returns its port.
pub async fn start_http_backend(status: u16) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let reason = if status < 400 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    status, reason
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    port
}
