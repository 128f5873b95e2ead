//! On-disk layout of generated nginx files.

use std::path::{Path, PathBuf};

use crate::config::schema::NginxConfig;
use crate::nginx::block::location_slug;

/// Directory name used when a service or log has no domain.
pub const DEFAULT_SCOPE: &str = "default";

#[derive(Debug, Clone)]
pub struct NginxLayout {
    root: PathBuf,
    logs_dir: PathBuf,
    default_pages: PathBuf,
}

impl NginxLayout {
    pub fn new(config: &NginxConfig) -> Self {
        Self {
            root: config.root.clone(),
            logs_dir: config.logs_dir.clone(),
            default_pages: config.default_pages.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_pages(&self) -> &Path {
        &self.default_pages
    }

    /// `<root>/conf.d/<domain>.conf`
    pub fn server_file(&self, domain: &str) -> PathBuf {
        self.root.join("conf.d").join(format!("{}.conf", domain))
    }

    /// `<root>/locations/<domain or default>`
    pub fn location_dir(&self, domain: Option<&str>) -> PathBuf {
        self.root.join("locations").join(scope(domain))
    }

    /// `<root>/locations/<domain or default>/<slug>.conf`
    pub fn location_file(&self, domain: Option<&str>, path: &str) -> PathBuf {
        self.location_dir(domain)
            .join(format!("{}.conf", location_slug(path)))
    }

    /// `<root>/stream.d/<identifier>.conf`
    pub fn stream_file(&self, identifier: &str) -> PathBuf {
        self.root.join("stream.d").join(format!("{}.conf", identifier))
    }

    /// Include glob written into a domain's server block, relative to the root.
    pub fn locations_include(&self, domain: &str) -> String {
        format!("locations/{}/*.conf", domain)
    }

    pub fn log_dir(&self, domain: Option<&str>) -> PathBuf {
        self.logs_dir.join(scope(domain))
    }

    pub fn log_file(&self, domain: Option<&str>, name: &str) -> PathBuf {
        self.log_dir(domain).join(name)
    }
}

fn scope(domain: Option<&str>) -> &str {
    match domain {
        Some(d) if !d.is_empty() && d != "_" => d,
        _ => DEFAULT_SCOPE,
    }
}

/// Path of the quarantined copy of a config file.
pub fn quarantine_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".err");
    PathBuf::from(name)
}
