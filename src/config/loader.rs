//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewireConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: String, message: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, message } => write!(f, "Invalid {}: {}", var, message),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file, then apply environment
/// overrides.
pub fn load_config(path: &Path) -> Result<GatewireConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: GatewireConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Configuration built from defaults and the environment only.
pub fn load_from_env() -> Result<GatewireConfig, ConfigError> {
    let mut config = GatewireConfig::default();
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay deployment variables on top of file values.
///
/// `lookup` is injected so tests don't have to mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut GatewireConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("VPN_HOST") {
        config.wireguard.host = host;
    }
    if let Some(port) = lookup("VPN_PORT") {
        config.wireguard.port = parse_var("VPN_PORT", &port)?;
    }
    if let Some(subnet) = lookup("VPN_SUBNET") {
        config.wireguard.subnet = parse_var("VPN_SUBNET", &subnet)?;
    }
    if let Some(range) = lookup("TCP_SERVICES_PORT_RANGE") {
        config.services.port_range = Some(range);
    }
    if let Some(dir) = lookup("SERVER_LOGS_DIR") {
        config.nginx.logs_dir = dir.into();
    }
    if let Some(port) = lookup("APP_PORT") {
        config.app.port = parse_var("APP_PORT", &port)?;
    }
    if let Some(provider) = lookup("OAUTH2_PROXY_PROVIDER") {
        config.oauth2.provider = Some(provider);
    }
    if let Some(id) = lookup("OAUTH2_PROXY_CLIENT_ID") {
        config.oauth2.client_id = Some(id);
    }
    if let Some(secret) = lookup("OAUTH2_PROXY_CLIENT_SECRET") {
        config.oauth2.client_secret = Some(secret);
    }
    if let Some(flag) = lookup("OAUTH2_PROXY_SET_XAUTHREQUEST") {
        config.oauth2.set_xauthrequest = parse_flag(&flag);
    }
    if let Some(flag) = lookup("OAUTH2_PROXY_PASS_ACCESS_TOKEN") {
        config.oauth2.pass_access_token = parse_flag(&flag);
    }
    Ok(())
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        message: e.to_string(),
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = GatewireConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("VPN_HOST", "vpn.example.com"),
                ("VPN_PORT", "51000"),
                ("VPN_SUBNET", "10.9.0.0/16"),
                ("TCP_SERVICES_PORT_RANGE", "15000-15010"),
                ("OAUTH2_PROXY_SET_XAUTHREQUEST", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.wireguard.host, "vpn.example.com");
        assert_eq!(config.wireguard.port, 51000);
        assert_eq!(config.wireguard.subnet.to_string(), "10.9.0.0/16");
        assert_eq!(config.services.port_range.as_deref(), Some("15000-15010"));
        assert!(config.oauth2.set_xauthrequest);
        assert!(!config.oauth2.pass_access_token);
    }

    #[test]
    fn test_bad_env_value_names_variable() {
        let mut config = GatewireConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("VPN_PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "VPN_PORT"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[wireguard]\nhost = \"vpn.example.com\"\n\n[services]\nport_range = \"15000-15100\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.wireguard.port, 51820);
        assert_eq!(config.services.port_range.as_deref(), Some("15000-15100"));
    }

    #[test]
    fn test_load_config_rejects_invalid_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[services]\nport_range = \"20-10\"").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
