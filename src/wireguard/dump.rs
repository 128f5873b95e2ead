//! `wg show <iface> dump` parsing.

use std::net::SocketAddr;

use serde::Serialize;

/// One peer line of the runtime dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRuntime {
    pub public_key: String,
    pub preshared_key: String,
    pub endpoint: Option<String>,

    /// Host part of `endpoint`.
    pub client_ip: Option<String>,
    pub allowed_ips: String,

    /// Unix seconds; 0 when no handshake happened.
    pub latest_handshake: u64,
    pub transfer_rx: u64,
    pub transfer_tx: u64,

    /// 0 when keepalive is off.
    pub persistent_keepalive: u16,
}

/// Parse the whole dump. The first line describes the interface itself and
/// is skipped; malformed lines are dropped.
pub fn parse_dump(output: &str) -> Vec<PeerRuntime> {
    output
        .trim()
        .lines()
        .skip(1)
        .filter_map(parse_dump_line)
        .collect()
}

pub fn parse_dump_line(line: &str) -> Option<PeerRuntime> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    if fields.len() < 8 {
        return None;
    }

    let endpoint = match fields[2] {
        "(none)" | "" => None,
        other => Some(other.to_string()),
    };
    let client_ip = endpoint.as_deref().map(endpoint_host);

    Some(PeerRuntime {
        public_key: fields[0].to_string(),
        preshared_key: fields[1].to_string(),
        endpoint,
        client_ip,
        allowed_ips: fields[3].to_string(),
        latest_handshake: fields[4].parse().unwrap_or(0),
        transfer_rx: fields[5].parse().unwrap_or(0),
        transfer_tx: fields[6].parse().unwrap_or(0),
        persistent_keepalive: match fields[7] {
            "off" => 0,
            other => other.parse().unwrap_or(0),
        },
    })
}

fn endpoint_host(endpoint: &str) -> String {
    match endpoint.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => endpoint
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(endpoint)
            .to_string(),
    }
}
