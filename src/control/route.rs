//! `ip route` and `ping` adapter.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use ipnet::Ipv4Net;

use crate::control::command::run;
use crate::control::{CommandError, RouteControl};

#[derive(Debug, Default, Clone)]
pub struct IpRouteCommand;

impl IpRouteCommand {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RouteControl for IpRouteCommand {
    async fn add_route(&self, network: Ipv4Net, via: Ipv4Addr, device: &str) -> Result<(), CommandError> {
        let network = network.to_string();
        let via = via.to_string();
        run("ip", &["route", "add", &network, "via", &via, "dev", device], None).await?;
        Ok(())
    }

    async fn del_route(&self, network: Ipv4Net) -> Result<(), CommandError> {
        run("ip", &["route", "del", &network.to_string()], None).await?;
        Ok(())
    }

    async fn ping(&self, addr: IpAddr) -> Option<f64> {
        let target = addr.to_string();
        match run("ping", &["-q", "-c", "1", "-4", "-s", "8", "-W", "3", &target], None).await {
            Ok(output) => parse_rtt(&output),
            Err(_) => None,
        }
    }
}

/// Average round-trip from ping's summary line
/// (`rtt min/avg/max/mdev = 0.045/0.050/0.055/0.000 ms`).
pub fn parse_rtt(output: &str) -> Option<f64> {
    let line = output
        .lines()
        .find(|l| l.starts_with("rtt") || l.starts_with("round-trip"))?;
    let (_, values) = line.split_once('=')?;
    values.trim().split('/').nth(1)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rtt_linux() {
        let output = "PING 10.0.0.2 (10.0.0.2) 8(36) bytes of data.\n\n\
                      --- 10.0.0.2 ping statistics ---\n\
                      1 packets transmitted, 1 received, 0% packet loss, time 0ms\n\
                      rtt min/avg/max/mdev = 12.345/12.345/12.345/0.000 ms";
        assert_eq!(parse_rtt(output), Some(12.345));
    }

    #[test]
    fn test_parse_rtt_busybox() {
        let output = "round-trip min/avg/max = 0.101/0.202/0.303 ms";
        assert_eq!(parse_rtt(output), Some(0.202));
    }

    #[test]
    fn test_parse_rtt_missing() {
        assert_eq!(parse_rtt("1 packets transmitted, 0 received, 100% packet loss"), None);
    }
}
