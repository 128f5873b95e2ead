//! Address and port allocation.
//!
//! # Responsibilities
//! - Pick the first free mesh address in a subnet
//! - Pick the first free port in a range, optionally confirming with a live probe
//! - Parse the configured TCP service port range
//!
//! Allocation reads a caller-supplied busy set and never reserves anything; the
//! store's uniqueness constraints settle races between concurrent creates.

use std::collections::HashSet;
use std::future::Future;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("No addresses available in {0}")]
    NoAddressAvailable(Ipv4Net),

    #[error("No ports available in range from {min} to {max}")]
    NoPortsAvailable { min: u16, max: u16 },

    #[error("Your servers needs TCP_SERVICES_PORT_RANGE env variable defined.")]
    PortRangeUnset,

    #[error("Invalid port range '{0}', expected MIN-MAX")]
    InvalidPortRange(String),
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self, AllocError> {
        if min == 0 || min > max {
            return Err(AllocError::InvalidPortRange(format!("{}-{}", min, max)));
        }
        Ok(Self { min, max })
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            usize::from(self.max - self.min) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    fn exhausted(&self) -> AllocError {
        AllocError::NoPortsAvailable {
            min: self.min,
            max: self.max,
        }
    }
}

impl FromStr for PortRange {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AllocError::InvalidPortRange(s.to_string());
        let (min, max) = match s.trim().split_once('-') {
            Some((min, max)) => (min.trim(), max.trim()),
            None => (s.trim(), s.trim()),
        };
        let min = min.parse().map_err(|_| invalid())?;
        let max = max.parse().map_err(|_| invalid())?;
        PortRange::new(min, max).map_err(|_| invalid())
    }
}

/// First free host address in `subnet`, scanning network+2 up to broadcast-1.
///
/// network+1 is reserved for the interface itself.
pub fn allocate_address(subnet: Ipv4Net, busy: &HashSet<Ipv4Addr>) -> Option<Ipv4Addr> {
    let first = u32::from(subnet.network()).checked_add(2)?;
    let last = u32::from(subnet.broadcast()).checked_sub(1)?;
    (first..=last).map(Ipv4Addr::from).find(|addr| !busy.contains(addr))
}

/// First port in `range` not present in `busy`.
pub fn allocate_port_in_range(range: PortRange, busy: &HashSet<u16>) -> Result<u16, AllocError> {
    if busy.len() >= range.len() {
        return Err(range.exhausted());
    }
    (range.min..=range.max)
        .find(|port| !busy.contains(port))
        .ok_or_else(|| range.exhausted())
}

/// Like [`allocate_port_in_range`], but a port is only taken when `in_use`
/// reports nothing listening on it.
pub async fn allocate_probed_port<F, Fut>(
    range: PortRange,
    busy: &HashSet<u16>,
    mut in_use: F,
) -> Result<u16, AllocError>
where
    F: FnMut(u16) -> Fut,
    Fut: Future<Output = bool>,
{
    if busy.len() >= range.len() {
        return Err(range.exhausted());
    }
    for port in range.min..=range.max {
        if busy.contains(&port) {
            continue;
        }
        if !in_use(port).await {
            return Ok(port);
        }
        tracing::debug!(port, "Port unreferenced but live, skipping");
    }
    Err(range.exhausted())
}
