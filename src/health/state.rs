//! Last observed reachability of a node.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeHealth {
    pub reachable: bool,

    /// Round trip of the last successful ping.
    pub latency_ms: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

impl NodeHealth {
    pub fn from_ping(latency_ms: Option<f64>, checked_at: DateTime<Utc>) -> Self {
        Self {
            reachable: latency_ms.is_some(),
            latency_ms,
            checked_at,
        }
    }
}
