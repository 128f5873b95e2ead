//! Node-scoped access tokens.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::node::NodeId;

pub type TokenId = u64;

const SECRET_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalAccessToken {
    pub id: TokenId,
    pub node_id: NodeId,
    pub name: String,
    pub secret: String,
    pub revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PersonalAccessToken {
    /// A fresh, unsaved default token for `node_id`.
    pub fn issue(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            node_id,
            name: name.into(),
            secret: generate_secret(),
            revoked: false,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at.map_or(true, |at| at > now)
    }
}

pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}
