//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Verified caller identity, supplied by the authentication layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }

    /// Internal jobs (expiry sweep, auto-approval) act under this identity.
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            display_name: Some("System".to_string()),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.user_id)
    }
}
