use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// What an identity may do over the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access.
    #[default]
    Viewer,
    /// May also start and cancel runs.
    Operator,
}

impl Role {
    pub fn can_mutate(self) -> bool {
        self == Role::Operator
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Operator => "operator",
        }
    }
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
    pub role: Role,
}

impl Identity {
    /// Identity used when auth is disabled. Has full access.
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            method: "none".to_string(),
            role: Role::Operator,
        }
    }
}
