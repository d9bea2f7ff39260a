use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Role {role} may not {action}")]
    Forbidden { role: String, action: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Resolves the caller of an API request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Name reported by `/health`.
    fn method_name(&self) -> &'static str;
}

/// Fails unless `identity` may start or cancel runs.
pub fn require_operator(identity: &Identity, action: &str) -> Result<(), AuthError> {
    if identity.role.can_mutate() {
        Ok(())
    } else {
        Err(AuthError::Forbidden {
            role: identity.role.as_str().to_string(),
            action: action.to_string(),
        })
    }
}
