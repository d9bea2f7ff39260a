//! Request authentication for the operational API.
//!
//! Two methods exist. `none` treats every caller as an anonymous operator,
//! `api_key` maps each configured key to a [`Role`]. Viewers may only read;
//! starting and cancelling runs needs an operator (see [`require_operator`]).

mod api_key;
mod none;
mod traits;
mod types;

pub use api_key::*;
pub use none::*;
pub use traits::*;
pub use types::*;

use std::collections::HashSet;

use tracing::info;

use crate::config::{AuthConfig, AuthMethod};

/// Build the authenticator selected by `[auth]`.
///
/// The same key listed twice is rejected, since the role it grants would
/// depend on list order.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator::new())),
        AuthMethod::ApiKey => {
            if config.api_keys.is_empty() {
                return Err(AuthError::ConfigurationError(
                    "api_keys must be set when using api_key auth".to_string(),
                ));
            }

            let mut seen = HashSet::new();
            if !config.api_keys.iter().all(|k| seen.insert(k.key.as_str())) {
                return Err(AuthError::ConfigurationError(
                    "the same api key is listed more than once".to_string(),
                ));
            }

            let operators = config
                .api_keys
                .iter()
                .filter(|k| k.role == Role::Operator)
                .count();
            info!(
                operators,
                viewers = config.api_keys.len() - operators,
                "API key authentication enabled"
            );
            Ok(Box::new(ApiKeyAuthenticator::new(&config.api_keys)))
        }
    }
}
