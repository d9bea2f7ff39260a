//! API Key authentication.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AuthError, AuthRequest, Authenticator, Identity, Role};
use crate::config::ApiKeyConfig;

struct KeyEntry {
    key: String,
    role: Role,
    /// Stable, non-secret id derived from the key, used as the user id.
    fingerprint: String,
}

/// Authenticator that validates requests against the configured API keys.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
pub struct ApiKeyAuthenticator {
    keys: Vec<KeyEntry>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: &[ApiKeyConfig]) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|k| KeyEntry {
                    key: k.key.clone(),
                    role: k.role,
                    fingerprint: fingerprint(&k.key),
                })
                .collect(),
        }
    }

    /// Single operator key.
    pub fn single(key: impl Into<String>) -> Self {
        Self::new(&[ApiKeyConfig {
            key: key.into(),
            role: Role::Operator,
        }])
    }

    fn extract_key<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(auth_header) = request.headers.get("authorization") {
            if let Some(key) = auth_header
                .strip_prefix("Bearer ")
                .or_else(|| auth_header.strip_prefix("bearer "))
            {
                return Some(key);
            }
        }

        request.headers.get("x-api-key").map(String::as_str)
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided = self
            .extract_key(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Compare against every key.
        let mut matched: Option<&KeyEntry> = None;
        for entry in &self.keys {
            if constant_time_eq(provided.as_bytes(), entry.key.as_bytes()) && matched.is_none() {
                matched = Some(entry);
            }
        }

        match matched {
            Some(entry) => Ok(Identity {
                user_id: format!("key:{}", entry.fingerprint),
                method: "api_key".to_string(),
                role: entry.role,
            }),
            None => Err(AuthError::InvalidCredentials("Invalid API key".to_string())),
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
