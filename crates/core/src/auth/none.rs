use async_trait::async_trait;
use tracing::trace;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Every caller is the anonymous operator. Only used with `method = "none"`,
/// which must be chosen explicitly in `[auth]`.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        trace!(source_ip = %request.source_ip, "Auth disabled, caller is anonymous operator");
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_ignores_credentials_and_grants_operator() {
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer whatever".to_string());
        let request = AuthRequest {
            headers,
            source_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        let identity = NoneAuthenticator::new().authenticate(&request).await.unwrap();
        assert_eq!(identity.role, Role::Operator);
        assert_eq!(identity.user_id, "anonymous");
    }
}
