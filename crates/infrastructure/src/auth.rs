//! JWT 身份解析
//!
//! HS256 签名，`sub` 为用户名。签发由外部认证服务负责，
//! [`TokenIssuer`] 只供运维工具和测试使用。

use std::sync::Arc;

use application::{ApplicationError, IdentityRepository, PrincipalResolver};
use async_trait::async_trait;
use config::JwtConfig;
use domain::Identity;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

#[derive(Clone)]
pub struct JwtPrincipalResolver {
    decoding_key: DecodingKey,
    validation: Validation,
    identities: Arc<dyn IdentityRepository>,
}

impl JwtPrincipalResolver {
    pub fn new(config: &JwtConfig, identities: Arc<dyn IdentityRepository>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            identities,
        }
    }
}

#[async_trait]
impl PrincipalResolver for JwtPrincipalResolver {
    async fn resolve(&self, credential: &str) -> Result<Identity, ApplicationError> {
        let claims = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(error = %err, "token rejected");
                ApplicationError::Unauthenticated
            })?;

        match self.identities.find_by_username(&claims.sub).await {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => {
                debug!(username = %claims.sub, "token subject has no account");
                Err(ApplicationError::Unauthenticated)
            }
            Err(err) => {
                warn!(error = %err, "身份查询失败");
                Err(err.into())
            }
        }
    }
}

/// JWT 签发器
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    expiration_hours: i64,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            expiration_hours: config.expiration_hours,
        }
    }

    pub fn issue(&self, username: &str) -> Result<String, ApplicationError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.expiration_hours);
        self.encode(&Claims {
            sub: username.to_owned(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        })
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, ApplicationError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| ApplicationError::infrastructure(format!("token generation failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStorage;

    fn jwt_config(secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.to_owned(),
            expiration_hours: 1,
        }
    }

    const SECRET: &str = "test-secret-key-with-at-least-32-characters";

    async fn resolver() -> (JwtPrincipalResolver, Identity) {
        let storage = Arc::new(InMemoryStorage::new());
        let alice = storage.insert_identity("alice").await;
        (JwtPrincipalResolver::new(&jwt_config(SECRET), storage), alice)
    }

    #[tokio::test]
    async fn test_valid_token_resolves_identity() {
        let (resolver, alice) = resolver().await;
        let token = TokenIssuer::new(&jwt_config(SECRET)).issue("alice").unwrap();

        let identity = resolver.resolve(&token).await.unwrap();
        assert_eq!(identity, alice);
    }

    #[tokio::test]
    async fn test_wrong_signature_rejected() {
        let (resolver, _) = resolver().await;
        let token = TokenIssuer::new(&jwt_config("another-secret-key-with-32-characters!!"))
            .issue("alice")
            .unwrap();

        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ApplicationError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (resolver, _) = resolver().await;
        let now = chrono::Utc::now().timestamp();
        let token = TokenIssuer::new(&jwt_config(SECRET))
            .encode(&Claims {
                sub: "alice".into(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ApplicationError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_unknown_subject_and_garbage_rejected() {
        let (resolver, _) = resolver().await;
        let token = TokenIssuer::new(&jwt_config(SECRET)).issue("mallory").unwrap();

        for credential in [token.as_str(), "not-a-jwt", ""] {
            assert!(matches!(
                resolver.resolve(credential).await,
                Err(ApplicationError::Unauthenticated)
            ));
        }
    }
}
