/// Token pair issuance
///
/// Mints a signed access token together with its refresh-token record and
/// persists the record before handing either half to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::refresh_token::RefreshToken;
use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::store::{RefreshTokenStore, User};

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of the access token
    pub expiration: DateTime<Utc>,
}

pub struct TokenIssuer {
    settings: Arc<JwtSettings>,
    encoding_key: EncodingKey,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl TokenIssuer {
    pub fn new(settings: Arc<JwtSettings>, refresh_tokens: Arc<dyn RefreshTokenStore>) -> Self {
        let encoding_key = EncodingKey::from_secret(settings.secret.as_bytes());
        Self {
            settings,
            encoding_key,
            refresh_tokens,
        }
    }

    /// Issue a token pair for `user`.
    ///
    /// The access token lives for `lifetime_override` when given, otherwise
    /// for the configured access-token lifetime. The refresh token always
    /// lives for the configured refresh window.
    ///
    /// # Errors
    /// Returns error if signing fails or the refresh-token record cannot be
    /// persisted; no token is returned in either case.
    pub async fn issue(
        &self,
        user: &User,
        lifetime_override: Option<Duration>,
    ) -> Result<IssuedTokens, AppError> {
        let now = Utc::now();
        let lifetime = lifetime_override.unwrap_or_else(|| self.settings.access_token_lifetime());
        let expiration = now + lifetime;

        let claims = Claims::new(user, Uuid::new_v4().to_string(), now, lifetime);
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        let record = RefreshToken::new(
            claims.jti,
            user.id,
            now,
            self.settings.refresh_token_lifetime(),
        );
        self.refresh_tokens.insert(&record).await?;

        tracing::debug!(user_id = %user.id, jwt_id = %record.jwt_id, "Issued token pair");

        Ok(IssuedTokens {
            access_token,
            refresh_token: record.token,
            expiration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::auth::jwt::{TokenValidation, TokenValidator};
    use crate::error::DatabaseError;
    use crate::store::InMemoryRefreshTokenStore;

    fn settings() -> Arc<JwtSettings> {
        Arc::new(JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 900,
            remember_me_token_expiry: 86400,
            refresh_token_expiry: 7200,
        })
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: String::new(),
        }
    }

    struct FailingStore;

    #[async_trait]
    impl RefreshTokenStore for FailingStore {
        async fn insert(&self, _record: &RefreshToken) -> Result<(), AppError> {
            Err(DatabaseError::ConnectionPool("unreachable".to_string()).into())
        }

        async fn find_by_token(&self, _token: &str) -> Result<Option<RefreshToken>, AppError> {
            Ok(None)
        }

        async fn try_mark_used(&self, _token: &str) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn invalidate_all_for_user(&self, _user_id: Uuid) -> Result<u64, AppError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn issued_token_validates_and_matches_user() {
        let settings = settings();
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let issuer = TokenIssuer::new(settings.clone(), store.clone());
        let user = user();

        let issued = issuer.issue(&user, None).await.expect("Failed to issue tokens");

        let claims = match TokenValidator::new(&settings).validate(&issued.access_token, false) {
            TokenValidation::Valid(claims) => claims,
            TokenValidation::Invalid { reason } => panic!("issued token rejected: {}", reason),
        };
        assert_eq!(claims.user_id(), Some(user.id));
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.sub, user.email);
        assert_eq!(claims.exp, issued.expiration.timestamp());
        assert_eq!(claims.exp - claims.iat, 900);

        let record = store
            .find_by_token(&issued.refresh_token)
            .await
            .unwrap()
            .expect("refresh token was not persisted");
        assert_eq!(record.jwt_id, claims.jti);
        assert_eq!(record.user_id, user.id);
        assert_eq!(record.expiration_date - record.created_on, Duration::seconds(7200));
        assert!(!record.used);
        assert!(!record.invalidated);
    }

    #[tokio::test]
    async fn lifetime_override_changes_only_access_token() {
        let settings = settings();
        let store = Arc::new(InMemoryRefreshTokenStore::new());
        let issuer = TokenIssuer::new(settings.clone(), store.clone());

        let issued = issuer
            .issue(&user(), Some(Duration::seconds(86400)))
            .await
            .expect("Failed to issue tokens");
        let claims = TokenValidator::new(&settings)
            .validate(&issued.access_token, false)
            .into_claims()
            .expect("issued token rejected");
        let record = store.find_by_token(&issued.refresh_token).await.unwrap().unwrap();

        assert_eq!(claims.exp - claims.iat, 86400);
        assert_eq!(record.expiration_date - record.created_on, Duration::seconds(7200));
    }

    #[tokio::test]
    async fn each_issuance_gets_fresh_identifiers() {
        let settings = settings();
        let issuer = TokenIssuer::new(settings.clone(), Arc::new(InMemoryRefreshTokenStore::new()));
        let user = user();
        let validator = TokenValidator::new(&settings);

        let first = issuer.issue(&user, None).await.unwrap();
        let second = issuer.issue(&user, None).await.unwrap();

        let first_jti = validator.validate(&first.access_token, false).into_claims().unwrap().jti;
        let second_jti = validator.validate(&second.access_token, false).into_claims().unwrap().jti;
        assert_ne!(first_jti, second_jti);
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn persistence_failure_fails_issuance() {
        let issuer = TokenIssuer::new(settings(), Arc::new(FailingStore));

        let result = issuer.issue(&user(), None).await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::ConnectionPool(_)))
        ));
    }
}
