/// Authentication flows
///
/// Register, Login and Refresh compose the credential store, the refresh
/// token store, the issuer and the validator. Expected failures come back
/// as `AuthFailure` values; only storage and signing faults are errors.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::auth::issuer::{IssuedTokens, TokenIssuer};
use crate::auth::jwt::{TokenValidation, TokenValidator};
use crate::configuration::{DefaultUserSettings, JwtSettings};
use crate::error::{AppError, AuthFailure};
use crate::store::{CreateUserOutcome, CredentialStore, NewUser, RefreshTokenStore};

pub type AuthOutcome = Result<IssuedTokens, AuthFailure>;

#[derive(Clone)]
pub struct AuthService {
    settings: Arc<JwtSettings>,
    credentials: Arc<dyn CredentialStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    issuer: Arc<TokenIssuer>,
    validator: Arc<TokenValidator>,
}

impl AuthService {
    pub fn new(
        settings: JwtSettings,
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let settings = Arc::new(settings);
        let issuer = Arc::new(TokenIssuer::new(settings.clone(), refresh_tokens.clone()));
        let validator = Arc::new(TokenValidator::new(&settings));
        Self {
            settings,
            credentials,
            refresh_tokens,
            issuer,
            validator,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn validator(&self) -> Arc<TokenValidator> {
        self.validator.clone()
    }

    #[tracing::instrument(name = "register", skip(self, password, email))]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<AuthOutcome, AppError> {
        let existing_by_email = self.credentials.find_by_email(email).await?;
        let existing_by_username = self.credentials.find_by_username(username).await?;

        if existing_by_email.is_some() {
            tracing::info!("Registration rejected: email already registered");
            return Ok(Err(AuthFailure::UserAlreadyExists(email.to_string())));
        }
        if existing_by_username.is_some() {
            tracing::info!("Registration rejected: username taken");
            return Ok(Err(AuthFailure::UserAlreadyExists(username.to_string())));
        }

        let new_user = NewUser {
            username,
            email,
            password,
        };
        let user = match self.credentials.create(new_user).await? {
            CreateUserOutcome::Created(user) => user,
            CreateUserOutcome::AlreadyExists(taken) => {
                tracing::info!("Registration rejected: lost uniqueness race");
                return Ok(Err(AuthFailure::UserAlreadyExists(taken)));
            }
            CreateUserOutcome::Rejected(errors) => {
                tracing::info!(errors = errors.len(), "Registration rejected by credential store");
                return Ok(Err(AuthFailure::Rejected(errors)));
            }
        };

        let issued = self.issuer.issue(&user, None).await?;
        tracing::info!(user_id = %user.id, "User registered successfully");
        Ok(Ok(issued))
    }

    /// `remember_me` issues the access token with the extended lifetime.
    /// A refresh token is issued either way.
    #[tracing::instrument(name = "login", skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<AuthOutcome, AppError> {
        let user = match self.credentials.find_by_username(username).await? {
            Some(user) => user,
            None => {
                tracing::info!("Login rejected: unknown user");
                return Ok(Err(AuthFailure::UserNotFound));
            }
        };

        if !self.credentials.verify_password(&user, password).await? {
            tracing::warn!(user_id = %user.id, "Login rejected: wrong password");
            return Ok(Err(AuthFailure::WrongPassword));
        }

        let lifetime = remember_me.then(|| self.settings.remember_me_lifetime());
        let issued = self.issuer.issue(&user, lifetime).await?;
        tracing::info!(user_id = %user.id, remember_me, "User logged in successfully");
        Ok(Ok(issued))
    }

    /// Rotate a refresh token into a new token pair.
    ///
    /// Only accepted once the presented access token is past its own expiry,
    /// and only for the refresh token issued together with it.
    #[tracing::instrument(name = "refresh", skip_all)]
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<AuthOutcome, AppError> {
        let claims = match self.validator.validate(access_token, true) {
            TokenValidation::Valid(claims) => claims,
            TokenValidation::Invalid { reason } => {
                tracing::warn!(reason = %reason, "Refresh rejected: invalid access token");
                return Ok(Err(AuthFailure::InvalidToken));
            }
        };

        let now = Utc::now();
        if !claims.is_expired_at(now) {
            return Ok(Err(AuthFailure::TokenNotExpired));
        }

        let stored = match self.refresh_tokens.find_by_token(refresh_token).await? {
            Some(stored) => stored,
            None => return Ok(Err(AuthFailure::RefreshTokenNotFound)),
        };

        let failure = if stored.is_expired_at(now) {
            Some(AuthFailure::RefreshTokenExpired)
        } else if stored.invalidated {
            Some(AuthFailure::RefreshTokenInvalidated)
        } else if stored.used {
            Some(AuthFailure::RefreshTokenUsed)
        } else if stored.jwt_id != claims.jti {
            Some(AuthFailure::RefreshTokenMismatch)
        } else {
            None
        };
        if let Some(failure) = failure {
            tracing::warn!(user_id = %stored.user_id, failure = %failure, "Refresh rejected");
            return Ok(Err(failure));
        }

        let user = match claims.user_id() {
            Some(id) => self.credentials.find_by_id(id).await?,
            None => None,
        };
        let user = match user {
            Some(user) => user,
            None => {
                tracing::warn!(user_id = %stored.user_id, "Refresh rejected: user no longer exists");
                return Ok(Err(AuthFailure::UserNotFound));
            }
        };

        if !self.refresh_tokens.try_mark_used(refresh_token).await? {
            // Another request consumed or revoked the token after the checks above
            let revoked = self
                .refresh_tokens
                .find_by_token(refresh_token)
                .await?
                .map_or(false, |current| current.invalidated && !current.used);
            tracing::warn!(user_id = %user.id, revoked, "Refresh rejected: lost redemption race");
            let failure = if revoked {
                AuthFailure::RefreshTokenInvalidated
            } else {
                AuthFailure::RefreshTokenUsed
            };
            return Ok(Err(failure));
        }

        let issued = self.issuer.issue(&user, None).await?;
        tracing::info!(user_id = %user.id, "Token refreshed successfully");
        Ok(Ok(issued))
    }

    /// Invalidate every outstanding refresh token of a user.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.refresh_tokens.invalidate_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Refresh tokens invalidated for user");
        Ok(revoked)
    }

    /// Create the configured default account unless its username exists.
    pub async fn ensure_default_user(&self, default_user: &DefaultUserSettings) -> Result<(), AppError> {
        if self
            .credentials
            .find_by_username(&default_user.username)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let new_user = NewUser {
            username: &default_user.username,
            email: &default_user.email,
            password: &default_user.password,
        };
        match self.credentials.create(new_user).await? {
            CreateUserOutcome::Created(user) => {
                tracing::info!(user_id = %user.id, username = %user.username, "Default user created");
            }
            CreateUserOutcome::AlreadyExists(taken) => {
                tracing::warn!(taken = %taken, "Default user collides with an existing account");
            }
            CreateUserOutcome::Rejected(errors) => {
                tracing::warn!(errors = ?errors, "Default user rejected by credential store");
            }
        }
        Ok(())
    }
}
