/// Storage interfaces
///
/// The authentication flows only talk to users and refresh-token records
/// through these two traits. Each backing technology provides one adapter
/// per trait: `postgres` for deployments, `memory` for local runs and tests.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::RefreshToken;
use crate::error::AppError;

pub use memory::{InMemoryCredentialStore, InMemoryRefreshTokenStore};
pub use postgres::{PgCredentialStore, PgRefreshTokenStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    /// The username or email is taken; carries the colliding value.
    AlreadyExists(String),
    /// The store refused the user; messages are shown to the caller as-is.
    Rejected(Vec<String>),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Usernames match case-insensitively.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Emails match case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Hashes the password and persists the user. Policy failures come back
    /// as `Rejected` and uniqueness collisions (including lost races) as
    /// `AlreadyExists`, not as errors.
    async fn create(&self, new_user: NewUser<'_>) -> Result<CreateUserOutcome, AppError>;

    async fn verify_password(&self, user: &User, password: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Fails if a record with the same token value already exists.
    async fn insert(&self, record: &RefreshToken) -> Result<(), AppError>;

    /// Returns the record regardless of its used/invalidated/expired state.
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;

    /// Sets `used` only if the record was neither used nor invalidated at
    /// write time.
    ///
    /// Returns `false` when the record is missing, already used or revoked,
    /// so two concurrent redemptions of the same token can never both succeed.
    async fn try_mark_used(&self, token: &str) -> Result<bool, AppError>;

    /// Invalidates every unused, still-valid refresh token owned by the user.
    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;
}
