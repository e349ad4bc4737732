/// Refresh Token Records
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character alphanumeric strings
/// - Bound to exactly one access token through `jwt_id`
/// - Single-use: a successful refresh flips `used` and issues a new pair
/// - Revocable through the `invalidated` flag

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const REFRESH_TOKEN_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    /// Opaque bearer value handed to the client
    pub token: String,
    /// `jti` of the access token this record was issued with
    pub jwt_id: String,
    pub user_id: Uuid,
    pub created_on: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub used: bool,
    pub invalidated: bool,
}

impl RefreshToken {
    pub fn new(jwt_id: String, user_id: Uuid, created_on: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            token: generate_refresh_token(),
            jwt_id,
            user_id,
            created_on,
            expiration_date: created_on + lifetime,
            used: false,
            invalidated: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_date
    }
}

/// Generate a new cryptographically secure refresh token value
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest of a token value, used as the database key so the
/// plaintext bearer value is never stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
