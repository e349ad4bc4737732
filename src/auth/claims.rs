/// Access token claims
///
/// The signed payload of every access token. `jti` binds the token to
/// exactly one refresh-token record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::User;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user's email)
    pub sub: String,
    /// Unique token identifier
    pub jti: String,
    pub email: String,
    /// User identifier
    pub id: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl Claims {
    pub fn new(user: &User, jti: String, issued_at: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            sub: user.email.clone(),
            jti,
            email: user.email.clone(),
            id: user.id.to_string(),
            exp: (issued_at + lifetime).timestamp(),
            iat: issued_at.timestamp(),
        }
    }

    /// `None` if the `id` claim is not a UUID.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }

    /// A token is expired once `exp` is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}
