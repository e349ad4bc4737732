/// Access token validation
///
/// Verifies HS256 signatures and decodes claims. Validation is total: every
/// failure becomes `TokenValidation::Invalid` instead of an error.

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    Valid(Claims),
    Invalid { reason: String },
}

impl TokenValidation {
    pub fn into_claims(self) -> Option<Claims> {
        match self {
            TokenValidation::Valid(claims) => Some(claims),
            TokenValidation::Invalid { .. } => None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        TokenValidation::Invalid {
            reason: reason.into(),
        }
    }
}

pub struct TokenValidator {
    decoding_key: DecodingKey,
}

impl TokenValidator {
    pub fn new(settings: &JwtSettings) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
        }
    }

    /// Verify a presented access token.
    ///
    /// Only HS256 is accepted; `none` and every other algorithm fail. With
    /// `allow_expired` the signature is still checked but `exp` is left to
    /// the caller.
    pub fn validate(&self, token: &str, allow_expired: bool) -> TokenValidation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = !allow_expired;
        validation.set_required_spec_claims(&["exp"]);

        let data = match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "JWT validation error");
                return TokenValidation::invalid(e.to_string());
            }
        };

        if data.header.alg != Algorithm::HS256 {
            tracing::warn!(alg = ?data.header.alg, "JWT signed with unexpected algorithm");
            return TokenValidation::invalid("unexpected signing algorithm");
        }

        if !allow_expired && data.claims.is_expired_at(Utc::now()) {
            return TokenValidation::invalid("token has expired");
        }

        TokenValidation::Valid(data.claims)
    }
}
