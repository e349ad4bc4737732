/// Authentication module
///
/// Token issuance and validation, refresh-token records, password hashing,
/// and the Register/Login/Refresh flows built on top of them.

mod claims;
mod issuer;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::Claims;
pub use issuer::{IssuedTokens, TokenIssuer};
pub use jwt::{TokenValidation, TokenValidator};
pub use password::{hash_password, verify_password, PasswordPolicy};
pub use refresh_token::{generate_refresh_token, hash_token, RefreshToken};
pub use service::{AuthOutcome, AuthService};
