/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and the password rules the
/// credential stores enforce when creating users.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ValidationError};

/// Rules a new password must satisfy before a credential store accepts it,
/// and the bcrypt cost it is hashed with.
#[derive(serde::Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PasswordPolicy {
    pub hash_cost: u32,
    pub min_length: usize,
    pub max_length: usize,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            hash_cost: DEFAULT_COST,
            min_length: 8,
            // bcrypt only looks at the first 72 bytes; the cap also bounds hashing cost
            max_length: 128,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
        }
    }
}

impl PasswordPolicy {
    /// Returns every rule the password breaks, in a stable order.
    pub fn violations(&self, password: &str) -> Vec<ValidationError> {
        let mut violations = Vec::new();

        if password.is_empty() {
            violations.push(ValidationError::EmptyField("password"));
            return violations;
        }

        let length = password.chars().count();
        if length < self.min_length {
            violations.push(ValidationError::TooShort("password", self.min_length));
        }
        if length > self.max_length {
            violations.push(ValidationError::TooLong("password", self.max_length));
        }

        if self.require_digit && !password.chars().any(|c| c.is_numeric()) {
            violations.push(ValidationError::MissingCharacterClass("digit"));
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            violations.push(ValidationError::MissingCharacterClass("lowercase letter"));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            violations.push(ValidationError::MissingCharacterClass("uppercase letter"));
        }

        violations
    }
}

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if bcrypt hashing fails
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(hash(password, cost)?)
}

/// Verify a password against its bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    Ok(verify(password, hash)?)
}
