/// Error Handling
///
/// Two families of errors live here:
/// 1. Expected authentication outcomes (`AuthFailure`), returned as values
///    from every flow and rendered as `{ "errors": [...] }`.
/// 2. Unexpected faults (`AppError`): storage, configuration and internal
///    failures that propagate with `?` up to the HTTP boundary.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

// ============================================================================
// 1. AUTHENTICATION OUTCOMES
// ============================================================================

/// Category of an expected authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Conflict,
    NotFound,
    Unauthorized,
    PolicyViolation,
    TokenStateViolation,
}

impl FailureKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            FailureKind::Conflict => StatusCode::CONFLICT,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Unauthorized => StatusCode::UNAUTHORIZED,
            FailureKind::PolicyViolation | FailureKind::TokenStateViolation => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            FailureKind::Conflict => "CONFLICT",
            FailureKind::NotFound => "NOT_FOUND",
            FailureKind::Unauthorized => "UNAUTHORIZED",
            FailureKind::PolicyViolation => "POLICY_VIOLATION",
            FailureKind::TokenStateViolation => "TOKEN_STATE_VIOLATION",
        }
    }
}

/// An expected, caller-visible reason a Register, Login or Refresh call did
/// not produce a token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Carries the colliding email or username.
    UserAlreadyExists(String),
    UserNotFound,
    WrongPassword,
    /// Messages from the credential store, surfaced verbatim.
    Rejected(Vec<String>),
    InvalidToken,
    TokenNotExpired,
    RefreshTokenNotFound,
    RefreshTokenExpired,
    RefreshTokenInvalidated,
    RefreshTokenUsed,
    RefreshTokenMismatch,
}

impl AuthFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            AuthFailure::UserAlreadyExists(_) => FailureKind::Conflict,
            AuthFailure::UserNotFound | AuthFailure::RefreshTokenNotFound => FailureKind::NotFound,
            AuthFailure::WrongPassword | AuthFailure::InvalidToken => FailureKind::Unauthorized,
            AuthFailure::Rejected(_) => FailureKind::PolicyViolation,
            AuthFailure::TokenNotExpired
            | AuthFailure::RefreshTokenExpired
            | AuthFailure::RefreshTokenInvalidated
            | AuthFailure::RefreshTokenUsed
            | AuthFailure::RefreshTokenMismatch => FailureKind::TokenStateViolation,
        }
    }

    pub fn errors(&self) -> Vec<String> {
        match self {
            AuthFailure::UserAlreadyExists(value) => {
                vec![format!("User with {} already exists!", value)]
            }
            AuthFailure::UserNotFound => vec!["User does not exist!".to_string()],
            AuthFailure::WrongPassword => vec!["Wrong password!".to_string()],
            AuthFailure::Rejected(errors) => errors.clone(),
            AuthFailure::InvalidToken => vec!["Invalid Token!".to_string()],
            AuthFailure::TokenNotExpired => vec!["This Token hasn't expired yet!".to_string()],
            AuthFailure::RefreshTokenNotFound => {
                vec!["This Refresh Token does not exist!".to_string()]
            }
            AuthFailure::RefreshTokenExpired => vec!["This Refresh Token has expired!".to_string()],
            AuthFailure::RefreshTokenInvalidated => {
                vec!["This Refresh Token has been invalidated!".to_string()]
            }
            AuthFailure::RefreshTokenUsed => vec!["This Refresh Token has been used!".to_string()],
            AuthFailure::RefreshTokenMismatch => {
                vec!["This Refresh Token does not match this JWT!".to_string()]
            }
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors().join("; "))
    }
}

impl StdError for AuthFailure {}

/// Failure body returned for every expected authentication failure.
#[derive(Debug, serde::Serialize)]
pub struct AuthFailedResponse {
    pub errors: Vec<String>,
    pub code: &'static str,
}

impl From<&AuthFailure> for AuthFailedResponse {
    fn from(failure: &AuthFailure) -> Self {
        Self {
            errors: failure.errors(),
            code: failure.kind().code(),
        }
    }
}

impl AuthFailure {
    pub fn into_response(self) -> HttpResponse {
        HttpResponse::build(self.kind().status_code()).json(AuthFailedResponse::from(&self))
    }
}

// ============================================================================
// 2. DOMAIN-SPECIFIC FAULT TYPES
// ============================================================================

/// Input validation errors, raised at the HTTP boundary and by the password
/// policy of the credential stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
    MissingCharacterClass(&'static str),
    SuspiciousContent(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::MissingCharacterClass(class) => {
                write!(f, "password must contain at least one {}", class)
            }
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
        }
    }
}

impl StdError for ValidationError {}

/// Storage errors from either store backend
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    ConnectionPool(String),
    Migration(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::Migration(msg) => write!(f, "Database migration error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

// ============================================================================
// 3. UNIFIED APPLICATION ERROR TYPE
// ============================================================================

/// Unexpected faults. Expected authentication outcomes never use this type.
#[derive(Debug)]
pub enum AppError {
    Validation(Vec<ValidationError>),
    Database(DatabaseError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(errors) => {
                let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", messages.join("; "))
            }
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(vec![err])
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(ConfigError::ParseError(err.to_string()))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db_err.message().to_string(),
                ))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(DatabaseError::Migration(err.to_string()))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("Token generation failed: {}", err))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing failed: {}", err))
    }
}

// ============================================================================
// 4. HTTP RESPONSE MAPPING
// ============================================================================

/// Error body for unexpected faults and rejected request payloads
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Correlates the response with the server-side log line
    pub error_id: String,
    pub errors: Vec<String>,
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, errors: Vec<String>, code: String, status: u16) -> Self {
        Self {
            error_id,
            errors,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    fn response_parts(&self) -> (StatusCode, &'static str, Vec<String>) {
        match self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                errors.iter().map(|e| e.to_string()).collect(),
            ),
            AppError::Database(DatabaseError::ConnectionPool(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                vec!["Storage temporarily unavailable".to_string()],
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                vec!["Database error occurred".to_string()],
            ),
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                vec!["Server configuration error".to_string()],
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                vec!["Internal server error".to_string()],
            ),
        }
    }

    fn log_error(&self, error_id: &str) {
        match self {
            AppError::Validation(_) => {
                tracing::warn!(error_id = error_id, error = %self, "Request validation failed");
            }
            AppError::Database(e) => {
                tracing::error!(error_id = error_id, error = %e, "Database error");
            }
            AppError::Config(e) => {
                tracing::error!(error_id = error_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&error_id);

        let (status, code, errors) = self.response_parts();
        HttpResponse::build(status).json(ErrorResponse::new(
            error_id,
            errors,
            code.to_string(),
            status.as_u16(),
        ))
    }

    fn status_code(&self) -> StatusCode {
        self.response_parts().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_value() {
        let failure = AuthFailure::UserAlreadyExists("a@x.com".to_string());
        assert_eq!(failure.kind(), FailureKind::Conflict);
        assert_eq!(failure.errors(), vec!["User with a@x.com already exists!"]);
    }

    #[test]
    fn test_rejected_errors_are_verbatim() {
        let failure = AuthFailure::Rejected(vec!["one".to_string(), "two".to_string()]);
        assert_eq!(failure.kind(), FailureKind::PolicyViolation);
        assert_eq!(failure.errors(), vec!["one", "two"]);
        assert_eq!(failure.to_string(), "one; two");
    }

    #[test]
    fn test_token_state_failures_share_category() {
        for failure in [
            AuthFailure::TokenNotExpired,
            AuthFailure::RefreshTokenExpired,
            AuthFailure::RefreshTokenInvalidated,
            AuthFailure::RefreshTokenUsed,
            AuthFailure::RefreshTokenMismatch,
        ] {
            assert_eq!(failure.kind(), FailureKind::TokenStateViolation);
            assert_eq!(failure.kind().status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_not_found_and_unauthorized_statuses() {
        assert_eq!(AuthFailure::UserNotFound.kind().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthFailure::RefreshTokenNotFound.kind().status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AuthFailure::WrongPassword.kind().status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthFailure::InvalidToken.kind().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::TooShort("password", 8);
        assert_eq!(err.to_string(), "password is too short (minimum 8 characters)");
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = AppError::Internal("secret detail".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let (_, _, errors) = err.response_parts();
        assert_eq!(errors, vec!["Internal server error"]);
    }
}
