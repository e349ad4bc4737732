/// PostgreSQL store adapters
///
/// Refresh tokens are keyed by their SHA-256 digest; the plaintext value is
/// only ever known to the client. Single-use enforcement relies on the
/// conditional `UPDATE ... WHERE used = false AND invalidated = false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_password, hash_token, verify_password, PasswordPolicy, RefreshToken};
use crate::error::{AppError, DatabaseError};
use crate::store::{CreateUserOutcome, CredentialStore, NewUser, RefreshTokenStore, User};

type UserRow = (Uuid, String, String, String);

fn user_from_row((id, username, email, password_hash): UserRow) -> User {
    User {
        id,
        username,
        email,
        password_hash,
    }
}

pub struct PgCredentialStore {
    pool: PgPool,
    policy: PasswordPolicy,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool, policy: PasswordPolicy) -> Self {
        Self { pool, policy }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash FROM users WHERE lower(username) = lower($1)",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn create(&self, new_user: NewUser<'_>) -> Result<CreateUserOutcome, AppError> {
        let violations = self.policy.violations(new_user.password);
        if !violations.is_empty() {
            return Ok(CreateUserOutcome::Rejected(
                violations.iter().map(|v| v.to_string()).collect(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.to_string(),
            email: new_user.email.to_string(),
            password_hash: hash_password(new_user.password, self.policy.hash_cost)?,
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match inserted.map_err(AppError::from) {
            Ok(_) => Ok(CreateUserOutcome::Created(user)),
            // A concurrent registration won the unique index
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(constraint))) => {
                tracing::info!(username = %user.username, "User insert lost uniqueness race");
                let taken = if constraint.contains("email") {
                    user.email
                } else {
                    user.username
                };
                Ok(CreateUserOutcome::AlreadyExists(taken))
            }
            Err(e) => Err(e),
        }
    }

    async fn verify_password(&self, user: &User, password: &str) -> Result<bool, AppError> {
        verify_password(password, &user.password_hash)
    }
}

type RefreshTokenRow = (String, Uuid, DateTime<Utc>, DateTime<Utc>, bool, bool);

pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, record: &RefreshToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_hash, jwt_id, user_id, created_on, expiration_date, used, invalidated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(hash_token(&record.token))
        .bind(&record.jwt_id)
        .bind(record.user_id)
        .bind(record.created_on)
        .bind(record.expiration_date)
        .bind(record.used)
        .bind(record.invalidated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT jwt_id, user_id, created_on, expiration_date, used, invalidated
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(jwt_id, user_id, created_on, expiration_date, used, invalidated)| RefreshToken {
                token: token.to_string(),
                jwt_id,
                user_id,
                created_on,
                expiration_date,
                used,
                invalidated,
            },
        ))
    }

    async fn try_mark_used(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET used = true
            WHERE token_hash = $1 AND used = false AND invalidated = false
            "#,
        )
        .bind(hash_token(token))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET invalidated = true
            WHERE user_id = $1 AND used = false AND invalidated = false
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
