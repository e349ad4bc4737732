/// In-memory store adapters
///
/// Backed by `tokio::sync::RwLock` maps. Every check-and-write happens under
/// a single write guard, which gives the same atomicity the Postgres adapter
/// gets from conditional updates.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, PasswordPolicy, RefreshToken};
use crate::error::{AppError, DatabaseError};
use crate::store::{CreateUserOutcome, CredentialStore, NewUser, RefreshTokenStore, User};

pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
    policy: PasswordPolicy,
}

impl InMemoryCredentialStore {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser<'_>) -> Result<CreateUserOutcome, AppError> {
        let violations = self.policy.violations(new_user.password);
        if !violations.is_empty() {
            return Ok(CreateUserOutcome::Rejected(
                violations.iter().map(|v| v.to_string()).collect(),
            ));
        }

        let password_hash = hash_password(new_user.password, self.policy.hash_cost)?;

        let mut users = self.users.write().await;
        if let Some(existing) = users.values().find(|u| {
            u.username.eq_ignore_ascii_case(new_user.username)
                || u.email.eq_ignore_ascii_case(new_user.email)
        }) {
            let taken = if existing.email.eq_ignore_ascii_case(new_user.email) {
                new_user.email
            } else {
                new_user.username
            };
            return Ok(CreateUserOutcome::AlreadyExists(taken.to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.to_string(),
            email: new_user.email.to_string(),
            password_hash,
        };
        users.insert(user.id, user.clone());
        Ok(CreateUserOutcome::Created(user))
    }

    async fn verify_password(&self, user: &User, password: &str) -> Result<bool, AppError> {
        verify_password(password, &user.password_hash)
    }
}

#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, record: &RefreshToken) -> Result<(), AppError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&record.token) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh token already exists".to_string(),
            )
            .into());
        }
        tokens.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn try_mark_used(&self, token: &str) -> Result<bool, AppError> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(token) {
            Some(record) if !record.used && !record.invalidated => {
                record.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut tokens = self.tokens.write().await;
        let mut count = 0;
        for record in tokens.values_mut() {
            if record.user_id == user_id && !record.used && !record.invalidated {
                record.invalidated = true;
                count += 1;
            }
        }
        Ok(count)
    }
}
