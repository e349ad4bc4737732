use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use token_service::auth::{hash_token, PasswordPolicy, RefreshToken};
use token_service::configuration::get_configuration;
use token_service::store::{
    CreateUserOutcome, CredentialStore, NewUser, PgCredentialStore, PgRefreshTokenStore,
    RefreshTokenStore, User,
};
use uuid::Uuid;

/// Creates a fresh, migrated database named after a random UUID.
///
/// Uses the `database` section of `configuration.yaml` (overridable through
/// `APP_DATABASE__*`). Returns `None` when no Postgres server is reachable so
/// the rest of the suite still runs on machines without one.
async fn configure_database() -> Option<PgPool> {
    let mut database = get_configuration()
        .expect("Failed to read configuration.")
        .database?;
    database.database_name = Uuid::new_v4().to_string();

    let mut connection = match PgConnection::connect(&database.connection_string_without_db()).await
    {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("Postgres unavailable, skipping: {}", e);
            return None;
        }
    };
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, database.database_name))
        .await
        .expect("Failed to create database.");

    let pool = PgPool::connect(&database.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate the database.");
    Some(pool)
}

fn credentials(pool: &PgPool) -> PgCredentialStore {
    PgCredentialStore::new(
        pool.clone(),
        PasswordPolicy {
            hash_cost: 4,
            ..PasswordPolicy::default()
        },
    )
}

async fn create_user(store: &PgCredentialStore, username: &str, email: &str) -> User {
    let outcome = store
        .create(NewUser {
            username,
            email,
            password: "ValidPassword123",
        })
        .await
        .expect("Failed to create user");
    match outcome {
        CreateUserOutcome::Created(user) => user,
        other => panic!("user not created: {:?}", other),
    }
}

async fn stored_record(refresh_tokens: &PgRefreshTokenStore, user: &User) -> RefreshToken {
    let record = RefreshToken::new(
        Uuid::new_v4().to_string(),
        user.id,
        Utc::now(),
        Duration::hours(1),
    );
    refresh_tokens
        .insert(&record)
        .await
        .expect("Failed to insert refresh token");
    record
}

// --- Credential Store Tests ---

#[tokio::test]
async fn lookups_ignore_case() {
    let Some(pool) = configure_database().await else { return };
    let store = credentials(&pool);
    let alice = create_user(&store, "alice", "alice@example.com").await;

    assert_eq!(store.find_by_username("ALICE").await.unwrap(), Some(alice.clone()));
    assert_eq!(
        store.find_by_email("Alice@Example.com").await.unwrap(),
        Some(alice.clone())
    );
    assert_eq!(store.find_by_id(alice.id).await.unwrap(), Some(alice.clone()));
    assert!(store.verify_password(&alice, "ValidPassword123").await.unwrap());
}

#[tokio::test]
async fn duplicate_email_is_reported_as_already_exists() {
    let Some(pool) = configure_database().await else { return };
    let store = credentials(&pool);
    create_user(&store, "alice", "alice@example.com").await;

    let outcome = store
        .create(NewUser {
            username: "bob",
            email: "ALICE@example.com",
            password: "ValidPassword123",
        })
        .await
        .expect("unique violation surfaced as a fault");
    assert!(
        matches!(&outcome, CreateUserOutcome::AlreadyExists(taken) if taken == "ALICE@example.com"),
        "unexpected outcome: {:?}",
        outcome
    );
}

#[tokio::test]
async fn duplicate_username_is_reported_as_already_exists() {
    let Some(pool) = configure_database().await else { return };
    let store = credentials(&pool);
    create_user(&store, "alice", "alice@example.com").await;

    let outcome = store
        .create(NewUser {
            username: "Alice",
            email: "other@example.com",
            password: "ValidPassword123",
        })
        .await
        .expect("unique violation surfaced as a fault");
    assert!(
        matches!(&outcome, CreateUserOutcome::AlreadyExists(taken) if taken == "Alice"),
        "unexpected outcome: {:?}",
        outcome
    );

    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn weak_password_is_rejected_before_insert() {
    let Some(pool) = configure_database().await else { return };
    let store = credentials(&pool);

    let outcome = store
        .create(NewUser {
            username: "bob",
            email: "bob@example.com",
            password: "weak",
        })
        .await
        .unwrap();
    assert!(matches!(outcome, CreateUserOutcome::Rejected(errors) if !errors.is_empty()));
    assert_eq!(store.find_by_username("bob").await.unwrap(), None);
}

// --- Refresh Token Store Tests ---

#[tokio::test]
async fn refresh_tokens_are_stored_hashed() {
    let Some(pool) = configure_database().await else { return };
    let user = create_user(&credentials(&pool), "alice", "alice@example.com").await;
    let refresh_tokens = PgRefreshTokenStore::new(pool.clone());
    let record = stored_record(&refresh_tokens, &user).await;

    let count = |key: String| {
        let pool = pool.clone();
        async move {
            let (count,): (i64,) =
                sqlx::query_as("SELECT count(*) FROM refresh_tokens WHERE token_hash = $1")
                    .bind(key)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            count
        }
    };
    assert_eq!(count(record.token.clone()).await, 0);
    assert_eq!(count(hash_token(&record.token)).await, 1);

    let found = refresh_tokens
        .find_by_token(&record.token)
        .await
        .unwrap()
        .expect("record missing");
    assert_eq!(found.jwt_id, record.jwt_id);
    assert_eq!(found.user_id, user.id);
    assert!(refresh_tokens.find_by_token("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn mark_used_succeeds_once() {
    let Some(pool) = configure_database().await else { return };
    let user = create_user(&credentials(&pool), "alice", "alice@example.com").await;
    let refresh_tokens = PgRefreshTokenStore::new(pool);
    let record = stored_record(&refresh_tokens, &user).await;

    assert!(refresh_tokens.try_mark_used(&record.token).await.unwrap());
    assert!(!refresh_tokens.try_mark_used(&record.token).await.unwrap());
    assert!(!refresh_tokens.try_mark_used("unknown").await.unwrap());
    assert!(refresh_tokens.find_by_token(&record.token).await.unwrap().unwrap().used);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mark_used_succeeds_once() {
    let Some(pool) = configure_database().await else { return };
    let user = create_user(&credentials(&pool), "alice", "alice@example.com").await;
    let refresh_tokens = Arc::new(PgRefreshTokenStore::new(pool));
    let record = stored_record(&refresh_tokens, &user).await;

    let attempts = (0..8).map(|_| {
        let refresh_tokens = refresh_tokens.clone();
        let token = record.token.clone();
        tokio::spawn(async move { refresh_tokens.try_mark_used(&token).await })
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("storage fault"))
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn revoked_tokens_cannot_be_marked_used() {
    let Some(pool) = configure_database().await else { return };
    let store = credentials(&pool);
    let alice = create_user(&store, "alice", "alice@example.com").await;
    let bob = create_user(&store, "bob", "bob@example.com").await;
    let refresh_tokens = PgRefreshTokenStore::new(pool);

    let outstanding = stored_record(&refresh_tokens, &alice).await;
    let consumed = stored_record(&refresh_tokens, &alice).await;
    let theirs = stored_record(&refresh_tokens, &bob).await;
    assert!(refresh_tokens.try_mark_used(&consumed.token).await.unwrap());

    assert_eq!(refresh_tokens.invalidate_all_for_user(alice.id).await.unwrap(), 1);
    assert!(!refresh_tokens.try_mark_used(&outstanding.token).await.unwrap());

    let outstanding = refresh_tokens.find_by_token(&outstanding.token).await.unwrap().unwrap();
    assert!(outstanding.invalidated && !outstanding.used);
    let theirs = refresh_tokens.find_by_token(&theirs.token).await.unwrap().unwrap();
    assert!(!theirs.invalidated);
}
