use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::configuration::{Settings, StorageBackend};
use crate::error::{AppError, ConfigError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, refresh, register, revoke};
use crate::store::{
    CredentialStore, InMemoryCredentialStore, InMemoryRefreshTokenStore, PgCredentialStore,
    PgRefreshTokenStore, RefreshTokenStore,
};

/// Wires the configured store adapters into an `AuthService` and seeds the
/// default user when one is configured.
pub async fn build_auth_service(settings: &Settings) -> Result<AuthService, AppError> {
    settings.validate()?;

    let (credentials, refresh_tokens): (Arc<dyn CredentialStore>, Arc<dyn RefreshTokenStore>) =
        match settings.application.storage {
            StorageBackend::Postgres => {
                let database = settings.database.as_ref().ok_or_else(|| {
                    ConfigError::InvalidValue("missing database settings".to_string())
                })?;

                tracing::info!("Attempting to connect to database");
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(&database.connection_string())
                    .await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database connection pool created and migrated");

                (
                    Arc::new(PgCredentialStore::new(
                        pool.clone(),
                        settings.password_policy.clone(),
                    )),
                    Arc::new(PgRefreshTokenStore::new(pool)),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; all data is lost on shutdown");
                (
                    Arc::new(InMemoryCredentialStore::new(settings.password_policy.clone())),
                    Arc::new(InMemoryRefreshTokenStore::new()),
                )
            }
        };

    let auth = AuthService::new(settings.jwt.clone(), credentials, refresh_tokens);

    if let Some(default_user) = &settings.default_user {
        auth.ensure_default_user(default_user).await?;
    }

    Ok(auth)
}

pub fn run(listener: TcpListener, auth: AuthService) -> Result<Server, std::io::Error> {
    let validator = auth.validator();
    let auth = web::Data::new(auth);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(auth.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1/users")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .service(
                        web::resource("/revoke")
                            .wrap(JwtMiddleware::new(validator.clone()))
                            .route(web::post().to(revoke)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
