/// Authentication Routes
///
/// Thin HTTP adapters over `AuthService`: validate the payload, run the
/// flow, render success as `{token, expiration, refresh_token}` and failure
/// as `{errors}`.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthOutcome, AuthService, Claims};
use crate::error::{AppError, ValidationError};
use crate::validators::{is_present_password, is_present_token, is_valid_email, is_valid_username};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct AuthSuccessResponse {
    pub token: String,
    pub expiration: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct RevokeResponse {
    pub revoked: u64,
}

/// Collects every failing check instead of stopping at the first one.
fn collect_errors(checks: Vec<Result<(), ValidationError>>) -> Result<(), AppError> {
    let errors: Vec<ValidationError> = checks.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn render(outcome: AuthOutcome, success: fn() -> actix_web::HttpResponseBuilder) -> HttpResponse {
    match outcome {
        Ok(issued) => success().json(AuthSuccessResponse {
            token: issued.access_token,
            expiration: issued.expiration.to_rfc3339(),
            refresh_token: issued.refresh_token,
        }),
        Err(failure) => failure.into_response(),
    }
}

/// POST /api/v1/users/register
///
/// # Errors
/// - 400: Invalid payload or password rejected by the credential store
/// - 409: Username or email already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let (username, email) = match (
        is_valid_username(&form.username),
        is_valid_email(&form.email),
        is_present_password(&form.password),
    ) {
        (Ok(username), Ok(email), Ok(())) => (username, email),
        (username, email, password) => {
            let errors = [username.err(), email.err(), password.err()]
                .into_iter()
                .flatten()
                .collect();
            return Err(AppError::Validation(errors));
        }
    };

    let outcome = auth.register(&username, &form.password, &email).await?;
    Ok(render(outcome, HttpResponse::Created))
}

/// POST /api/v1/users/login
///
/// # Errors
/// - 401: Wrong password
/// - 404: Unknown username
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    collect_errors(vec![
        is_present_token("username", &form.username),
        is_present_password(&form.password),
    ])?;

    let outcome = auth
        .login(form.username.trim(), &form.password, form.remember_me)
        .await?;
    Ok(render(outcome, HttpResponse::Ok))
}

/// POST /api/v1/users/refresh
///
/// Exchanges an expired access token and its paired refresh token for a
/// new pair. The refresh token is consumed on success.
///
/// # Errors
/// - 400: Token not yet expired, or refresh token expired/invalidated/used/mismatched
/// - 401: Access token signature or algorithm invalid
/// - 404: Refresh token unknown
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    collect_errors(vec![
        is_present_token("token", &form.token),
        is_present_token("refresh_token", &form.refresh_token),
    ])?;

    let outcome = auth.refresh(&form.token, &form.refresh_token).await?;
    Ok(render(outcome, HttpResponse::Ok))
}

/// POST /api/v1/users/revoke
///
/// **Requires a valid, unexpired access token.** Invalidates every
/// outstanding refresh token of the caller.
pub async fn revoke(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::Internal("Invalid user ID in token".to_string()))?;

    let revoked = auth.revoke_all(user_id).await?;
    Ok(HttpResponse::Ok().json(RevokeResponse { revoked }))
}
