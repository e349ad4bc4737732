/// Bearer token authentication middleware
///
/// Validates the access token from the Authorization header (expired tokens
/// are rejected) and injects its claims into request extensions.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::{TokenValidation, TokenValidator};

pub struct JwtMiddleware {
    validator: Arc<TokenValidator>,
}

impl JwtMiddleware {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            validator: self.validator.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    validator: Arc<TokenValidator>,
}

fn unauthorized(message: &'static str) -> Error {
    let response = HttpResponse::Unauthorized().json(serde_json::json!({
        "errors": [message],
        "code": "UNAUTHORIZED"
    }));
    actix_web::error::InternalError::from_response(message, response).into()
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);

        let token = match bearer {
            Some(token) => token,
            None => {
                tracing::warn!("Missing or invalid Authorization header");
                return Box::pin(async { Err(unauthorized("Missing or invalid authorization header")) });
            }
        };

        match self.validator.validate(&token, false) {
            TokenValidation::Valid(claims) => {
                tracing::debug!(user_id = %claims.id, "Bearer token validated");
                req.extensions_mut().insert(claims);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            TokenValidation::Invalid { reason } => {
                tracing::warn!(reason = %reason, "Bearer token rejected");
                Box::pin(async { Err(unauthorized("Invalid or expired token")) })
            }
        }
    }
}
