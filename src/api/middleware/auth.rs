//! Authentication middleware.
//!
//! Extracts the opaque bearer token from `Authorization: Bearer <token>`,
//! resolves it through the token service, and stores the resolved user as a
//! request extension for handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::models::user::User;
use crate::services::token_service::TokenService;

/// Extension that holds the authenticated user.
#[derive(Clone)]
pub struct AuthUser(pub User);

fn extract_bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Authentication middleware function - requires a valid bearer token.
pub async fn auth_middleware(
    State(token_service): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(blob) = extract_bearer(&request) else {
        return AppError::Unauthorized("Missing bearer token".to_string()).into_response();
    };

    match token_service.resolve(blob).await {
        Ok(user) => {
            request.extensions_mut().insert(AuthUser(user));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
