//! Authentication handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::api::dto::UserResponse;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::services::token_service::TokenService;

#[derive(OpenApi)]
#[openapi(
    paths(login),
    components(schemas(LoginRequest, LoginResponse, UserResponse))
)]
pub struct AuthApiDoc;

/// Public auth routes (no token required)
pub fn public_router() -> Router<SharedState> {
    Router::new().route("/login", post(login))
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

redacted_debug!(LoginRequest {
    show email,
    redact password,
});

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Opaque bearer token. Returned exactly once; never persisted.
    pub token: String,
    pub valid_until: DateTime<Utc>,
    pub user: UserResponse,
}

/// Log in with email and password, receiving a bearer token
#[utoipa::path(
    post,
    path = "/login",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(credentials): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(|s| s.trim().to_string());

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user: User = sqlx::query_as(
        r#"
        SELECT id, email, password_hash, salt, type_id, scope_id,
               is_active, display_name, created_at, deleted_at
        FROM users
        WHERE email = $1 AND deleted_at IS NULL AND is_active = true
        "#,
    )
    .bind(&credentials.email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?
    .ok_or_else(invalid)?;

    let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    let verified = bcrypt::verify(&credentials.password, hash)
        .map_err(|e| AppError::Internal(format!("password verification failed: {e}")))?;
    if !verified {
        return Err(invalid());
    }

    let token_service = TokenService::new(state.db.clone(), Arc::new(state.config.clone()));
    let (blob, record) = token_service.issue(&user, ip, "local", false).await?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        token: blob,
        valid_until: record.valid_until,
        user: user.into(),
    }))
}
