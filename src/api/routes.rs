//! Route definitions for the API.

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::middleware::auth::auth_middleware;
use super::SharedState;
use crate::services::token_service::TokenService;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        // OpenAPI spec (served by SwaggerUi at /api/v1/openapi.json) and Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", openapi))
        .nest("/api/v1", api_v1_routes(state.clone()))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: SharedState) -> Router<SharedState> {
    // Token resolution state shared by the auth middleware
    let token_service = Arc::new(TokenService::new(
        state.db.clone(),
        Arc::new(state.config.clone()),
    ));

    Router::new()
        // Login is the only route reachable without a token
        .nest("/auth", handlers::auth::public_router())
        .nest(
            "/authz",
            handlers::authz::router().layer(middleware::from_fn_with_state(
                token_service.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/roles",
            handlers::roles::router().layer(middleware::from_fn_with_state(
                token_service.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/types",
            handlers::types::router().layer(middleware::from_fn_with_state(
                token_service.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/actions",
            handlers::actions::router().layer(middleware::from_fn_with_state(
                token_service,
                auth_middleware,
            )),
        )
}
