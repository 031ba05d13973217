//! Health check handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::SharedState;

#[derive(OpenApi)]
#[openapi(paths(health_check, readiness_check), components(schemas(HealthResponse)))]
pub struct HealthApiDoc;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is alive", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check - verifies database connectivity
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn readiness_check(
    State(state): State<SharedState>,
) -> (StatusCode, Json<HealthResponse>) {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready".to_string(),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded".to_string(),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    use crate::api::AppState;
    use crate::config::Config;
    use crate::error::{AppError, Result};
    use crate::services::directory::{Context, ResourceDirectory, ResourceInfo};

    struct UnusedDirectory;

    #[async_trait]
    impl ResourceDirectory for UnusedDirectory {
        async fn get_context(&self, _: &str, _: Uuid) -> Result<Context> {
            Err(AppError::Directory("unused".to_string()))
        }
        async fn get_downward_hierarchy(&self, _: Option<&str>, _: Option<Uuid>) -> Result<Value> {
            Err(AppError::Directory("unused".to_string()))
        }
        async fn get_resources_info(
            &self,
            _: &[(String, Uuid)],
        ) -> Result<HashMap<Uuid, ResourceInfo>> {
            Err(AppError::Directory("unused".to_string()))
        }
    }

    fn state_with_unreachable_db() -> SharedState {
        let config = Config {
            database_url: "postgres://nobody@127.0.0.1:1/none".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            log_level: "info".to_string(),
            directory_url: "http://127.0.0.1:1".to_string(),
            directory_timeout_secs: 1,
            token_ttl_hours: 168,
        };
        let db = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(2))
            .connect_lazy(&config.database_url)
            .unwrap();
        Arc::new(AppState::new(config, db, Arc::new(UnusedDirectory)))
    }

    // -----------------------------------------------------------------------
    // Readiness reports database failures
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_readiness_returns_503_when_db_unreachable() {
        let (status, body) = readiness_check(State(state_with_unreachable_db())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
    }

    #[tokio::test]
    async fn test_liveness_is_unconditional() {
        let body = health_check().await;
        assert_eq!(body.status, "ok");
    }
}
