//! Hierarchy level handlers.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::SharedState;
use crate::error::Result;
use crate::models::hierarchy::TypeLevel;
use crate::services::hierarchy_service::HierarchyService;

#[derive(OpenApi)]
#[openapi(paths(list_types), components(schemas(TypeListResponse, TypeLevel)))]
pub struct TypesApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(list_types))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TypeListResponse {
    /// Levels ordered root-first.
    pub types: Vec<TypeLevel>,
}

/// List the hierarchy levels, root first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/types",
    tag = "types",
    responses(
        (status = 200, description = "Hierarchy levels", body = TypeListResponse),
        (status = 500, description = "Corrupt hierarchy configuration")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_types(State(state): State<SharedState>) -> Result<Json<TypeListResponse>> {
    let types = HierarchyService::new(state.db.clone()).list_types().await?;
    Ok(Json(TypeListResponse { types }))
}
