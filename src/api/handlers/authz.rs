//! Authorization handlers: permission checks and grant enumeration.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::dto::ResourceEntry;
use crate::api::middleware::auth::AuthUser;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::assignment::Assignment;
use crate::services::permission_service::PermissionService;

#[derive(OpenApi)]
#[openapi(
    paths(check, authorize_user_list, action_resources, action_resources_bulk),
    components(schemas(
        CheckRequest,
        CheckResponse,
        UserListRequest,
        UserListResponse,
        ActionResourcesResponse,
        BulkResourcesRequest,
        BulkResourcesResponse,
        ResourceEntry,
        Assignment,
    ))
)]
pub struct AuthzApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/check", post(check))
        .route("/users", post(authorize_user_list))
        .route("/resources", get(action_resources))
        .route("/resources/bulk", post(action_resources_bulk))
}

fn permission_service(state: &SharedState) -> PermissionService {
    PermissionService::new(state.db.clone(), state.directory.clone())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRequest {
    pub action: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResponse {
    pub allowed: bool,
    /// The assignments that granted access, for audit.
    pub assignments: Vec<Assignment>,
}

/// Check whether the calling user may perform an action on a resource
#[utoipa::path(
    post,
    path = "/check",
    context_path = "/api/v1/authz",
    tag = "authz",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Access granted", body = CheckResponse),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = []))
)]
pub async fn check(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>> {
    let assignments = permission_service(&state)
        .check_permission(
            &user,
            &request.action,
            &request.resource_type,
            request.resource_id,
        )
        .await?;

    Ok(Json(CheckResponse {
        allowed: true,
        assignments,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserListRequest {
    pub user_ids: Vec<Uuid>,
    pub actions: Vec<String>,
    pub scope_type: String,
    pub scope_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    /// Per user, the subset of requested actions they hold at the scope.
    pub users: HashMap<Uuid, Vec<String>>,
}

/// Determine which of the given actions each listed user holds at a scope
#[utoipa::path(
    post,
    path = "/users",
    context_path = "/api/v1/authz",
    tag = "authz",
    request_body = UserListRequest,
    responses(
        (status = 200, description = "Per-user action sets", body = UserListResponse),
        (status = 400, description = "Unknown scope level")
    ),
    security(("bearer_auth" = []))
)]
pub async fn authorize_user_list(
    State(state): State<SharedState>,
    Extension(AuthUser(_user)): Extension<AuthUser>,
    Json(request): Json<UserListRequest>,
) -> Result<Json<UserListResponse>> {
    let users = permission_service(&state)
        .authorize_user_list(
            &request.user_ids,
            &request.actions,
            &request.scope_type,
            request.scope_id,
        )
        .await?;

    Ok(Json(UserListResponse { users }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActionResourcesQuery {
    /// Comma-separated action names; omitted means all actions.
    pub actions: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResourcesResponse {
    /// Action name -> every resource the grant covers after hierarchy
    /// expansion.
    pub resources: HashMap<String, Vec<ResourceEntry>>,
}

fn parse_actions(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// Enumerate the calling user's grants, expanded down the hierarchy
#[utoipa::path(
    get,
    path = "/resources",
    context_path = "/api/v1/authz",
    tag = "authz",
    params(ActionResourcesQuery),
    responses(
        (status = 200, description = "Expanded grants", body = ActionResourcesResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn action_resources(
    State(state): State<SharedState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(query): Query<ActionResourcesQuery>,
) -> Result<Json<ActionResourcesResponse>> {
    let actions = parse_actions(query.actions.as_deref());
    let expanded = permission_service(&state)
        .action_resources_expanded(user.id, actions.as_deref())
        .await?;

    Ok(Json(ActionResourcesResponse {
        resources: expanded
            .into_iter()
            .map(|(action, refs)| (action, refs.into_iter().map(Into::into).collect()))
            .collect(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkResourcesRequest {
    pub user_ids: Vec<Uuid>,
    pub actions: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResourcesResponse {
    pub users: HashMap<Uuid, HashMap<String, Vec<ResourceEntry>>>,
}

/// Expanded grants for many users at once
#[utoipa::path(
    post,
    path = "/resources/bulk",
    context_path = "/api/v1/authz",
    tag = "authz",
    request_body = BulkResourcesRequest,
    responses(
        (status = 200, description = "Per-user expanded grants", body = BulkResourcesResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn action_resources_bulk(
    State(state): State<SharedState>,
    Extension(AuthUser(_user)): Extension<AuthUser>,
    Json(request): Json<BulkResourcesRequest>,
) -> Result<Json<BulkResourcesResponse>> {
    let expanded = permission_service(&state)
        .action_resources_bulk(&request.user_ids, request.actions.as_deref())
        .await?;

    Ok(Json(BulkResourcesResponse {
        users: expanded
            .into_iter()
            .map(|(user_id, per_action)| {
                let converted = per_action
                    .into_iter()
                    .map(|(action, refs)| {
                        (action, refs.into_iter().map(Into::into).collect())
                    })
                    .collect();
                (user_id, converted)
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(parse_actions(None), None);
        assert_eq!(
            parse_actions(Some("LIST_ROLES, LIST_USERS")),
            Some(vec!["LIST_ROLES".to_string(), "LIST_USERS".to_string()])
        );
        assert_eq!(parse_actions(Some("")), Some(vec![]));
    }
}
