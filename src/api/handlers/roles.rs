//! Role administration handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::middleware::auth::AuthUser;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::action::Action;
use crate::models::assignment::Assignment;
use crate::models::role::{Role, RolePurpose};
use crate::models::user::User;
use crate::services::role_service::{NewAssignment, NewRole, RoleChanges, RoleService};

#[derive(OpenApi)]
#[openapi(
    paths(
        list_roles,
        create_role,
        get_role,
        edit_role,
        delete_role,
        list_assignments,
        grant_role,
        revoke_role,
    ),
    components(schemas(
        CreateRoleRequest,
        EditRoleRequest,
        GrantRoleRequest,
        RoleResponse,
        AssignableRoleResponse,
        RoleListResponse,
        AssignmentListResponse,
        Role,
        RolePurpose,
        Action,
        Assignment,
    ))
)]
pub struct RolesApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route(
            "/:id",
            get(get_role).put(edit_role).delete(delete_role),
        )
        .route("/:id/assignments", get(list_assignments).post(grant_role))
        .route("/:id/assignments/:assignment_id", delete(revoke_role))
}

fn role_service(state: &SharedState) -> RoleService {
    RoleService::new(state.db.clone(), state.directory.clone())
}

async fn fetch_user(state: &SharedState, user_id: Uuid) -> Result<User> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, email, password_hash, salt, type_id, scope_id,
               is_active, display_name, created_at, deleted_at
        FROM users
        WHERE id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?
    .ok_or_else(|| AppError::NotFound("user not found".to_string()))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: Role,
    pub actions: Vec<Action>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignableRoleResponse {
    #[serde(flatten)]
    pub role: Role,
    /// Directory display name of the role's scope resource, when known.
    pub scope_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleListResponse {
    pub roles: Vec<AssignableRoleResponse>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRolesQuery {
    /// List roles assignable to this user instead of the caller.
    pub target_user_id: Option<Uuid>,
}

/// List roles assignable to the caller or to a target user
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(ListRolesQuery),
    responses(
        (status = 200, description = "Assignable roles", body = RoleListResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<SharedState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Query(query): Query<ListRolesQuery>,
) -> Result<Json<RoleListResponse>> {
    let target = match query.target_user_id {
        Some(id) if id != caller.id => fetch_user(&state, id).await?,
        _ => caller.clone(),
    };

    let roles = role_service(&state)
        .list_assignable_roles(&caller, &target)
        .await?
        .into_iter()
        .map(|entry| AssignableRoleResponse {
            role: entry.role,
            scope_name: entry.scope_name,
        })
        .collect();
    Ok(Json(RoleListResponse { roles }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
    pub type_id: i32,
    pub lvl_id: i32,
    pub scope_id: Option<Uuid>,
    #[serde(default)]
    pub shared: bool,
    pub purpose: Option<RolePurpose>,
    #[serde(default)]
    pub action_ids: Vec<Uuid>,
}

/// Create a role
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/roles",
    tag = "roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 200, description = "Role created", body = RoleResponse),
        (status = 400, description = "Invalid level or action set"),
        (status = 403, description = "Access denied"),
        (status = 409, description = "Duplicate role name at this scope")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<SharedState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Json(request): Json<CreateRoleRequest>,
) -> Result<Json<RoleResponse>> {
    let service = role_service(&state);
    let role = service
        .create_role(
            &caller,
            &NewRole {
                name: request.name,
                type_id: request.type_id,
                lvl_id: request.lvl_id,
                scope_id: request.scope_id,
                shared: request.shared,
                purpose: request.purpose,
                action_ids: request.action_ids,
            },
        )
        .await?;
    let actions = service.role_actions(role.id).await?;
    Ok(Json(RoleResponse { role, actions }))
}

/// Get a role and its actions
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role detail", body = RoleResponse),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<SharedState>,
    Extension(AuthUser(_caller)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoleResponse>> {
    let service = role_service(&state);
    let role = service.get_role(id).await?;
    let actions = service.role_actions(role.id).await?;
    Ok(Json(RoleResponse { role, actions }))
}

#[derive(Debug, Deserialize, ToSchema, Default)]
pub struct EditRoleRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub shared: Option<bool>,
    #[serde(default)]
    pub enable_actions: Vec<Uuid>,
    #[serde(default)]
    pub disable_actions: Vec<Uuid>,
}

/// Edit a role's fields and toggle its actions
#[utoipa::path(
    put,
    path = "/{id}",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = EditRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 400, description = "Action above the role's level"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn edit_role(
    State(state): State<SharedState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<EditRoleRequest>,
) -> Result<Json<RoleResponse>> {
    let service = role_service(&state);
    let role = service
        .edit_role(
            &caller,
            id,
            &RoleChanges {
                name: request.name,
                is_active: request.is_active,
                shared: request.shared,
                enable_actions: request.enable_actions,
                disable_actions: request.disable_actions,
            },
        )
        .await?;
    let actions = service.role_actions(role.id).await?;
    Ok(Json(RoleResponse { role, actions }))
}

/// Soft-delete a role
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<SharedState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode> {
    role_service(&state).delete_role(&caller, id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignmentListResponse {
    pub assignments: Vec<Assignment>,
}

/// List a role's live assignments
#[utoipa::path(
    get,
    path = "/{id}/assignments",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Assignments", body = AssignmentListResponse),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_assignments(
    State(state): State<SharedState>,
    Extension(AuthUser(_caller)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentListResponse>> {
    let service = role_service(&state);
    service.get_role(id).await?;
    let assignments = service.list_role_assignments(id).await?;
    Ok(Json(AssignmentListResponse { assignments }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantRoleRequest {
    pub user_id: Uuid,
    pub type_id: i32,
    /// Omit for a blanket assignment covering the whole level.
    pub resource_id: Option<Uuid>,
}

/// Grant the role to a user at a hierarchy anchor (idempotent)
#[utoipa::path(
    post,
    path = "/{id}/assignments",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = GrantRoleRequest,
    responses(
        (status = 200, description = "Assignment (new or existing)", body = Assignment),
        (status = 400, description = "Unknown level or inactive role"),
        (status = 403, description = "Access denied")
    ),
    security(("bearer_auth" = []))
)]
pub async fn grant_role(
    State(state): State<SharedState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<GrantRoleRequest>,
) -> Result<Json<Assignment>> {
    let assignment = role_service(&state)
        .grant_role(
            &caller,
            &NewAssignment {
                user_id: request.user_id,
                role_id: id,
                type_id: request.type_id,
                resource_id: request.resource_id,
            },
        )
        .await?;
    Ok(Json(assignment))
}

/// Revoke an assignment
#[utoipa::path(
    delete,
    path = "/{id}/assignments/{assignment_id}",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(
        ("id" = Uuid, Path, description = "Role id"),
        ("assignment_id" = Uuid, Path, description = "Assignment id")
    ),
    responses(
        (status = 204, description = "Assignment revoked"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Assignment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_role(
    State(state): State<SharedState>,
    Extension(AuthUser(caller)): Extension<AuthUser>,
    Path((_id, assignment_id)): Path<(Uuid, Uuid)>,
) -> Result<axum::http::StatusCode> {
    role_service(&state).revoke_role(&caller, assignment_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
