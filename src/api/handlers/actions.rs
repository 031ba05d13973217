//! Action catalog handlers.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::action::{Action, ActionGroup};

#[derive(OpenApi)]
#[openapi(
    paths(list_actions),
    components(schemas(ActionGroupResponse, ActionListResponse, ActionGroup, Action))
)]
pub struct ActionsApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(list_actions))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionGroupResponse {
    #[serde(flatten)]
    pub group: ActionGroup,
    pub actions: Vec<Action>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionListResponse {
    /// Groups in display order, each with its live actions in display order.
    pub groups: Vec<ActionGroupResponse>,
}

/// List the action catalog, grouped for display
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/actions",
    tag = "actions",
    responses(
        (status = 200, description = "Action groups with their actions", body = ActionListResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_actions(State(state): State<SharedState>) -> Result<Json<ActionListResponse>> {
    let groups: Vec<ActionGroup> = sqlx::query_as(
        r#"
        SELECT id, name, sort_order, created_at, deleted_at
        FROM action_groups
        WHERE deleted_at IS NULL
        ORDER BY sort_order
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    let actions: Vec<Action> = sqlx::query_as(
        r#"
        SELECT id, name, type_id, action_group_id, sort_order, created_at, deleted_at
        FROM actions
        WHERE deleted_at IS NULL
        ORDER BY sort_order
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(ActionListResponse {
        groups: group_actions(groups, actions),
    }))
}

/// Bucket actions under their groups, preserving the incoming sort order.
/// Actions pointing at a missing or soft-deleted group are dropped from the
/// catalog view.
fn group_actions(groups: Vec<ActionGroup>, actions: Vec<Action>) -> Vec<ActionGroupResponse> {
    let mut grouped: Vec<ActionGroupResponse> = groups
        .into_iter()
        .map(|group| ActionGroupResponse {
            group,
            actions: Vec::new(),
        })
        .collect();

    let index: std::collections::HashMap<Uuid, usize> = grouped
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.group.id, i))
        .collect();

    for action in actions {
        if let Some(&i) = index.get(&action.action_group_id) {
            grouped[i].actions.push(action);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn group(name: &str, order: i32) -> ActionGroup {
        ActionGroup {
            id: Uuid::new_v4(),
            name: name.to_string(),
            order,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn action(group_id: Uuid, name: &str, order: i32) -> Action {
        Action {
            id: Uuid::new_v4(),
            name: name.to_string(),
            type_id: 2,
            action_group_id: group_id,
            order,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_actions_bucketed_under_their_groups_in_order() {
        let admin = group("administration", 1);
        let listing = group("listing", 2);
        let actions = vec![
            action(admin.id, "CREATE_ROLE", 1),
            action(listing.id, "LIST_ROLES", 1),
            action(admin.id, "DELETE_ROLE", 2),
        ];

        let grouped = group_actions(vec![admin, listing], actions);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].group.name, "administration");
        let names: Vec<_> = grouped[0].actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["CREATE_ROLE", "DELETE_ROLE"]);
        assert_eq!(grouped[1].actions.len(), 1);
    }

    #[test]
    fn test_orphaned_action_is_dropped() {
        let admin = group("administration", 1);
        let orphan = action(Uuid::new_v4(), "GHOST", 1);
        let grouped = group_actions(vec![admin], vec![orphan]);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].actions.is_empty());
    }
}
