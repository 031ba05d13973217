//! Action and action group models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Well-known action names consumed by the service itself.
pub mod names {
    pub const CREATE_ROLE: &str = "CREATE_ROLE";
    pub const EDIT_ROLES: &str = "EDIT_ROLES";
    pub const EDIT_OWN_ROLES: &str = "EDIT_OWN_ROLES";
    pub const EDIT_SUBLEVEL_ROLES: &str = "EDIT_SUBLEVEL_ROLES";
    pub const DELETE_ROLE: &str = "DELETE_ROLE";
    pub const LIST_ROLES: &str = "LIST_ROLES";
    pub const LIST_USERS: &str = "LIST_USERS";
    pub const ASSIGN_ROLES: &str = "ASSIGN_ROLES";
}

/// A display/ordering grouping of actions.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ActionGroup {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "sort_order")]
    #[serde(rename = "order")]
    pub order: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A single permission verb, meaningful at one hierarchy level.
///
/// Soft-deleted actions are excluded from resolution and role-editing views.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Action {
    pub id: Uuid,
    pub name: String,
    /// The level at which this verb is meaningful.
    pub type_id: i32,
    pub action_group_id: Uuid,
    #[sqlx(rename = "sort_order")]
    #[serde(rename = "order")]
    pub order: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Action {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
