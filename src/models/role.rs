//! Role model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Well-known system role tag. Unique among live roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "role_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RolePurpose {
    RootAdmin,
    PartnerAdmin,
    CustomerAdmin,
    ReadOnly,
}

/// A named, reusable bundle of actions.
///
/// `type_id` is the level the role itself is scoped to; `lvl_id` is the
/// deepest level of actions the role may grant (at or below `type_id`).
/// `scope_id = NULL` means the role is anchored at the root.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub type_id: i32,
    pub lvl_id: i32,
    pub scope_id: Option<Uuid>,
    /// Visible/assignable by other principals within the same type subtree
    /// and resource context.
    pub shared: bool,
    pub is_active: bool,
    pub purpose: Option<RolePurpose>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_purpose_serialization() {
        let json = serde_json::to_value(RolePurpose::PartnerAdmin).unwrap();
        assert_eq!(json, "partner_admin");
        let back: RolePurpose = serde_json::from_value(json).unwrap();
        assert_eq!(back, RolePurpose::PartnerAdmin);
    }

    #[test]
    fn test_deleted_at_not_serialized() {
        let role = Role {
            id: Uuid::nil(),
            name: "auditor".to_string(),
            type_id: 2,
            lvl_id: 3,
            scope_id: None,
            shared: true,
            is_active: true,
            purpose: Some(RolePurpose::ReadOnly),
            created_at: Utc::now(),
            deleted_at: Some(Utc::now()),
        };
        assert!(role.is_deleted());
        let json = serde_json::to_value(&role).unwrap();
        assert!(json.get("deleted_at").is_none());
        assert_eq!(json["purpose"], "read_only");
    }
}
