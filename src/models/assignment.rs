//! Assignment model: a role granted to a user at a hierarchy anchor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Grants a role to a user at a specific `(type_id, resource_id)` anchor.
///
/// `resource_id = NULL` is a blanket assignment covering the entire level,
/// including resources created after the grant. Duplicate live assignments
/// for the same `(user, role, type, resource)` are reused, never duplicated.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Assignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub type_id: i32,
    pub resource_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether this assignment covers the whole level rather than one resource.
    pub fn is_blanket(&self) -> bool {
        self.resource_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blanket_assignment() {
        let a = Assignment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            type_id: 3,
            resource_id: None,
            created_at: Utc::now(),
            deleted_at: None,
        };
        assert!(a.is_blanket());
        assert!(!a.is_deleted());
    }
}
