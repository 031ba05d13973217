//! Shared data transfer objects.
//!
//! Each operation exposes only the fields legal for it; immutable fields
//! simply have no place to be sent.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::user::User;

/// A resource position in the hierarchy. `id = null` covers the whole level.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: Option<Uuid>,
}

impl From<(String, Option<Uuid>)> for ResourceEntry {
    fn from((resource_type, id): (String, Option<Uuid>)) -> Self {
        Self { resource_type, id }
    }
}

/// Public view of a user. Credentials never leave the service.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub type_id: i32,
    pub scope_id: Option<Uuid>,
    pub is_active: bool,
    pub display_name: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            type_id: user.type_id,
            scope_id: user.scope_id,
            is_active: user.is_active,
            display_name: user.display_name,
        }
    }
}
