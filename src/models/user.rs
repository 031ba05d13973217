//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Identity anchor.
///
/// A user's own `(type_id, scope_id)` is itself a hierarchy anchor, used in
/// the "can I assign to myself" checks. The salt keys the user's bearer
/// tokens and is never exposed in responses or logs.
#[derive(Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub salt: String,
    pub type_id: i32,
    pub scope_id: Option<Uuid>,
    pub is_active: bool,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

redacted_debug!(User {
    show id,
    show email,
    redact_option password_hash,
    redact salt,
    show type_id,
    show scope_id,
    show is_active,
    show display_name,
});

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
