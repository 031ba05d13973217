//! Bearer token model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted bearer credential, keyed by the digest of the opaque blob.
///
/// The signed blob itself is returned to the caller exactly once at issuance
/// and never stored. Revocation is implicit via `valid_until` expiry; there
/// is no revoke list.
#[derive(Clone, FromRow, Serialize)]
pub struct Token {
    pub digest: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub ip: Option<String>,
}

redacted_debug!(Token {
    show digest,
    show user_id,
    show created_at,
    show valid_until,
    show ip,
});

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let token = Token {
            digest: "ab".repeat(32),
            user_id: Uuid::new_v4(),
            created_at: now - Duration::hours(1),
            valid_until: now,
            ip: None,
        };
        // valid_until == now counts as expired
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::seconds(1)));
    }
}
