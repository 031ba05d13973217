//! Hierarchy service: loads the live type chain from the database.
//!
//! The chain is read-mostly; levels change only through administrative
//! seeding, so it is loaded fresh per operation rather than cached.

use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::hierarchy::{TypeChain, TypeLevel};

pub struct HierarchyService {
    db: PgPool,
}

impl HierarchyService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Load the live chain. Fails with `HierarchyCorrupt` when the live
    /// rows branch or are disconnected; that aborts the calling operation.
    pub async fn load_chain(&self) -> Result<TypeChain> {
        let rows: Vec<TypeLevel> = sqlx::query_as(
            r#"
            SELECT id, name, parent_id, assignable, created_at, deleted_at
            FROM types
            WHERE deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        TypeChain::from_rows(rows)
    }

    /// Live levels ordered root-first, for the administrative type listing.
    pub async fn list_types(&self) -> Result<Vec<TypeLevel>> {
        let chain = self.load_chain().await?;
        Ok(chain.levels().to_vec())
    }
}
