//! Hierarchy level model and the in-memory type chain.
//!
//! The organizational hierarchy is a strictly linear chain of levels
//! (e.g. root -> partner -> customer -> group). A parent with two live
//! children is a fatal configuration error, never a recoverable one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::error::{AppError, Result};

/// A single rung in the level chain.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct TypeLevel {
    pub id: i32,
    pub name: String,
    pub parent_id: Option<i32>,
    /// Whether users and roles may be anchored at this level.
    pub assignable: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TypeLevel {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// The live level chain, ordered root-first.
///
/// Built from the live `types` rows; construction validates the single-child
/// invariant and fails with [`AppError::HierarchyCorrupt`] on violation.
#[derive(Debug, Clone)]
pub struct TypeChain {
    ordered: Vec<TypeLevel>,
}

impl TypeChain {
    /// Build the chain from live rows, root-first.
    ///
    /// Fails when two live levels share a parent, when there is no root, or
    /// when a level's parent does not exist (disconnected chain).
    pub fn from_rows(rows: Vec<TypeLevel>) -> Result<Self> {
        let live: Vec<TypeLevel> = rows.into_iter().filter(|t| !t.is_deleted()).collect();
        if live.is_empty() {
            return Err(AppError::HierarchyCorrupt("no live levels".into()));
        }

        let mut by_parent: HashMap<Option<i32>, Vec<&TypeLevel>> = HashMap::new();
        for t in &live {
            by_parent.entry(t.parent_id).or_default().push(t);
        }

        for (parent, children) in &by_parent {
            if children.len() > 1 {
                let names: Vec<&str> = children.iter().map(|t| t.name.as_str()).collect();
                return Err(AppError::HierarchyCorrupt(format!(
                    "levels {:?} share parent {:?}",
                    names, parent
                )));
            }
        }

        let mut ordered = Vec::with_capacity(live.len());
        let mut cursor = by_parent
            .get(&None)
            .and_then(|v| v.first())
            .copied()
            .ok_or_else(|| AppError::HierarchyCorrupt("no root level".into()))?;
        ordered.push(cursor.clone());
        while let Some(child) = by_parent
            .get(&Some(cursor.id))
            .and_then(|v| v.first())
            .copied()
        {
            ordered.push(child.clone());
            cursor = child;
        }

        if ordered.len() != live.len() {
            return Err(AppError::HierarchyCorrupt(
                "chain is disconnected from the root".into(),
            ));
        }

        Ok(Self { ordered })
    }

    /// All live levels, root-first.
    pub fn levels(&self) -> &[TypeLevel] {
        &self.ordered
    }

    pub fn by_id(&self, id: i32) -> Option<&TypeLevel> {
        self.ordered.iter().find(|t| t.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&TypeLevel> {
        self.ordered.iter().find(|t| t.name == name)
    }

    /// Level name at an ordinal distance from the root (root = 0).
    pub fn level_name(&self, index: usize) -> Option<&str> {
        self.ordered.get(index).map(|t| t.name.as_str())
    }

    /// Ordered descendants of a level, nearest first. Empty for the leaf.
    pub fn child_tree(&self, id: i32) -> Vec<&TypeLevel> {
        match self.ordered.iter().position(|t| t.id == id) {
            Some(pos) => self.ordered[pos + 1..].iter().collect(),
            None => Vec::new(),
        }
    }

    /// Ordered ancestors of a level, nearest first. Empty for the root.
    pub fn parent_tree(&self, id: i32) -> Vec<&TypeLevel> {
        match self.ordered.iter().position(|t| t.id == id) {
            Some(pos) => self.ordered[..pos].iter().rev().collect(),
            None => Vec::new(),
        }
    }

    /// Whether `ancestor` is `descendant` itself or any level above it.
    pub fn is_at_or_above(&self, ancestor: i32, descendant: i32) -> bool {
        ancestor == descendant || self.parent_tree(descendant).iter().any(|t| t.id == ancestor)
    }

    /// Whether `ancestor` is strictly above `descendant`.
    pub fn is_strict_ancestor(&self, ancestor: i32, descendant: i32) -> bool {
        ancestor != descendant && self.is_at_or_above(ancestor, descendant)
    }

    /// `[id] ∪ child_tree(id)`, as ids. Used by the role level guards.
    pub fn self_and_descendant_ids(&self, id: i32) -> Vec<i32> {
        let mut ids = vec![id];
        ids.extend(self.child_tree(id).iter().map(|t| t.id));
        ids
    }

    /// `[id] ∪ parent_tree(id)`, as ids. Used by permission resolution.
    pub fn self_and_ancestor_ids(&self, id: i32) -> Vec<i32> {
        let mut ids = vec![id];
        ids.extend(self.parent_tree(id).iter().map(|t| t.id));
        ids
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// root(1) -> partner(2) -> customer(3) -> group(4)
    pub fn sample_chain() -> TypeChain {
        TypeChain::from_rows(vec![
            level(1, "root", None),
            level(2, "partner", Some(1)),
            level(3, "customer", Some(2)),
            level(4, "group", Some(3)),
        ])
        .unwrap()
    }

    pub fn level(id: i32, name: &str, parent_id: Option<i32>) -> TypeLevel {
        TypeLevel {
            id,
            name: name.to_string(),
            parent_id,
            assignable: true,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{level, sample_chain};
    use super::*;

    // -----------------------------------------------------------------------
    // Chain construction and the single-child invariant
    // -----------------------------------------------------------------------

    #[test]
    fn test_chain_orders_root_first() {
        let chain = sample_chain();
        let names: Vec<&str> = chain.levels().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["root", "partner", "customer", "group"]);
    }

    #[test]
    fn test_branching_chain_is_fatal() {
        let err = TypeChain::from_rows(vec![
            level(1, "root", None),
            level(2, "partner", Some(1)),
            level(3, "reseller", Some(1)),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::HierarchyCorrupt(_)));
    }

    #[test]
    fn test_soft_deleted_child_does_not_branch() {
        let mut reseller = level(3, "reseller", Some(1));
        reseller.deleted_at = Some(Utc::now());
        let chain = TypeChain::from_rows(vec![
            level(1, "root", None),
            level(2, "partner", Some(1)),
            reseller,
        ])
        .unwrap();
        assert_eq!(chain.levels().len(), 2);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let err = TypeChain::from_rows(vec![level(2, "partner", Some(1))]).unwrap_err();
        assert!(matches!(err, AppError::HierarchyCorrupt(_)));
    }

    #[test]
    fn test_disconnected_chain_is_fatal() {
        let err = TypeChain::from_rows(vec![
            level(1, "root", None),
            level(3, "customer", Some(99)),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::HierarchyCorrupt(_)));
    }

    // -----------------------------------------------------------------------
    // Tree walks
    // -----------------------------------------------------------------------

    #[test]
    fn test_child_tree() {
        let chain = sample_chain();
        let below_partner: Vec<&str> =
            chain.child_tree(2).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(below_partner, vec!["customer", "group"]);
        assert!(chain.child_tree(4).is_empty());
    }

    #[test]
    fn test_parent_tree_nearest_first() {
        let chain = sample_chain();
        let above_group: Vec<&str> =
            chain.parent_tree(4).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(above_group, vec!["customer", "partner", "root"]);
        assert!(chain.parent_tree(1).is_empty());
    }

    #[test]
    fn test_level_name_by_ordinal() {
        let chain = sample_chain();
        assert_eq!(chain.level_name(0), Some("root"));
        assert_eq!(chain.level_name(2), Some("customer"));
        assert_eq!(chain.level_name(4), None);
    }

    #[test]
    fn test_ancestry_predicates() {
        let chain = sample_chain();
        assert!(chain.is_at_or_above(2, 2));
        assert!(chain.is_at_or_above(1, 4));
        assert!(!chain.is_at_or_above(3, 2));
        assert!(chain.is_strict_ancestor(2, 3));
        assert!(!chain.is_strict_ancestor(3, 3));
    }

    #[test]
    fn test_self_and_descendant_ids() {
        let chain = sample_chain();
        assert_eq!(chain.self_and_descendant_ids(3), vec![3, 4]);
        assert_eq!(chain.self_and_ancestor_ids(3), vec![3, 2, 1]);
    }
}
