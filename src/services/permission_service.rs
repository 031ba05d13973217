//! Permission resolution engine.
//!
//! Decides whether an action on a resource is allowed for a user, enumerates
//! a user's direct grants, and expands them down the hierarchy so that a
//! grant at (say) the partner level also covers every customer and group
//! beneath it. All checks are read-only; every failure is terminal for the
//! request, there are no retries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::assignment::Assignment;
use crate::models::hierarchy::TypeChain;
use crate::models::user::User;
use crate::services::directory::{flatten_context, Context, ResourceDirectory};
use crate::services::hierarchy_service::HierarchyService;

/// A direct grant: one (resource, level, action) triple from the base join,
/// before hierarchy expansion.
#[derive(Debug, Clone, FromRow)]
pub struct GrantRow {
    pub user_id: Uuid,
    pub resource_id: Option<Uuid>,
    pub type_id: i32,
    pub action_name: String,
}

/// A resource position in the hierarchy: level name plus the resource id,
/// where `None` means the whole level.
pub type ResourceRef = (String, Option<Uuid>);

/// Expanded grants, grouped by action name.
pub type ActionResources = BTreeMap<String, Vec<ResourceRef>>;

pub struct PermissionService {
    db: PgPool,
    directory: Arc<dyn ResourceDirectory>,
    hierarchy: HierarchyService,
}

impl PermissionService {
    pub fn new(db: PgPool, directory: Arc<dyn ResourceDirectory>) -> Self {
        let hierarchy = HierarchyService::new(db.clone());
        Self {
            db,
            directory,
            hierarchy,
        }
    }

    /// Decide whether `user` may perform `action` on the given resource.
    ///
    /// Returns the matching live assignments (the audit trail of why access
    /// was granted) or `Forbidden`. A directory-side "invalid resource" is
    /// indistinguishable from "no access" on this path, so unauthorized
    /// callers cannot probe for resource existence.
    pub async fn check_permission(
        &self,
        user: &User,
        action: &str,
        resource_type: &str,
        resource_id: Option<Uuid>,
    ) -> Result<Vec<Assignment>> {
        let chain = self.hierarchy.load_chain().await?;

        let context = match resource_id {
            Some(rid) => match self.directory.get_context(resource_type, rid).await {
                Ok(context) => context,
                Err(AppError::NotFound(_)) | Err(AppError::WrongArguments(_)) => {
                    return Err(AppError::Forbidden)
                }
                Err(e) => return Err(e),
            },
            None => Context::new(),
        };

        // The scope level sits one below the deepest context key. When the
        // requested type does not line up with the context keys, the check
        // degrades to a level/context one: the resource filter below only
        // ever consults ids the directory vouched for.
        let scope = chain
            .level_name(context.len())
            .and_then(|name| chain.by_name(name))
            .ok_or_else(|| {
                AppError::WrongArguments(format!(
                    "no hierarchy level at depth {}",
                    context.len()
                ))
            })?;

        let ancestor_ids = chain.self_and_ancestor_ids(scope.id);
        let context_values = flatten_context(&context);

        let assignments = self
            .matching_assignments(user.id, action, &ancestor_ids, &context_values)
            .await?;

        if assignments.is_empty() {
            return Err(AppError::Forbidden);
        }
        Ok(assignments)
    }

    /// Live assignments joined through an active role to a live action named
    /// `action`, anchored at one of `ancestor_ids`. With an empty context the
    /// anchor must be a blanket; otherwise blankets and context resources
    /// both match.
    async fn matching_assignments(
        &self,
        user_id: Uuid,
        action: &str,
        ancestor_ids: &[i32],
        context_values: &[Uuid],
    ) -> Result<Vec<Assignment>> {
        const BASE: &str = r#"
            SELECT a.id, a.user_id, a.role_id, a.type_id, a.resource_id,
                   a.created_at, a.deleted_at
            FROM assignments a
            JOIN roles r ON r.id = a.role_id
                AND r.deleted_at IS NULL AND r.is_active
            JOIN role_actions ra ON ra.role_id = r.id
            JOIN actions act ON act.id = ra.action_id
                AND act.deleted_at IS NULL
            WHERE a.deleted_at IS NULL
              AND a.user_id = $1
              AND act.name = $2
              AND a.type_id = ANY($3)
        "#;

        let assignments: Vec<Assignment> = if context_values.is_empty() {
            sqlx::query_as(&format!("{BASE} AND a.resource_id IS NULL"))
                .bind(user_id)
                .bind(action)
                .bind(ancestor_ids)
                .fetch_all(&self.db)
                .await
        } else {
            sqlx::query_as(&format!(
                "{BASE} AND (a.resource_id IS NULL OR a.resource_id = ANY($4))"
            ))
            .bind(user_id)
            .bind(action)
            .bind(ancestor_ids)
            .bind(context_values)
            .fetch_all(&self.db)
            .await
        }
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(assignments)
    }

    /// A user's direct grants, unexpanded, optionally filtered to a set of
    /// action names.
    pub async fn action_resources(
        &self,
        user_id: Uuid,
        actions: Option<&[String]>,
    ) -> Result<Vec<GrantRow>> {
        self.grant_rows(&[user_id], actions).await
    }

    /// Direct grants expanded down the hierarchy, grouped by action.
    pub async fn action_resources_expanded(
        &self,
        user_id: Uuid,
        actions: Option<&[String]>,
    ) -> Result<ActionResources> {
        let grants = self.action_resources(user_id, actions).await?;
        if grants.is_empty() {
            return Ok(ActionResources::new());
        }

        let chain = self.hierarchy.load_chain().await?;
        let tree = self.directory.get_downward_hierarchy(None, None).await?;
        Ok(expand_grants(&chain, &tree, &grants))
    }

    /// Bulk expansion for many users: one base query, one hierarchy fetch.
    pub async fn action_resources_bulk(
        &self,
        user_ids: &[Uuid],
        actions: Option<&[String]>,
    ) -> Result<HashMap<Uuid, ActionResources>> {
        let rows = self.grant_rows(user_ids, actions).await?;

        let mut result: HashMap<Uuid, ActionResources> = user_ids
            .iter()
            .map(|id| (*id, ActionResources::new()))
            .collect();
        if rows.is_empty() {
            return Ok(result);
        }

        let chain = self.hierarchy.load_chain().await?;
        let tree = self.directory.get_downward_hierarchy(None, None).await?;

        let mut per_user: HashMap<Uuid, Vec<GrantRow>> = HashMap::new();
        for row in rows {
            per_user.entry(row.user_id).or_default().push(row);
        }
        for (user_id, grants) in per_user {
            result.insert(user_id, expand_grants(&chain, &tree, &grants));
        }
        Ok(result)
    }

    /// For a fixed scope, determine which of `actions` each listed user
    /// holds there, honoring blanket grants and grants anchored at any
    /// ancestor level of the scope.
    pub async fn authorize_user_list(
        &self,
        user_ids: &[Uuid],
        actions: &[String],
        scope_type: &str,
        scope_id: Option<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<String>>> {
        let chain = self.hierarchy.load_chain().await?;
        let scope = chain
            .by_name(scope_type)
            .ok_or_else(|| AppError::WrongArguments(format!("unknown level '{scope_type}'")))?;
        let ancestor_ids = chain.self_and_ancestor_ids(scope.id);

        let context = match scope_id {
            Some(id) => match self.directory.get_context(scope_type, id).await {
                Ok(context) => context,
                Err(AppError::NotFound(_)) | Err(AppError::WrongArguments(_)) => {
                    return Err(AppError::Forbidden)
                }
                Err(e) => return Err(e),
            },
            None => Context::new(),
        };
        let context_values = flatten_context(&context);

        const BASE: &str = r#"
            SELECT DISTINCT a.user_id, act.name AS action_name
            FROM assignments a
            JOIN roles r ON r.id = a.role_id
                AND r.deleted_at IS NULL AND r.is_active
            JOIN role_actions ra ON ra.role_id = r.id
            JOIN actions act ON act.id = ra.action_id
                AND act.deleted_at IS NULL
            WHERE a.deleted_at IS NULL
              AND a.user_id = ANY($1)
              AND act.name = ANY($2)
              AND a.type_id = ANY($3)
        "#;

        #[derive(FromRow)]
        struct UserActionRow {
            user_id: Uuid,
            action_name: String,
        }

        let rows: Vec<UserActionRow> = if context_values.is_empty() {
            sqlx::query_as(&format!("{BASE} AND a.resource_id IS NULL"))
                .bind(user_ids)
                .bind(actions)
                .bind(&ancestor_ids)
                .fetch_all(&self.db)
                .await
        } else {
            sqlx::query_as(&format!(
                "{BASE} AND (a.resource_id IS NULL OR a.resource_id = ANY($4))"
            ))
            .bind(user_ids)
            .bind(actions)
            .bind(&ancestor_ids)
            .bind(&context_values)
            .fetch_all(&self.db)
            .await
        }
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut result: HashMap<Uuid, Vec<String>> = user_ids
            .iter()
            .map(|id| (*id, Vec::new()))
            .collect();
        for row in rows {
            result.entry(row.user_id).or_default().push(row.action_name);
        }
        Ok(result)
    }

    async fn grant_rows(
        &self,
        user_ids: &[Uuid],
        actions: Option<&[String]>,
    ) -> Result<Vec<GrantRow>> {
        let rows: Vec<GrantRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT a.user_id, a.resource_id, a.type_id,
                   act.name AS action_name
            FROM assignments a
            JOIN roles r ON r.id = a.role_id
                AND r.deleted_at IS NULL AND r.is_active
            JOIN role_actions ra ON ra.role_id = r.id
            JOIN actions act ON act.id = ra.action_id
                AND act.deleted_at IS NULL
            WHERE a.deleted_at IS NULL
              AND a.user_id = ANY($1)
              AND ($2::text[] IS NULL OR act.name = ANY($2))
            "#,
        )
        .bind(user_ids)
        .bind(actions.map(|a| a.to_vec()))
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Hierarchy expansion
// ---------------------------------------------------------------------------

/// Expand direct grants down the hierarchy tree.
///
/// Each grant contributes its own anchor plus every descendant position in
/// the directory tree: a grant at a specific resource expands from that
/// resource's node, a blanket grant expands from the root of its whole
/// level. The result is an order-preserving deduplicated set, grouped by
/// action name.
pub fn expand_grants(chain: &TypeChain, tree: &Value, grants: &[GrantRow]) -> ActionResources {
    let mut out = ActionResources::new();
    let mut seen: HashMap<String, HashSet<ResourceRef>> = HashMap::new();

    for grant in grants {
        let Some(level) = chain.by_id(grant.type_id).map(|t| t.name.clone()) else {
            continue;
        };

        let entries = out.entry(grant.action_name.clone()).or_default();
        let dedup = seen.entry(grant.action_name.clone()).or_default();
        let mut push = |entry: ResourceRef, entries: &mut Vec<ResourceRef>| {
            if dedup.insert(entry.clone()) {
                entries.push(entry);
            }
        };

        push((level.clone(), grant.resource_id), entries);

        let mut found = Vec::new();
        collect_expansion(tree, &level, grant.resource_id, &mut found);
        for (lvl, id) in found {
            push((lvl, Some(id)), entries);
        }
    }

    out
}

/// Walk the directory tree. For a specific anchor id, collect everything
/// strictly below its node; for a blanket anchor (`id = None`), collect every
/// id at the level itself plus everything below each of them.
fn collect_expansion(node: &Value, level: &str, id: Option<Uuid>, out: &mut Vec<(String, Uuid)>) {
    let Some(obj) = node.as_object() else { return };

    for (lvl, subtree) in obj {
        match subtree {
            Value::Object(children) => {
                for (key, child) in children {
                    let Ok(child_id) = Uuid::parse_str(key) else {
                        continue;
                    };
                    if lvl == level {
                        match id {
                            Some(want) if want == child_id => {
                                collect_descendants(child, out);
                            }
                            Some(_) => {}
                            None => {
                                out.push((lvl.clone(), child_id));
                                collect_descendants(child, out);
                            }
                        }
                    } else {
                        collect_expansion(child, level, id, out);
                    }
                }
            }
            Value::Array(leaf_ids) if lvl == level && id.is_none() => {
                for leaf in leaf_ids {
                    if let Some(leaf_id) = leaf.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                        out.push((lvl.clone(), leaf_id));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Collect every (level, id) position strictly below a node, in tree order.
fn collect_descendants(node: &Value, out: &mut Vec<(String, Uuid)>) {
    let Some(obj) = node.as_object() else { return };

    for (lvl, subtree) in obj {
        match subtree {
            Value::Object(children) => {
                for (key, child) in children {
                    if let Ok(id) = Uuid::parse_str(key) {
                        out.push((lvl.clone(), id));
                        collect_descendants(child, out);
                    }
                }
            }
            Value::Array(leaf_ids) => {
                for leaf in leaf_ids {
                    if let Some(id) = leaf.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                        out.push((lvl.clone(), id));
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hierarchy::test_support::sample_chain;
    use serde_json::json;

    struct Fixture {
        chain: TypeChain,
        tree: Value,
        r1: Uuid,
        p1: Uuid,
        p2: Uuid,
        c1: Uuid,
        c2: Uuid,
        c3: Uuid,
        g1: Uuid,
        g2: Uuid,
    }

    /// root(R1) -> partner(P1, P2); P1 -> customer(C1, C2); C1 -> group(G1);
    /// P2 -> customer(C3) -> group(G2)
    fn fixture() -> Fixture {
        let (r1, p1, p2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (c1, c2, c3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (g1, g2) = (Uuid::new_v4(), Uuid::new_v4());
        let tree = json!({
            "root": {
                r1.to_string(): {
                    "partner": {
                        p1.to_string(): {
                            "customer": {
                                c1.to_string(): { "group": [g1.to_string()] },
                                c2.to_string(): {},
                            }
                        },
                        p2.to_string(): {
                            "customer": {
                                c3.to_string(): { "group": [g2.to_string()] },
                            }
                        },
                    }
                }
            }
        });
        Fixture {
            chain: sample_chain(),
            tree,
            r1,
            p1,
            p2,
            c1,
            c2,
            c3,
            g1,
            g2,
        }
    }

    fn grant(type_id: i32, resource_id: Option<Uuid>, action: &str) -> GrantRow {
        GrantRow {
            user_id: Uuid::nil(),
            resource_id,
            type_id,
            action_name: action.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Propagation from a direct grant
    // -----------------------------------------------------------------------

    #[test]
    fn test_partner_grant_covers_descendants_not_siblings() {
        let f = fixture();
        let out = expand_grants(&f.chain, &f.tree, &[grant(2, Some(f.p1), "X")]);

        let refs = &out["X"];
        assert!(refs.contains(&("partner".to_string(), Some(f.p1))));
        assert!(refs.contains(&("customer".to_string(), Some(f.c1))));
        assert!(refs.contains(&("customer".to_string(), Some(f.c2))));
        assert!(refs.contains(&("group".to_string(), Some(f.g1))));

        // Nothing under the sibling partner leaks in.
        assert!(!refs.contains(&("partner".to_string(), Some(f.p2))));
        assert!(!refs.contains(&("customer".to_string(), Some(f.c3))));
        assert!(!refs.contains(&("group".to_string(), Some(f.g2))));
    }

    #[test]
    fn test_root_grant_covers_everything() {
        let f = fixture();
        let out = expand_grants(&f.chain, &f.tree, &[grant(1, Some(f.r1), "X")]);
        let refs = &out["X"];
        for id in [f.p1, f.p2, f.c1, f.c2, f.c3, f.g1, f.g2] {
            assert!(refs.iter().any(|(_, r)| *r == Some(id)), "missing {id}");
        }
    }

    #[test]
    fn test_leaf_grant_has_no_expansion() {
        let f = fixture();
        let out = expand_grants(&f.chain, &f.tree, &[grant(4, Some(f.g1), "X")]);
        assert_eq!(out["X"], vec![("group".to_string(), Some(f.g1))]);
    }

    // -----------------------------------------------------------------------
    // Blanket grants
    // -----------------------------------------------------------------------

    #[test]
    fn test_blanket_customer_grant_expands_from_level_root() {
        let f = fixture();
        let out = expand_grants(&f.chain, &f.tree, &[grant(3, None, "X")]);
        let refs = &out["X"];

        // The blanket anchor itself, every customer in the tree, and
        // everything below each of them.
        assert!(refs.contains(&("customer".to_string(), None)));
        for c in [f.c1, f.c2, f.c3] {
            assert!(refs.contains(&("customer".to_string(), Some(c))));
        }
        assert!(refs.contains(&("group".to_string(), Some(f.g1))));
        assert!(refs.contains(&("group".to_string(), Some(f.g2))));

        // Nothing above the level.
        assert!(!refs.iter().any(|(_, r)| *r == Some(f.p1) || *r == Some(f.p2)));
    }

    #[test]
    fn test_blanket_leaf_grant_collects_leaf_lists() {
        let f = fixture();
        let out = expand_grants(&f.chain, &f.tree, &[grant(4, None, "X")]);
        let refs = &out["X"];
        assert!(refs.contains(&("group".to_string(), None)));
        assert!(refs.contains(&("group".to_string(), Some(f.g1))));
        assert!(refs.contains(&("group".to_string(), Some(f.g2))));
    }

    // -----------------------------------------------------------------------
    // Grouping and deduplication
    // -----------------------------------------------------------------------

    #[test]
    fn test_overlapping_grants_deduplicate() {
        let f = fixture();
        let out = expand_grants(
            &f.chain,
            &f.tree,
            &[grant(2, Some(f.p1), "X"), grant(3, Some(f.c1), "X")],
        );
        let refs = &out["X"];
        let c1_count = refs
            .iter()
            .filter(|(_, r)| *r == Some(f.c1))
            .count();
        assert_eq!(c1_count, 1);
        let g1_count = refs
            .iter()
            .filter(|(_, r)| *r == Some(f.g1))
            .count();
        assert_eq!(g1_count, 1);
    }

    #[test]
    fn test_grants_group_by_action() {
        let f = fixture();
        let out = expand_grants(
            &f.chain,
            &f.tree,
            &[grant(3, Some(f.c1), "READ"), grant(3, Some(f.c3), "WRITE")],
        );
        assert_eq!(out.len(), 2);
        assert!(out["READ"].contains(&("customer".to_string(), Some(f.c1))));
        assert!(!out["READ"].iter().any(|(_, r)| *r == Some(f.c3)));
        assert!(out["WRITE"].contains(&("customer".to_string(), Some(f.c3))));
    }

    #[test]
    fn test_unknown_level_grant_is_skipped() {
        let f = fixture();
        let out = expand_grants(&f.chain, &f.tree, &[grant(99, Some(f.c1), "X")]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_direct_grant_order_preserved() {
        let f = fixture();
        let out = expand_grants(&f.chain, &f.tree, &[grant(2, Some(f.p1), "X")]);
        // The direct anchor always comes first.
        assert_eq!(out["X"][0], ("partner".to_string(), Some(f.p1)));
    }
}
