//! Role administration: create, edit, delete, listing, grant and revoke.
//!
//! Every mutation is gated through the permission engine first. The level
//! guard is the privilege-escalation boundary: a role can never be made to
//! grant an action above its declared `lvl_id`, and a rejected toggle is an
//! error, never a silent drop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::action::{names, Action};
use crate::models::assignment::Assignment;
use crate::models::hierarchy::TypeChain;
use crate::models::role::{Role, RolePurpose};
use crate::models::user::User;
use crate::services::directory::{flatten_context, ResourceDirectory};
use crate::services::hierarchy_service::HierarchyService;
use crate::services::permission_service::{ActionResources, PermissionService};

/// Fields legal when creating a role. Anything not listed here is not
/// settable at creation time.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub type_id: i32,
    pub lvl_id: i32,
    pub scope_id: Option<Uuid>,
    pub shared: bool,
    pub purpose: Option<RolePurpose>,
    pub action_ids: Vec<Uuid>,
}

/// Fields legal when editing a role. `type_id`, `lvl_id` and `scope_id` are
/// immutable after creation; actions are toggled, not replaced wholesale.
#[derive(Debug, Clone, Default)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub shared: Option<bool>,
    pub enable_actions: Vec<Uuid>,
    pub disable_actions: Vec<Uuid>,
}

/// A role visible in the assignable listing, with the display name of its
/// scope resource when the directory knows one.
#[derive(Debug, Clone)]
pub struct AssignableRole {
    pub role: Role,
    pub scope_name: Option<String>,
}

/// Parameters for granting a role to a user at a hierarchy anchor.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub type_id: i32,
    pub resource_id: Option<Uuid>,
}

pub struct RoleService {
    db: PgPool,
    directory: Arc<dyn ResourceDirectory>,
    hierarchy: HierarchyService,
    permissions: PermissionService,
}

impl RoleService {
    pub fn new(db: PgPool, directory: Arc<dyn ResourceDirectory>) -> Self {
        let hierarchy = HierarchyService::new(db.clone());
        let permissions = PermissionService::new(db.clone(), directory.clone());
        Self {
            db,
            directory,
            hierarchy,
            permissions,
        }
    }

    pub async fn get_role(&self, role_id: Uuid) -> Result<Role> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, type_id, lvl_id, scope_id, shared, is_active,
                   purpose, created_at, deleted_at
            FROM roles
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(role_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("role not found".to_string()))
    }

    /// Live actions currently attached to a role.
    pub async fn role_actions(&self, role_id: Uuid) -> Result<Vec<Action>> {
        let actions: Vec<Action> = sqlx::query_as(
            r#"
            SELECT a.id, a.name, a.type_id, a.action_group_id,
                   a.sort_order, a.created_at, a.deleted_at
            FROM actions a
            JOIN role_actions ra ON ra.action_id = a.id
            WHERE ra.role_id = $1 AND a.deleted_at IS NULL
            ORDER BY a.sort_order
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(actions)
    }

    /// Create a role. The caller must already hold `CREATE_ROLE` at the
    /// target scope; `lvl_id` must be the role's own level or below it, and
    /// every initial action must sit within the `lvl_id` subtree.
    pub async fn create_role(&self, caller: &User, new: &NewRole) -> Result<Role> {
        let chain = self.hierarchy.load_chain().await?;

        let role_type = chain
            .by_id(new.type_id)
            .ok_or_else(|| AppError::WrongArguments(format!("unknown level id {}", new.type_id)))?;
        if !chain.self_and_descendant_ids(new.type_id).contains(&new.lvl_id) {
            return Err(AppError::WrongArguments(
                "lvl_id must be the role's own level or a level below it".to_string(),
            ));
        }

        let type_name = role_type.name.clone();
        self.permissions
            .check_permission(caller, names::CREATE_ROLE, &type_name, new.scope_id)
            .await?;

        let actions = self.load_live_actions(&new.action_ids).await?;
        validate_action_levels(&chain, new.lvl_id, &actions)?;

        let duplicate: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM roles
            WHERE name = $1 AND type_id = $2
              AND scope_id IS NOT DISTINCT FROM $3
              AND deleted_at IS NULL
            "#,
        )
        .bind(&new.name)
        .bind(new.type_id)
        .bind(new.scope_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        if duplicate.is_some() {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists at this scope",
                new.name
            )));
        }

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let role: Role = sqlx::query_as(
            r#"
            INSERT INTO roles (id, name, type_id, lvl_id, scope_id, shared,
                               is_active, purpose, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, $7, NOW())
            RETURNING id, name, type_id, lvl_id, scope_id, shared, is_active,
                      purpose, created_at, deleted_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(new.type_id)
        .bind(new.lvl_id)
        .bind(new.scope_id)
        .bind(new.shared)
        .bind(new.purpose)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint_error)?;

        for action in &actions {
            sqlx::query(
                "INSERT INTO role_actions (role_id, action_id) VALUES ($1, $2)",
            )
            .bind(role.id)
            .bind(action.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(role_id = %role.id, name = %role.name, "role created");
        Ok(role)
    }

    /// Edit a role's fields and toggle its actions.
    pub async fn edit_role(
        &self,
        caller: &User,
        role_id: Uuid,
        changes: &RoleChanges,
    ) -> Result<Role> {
        let role = self.get_role(role_id).await?;
        let chain = self.hierarchy.load_chain().await?;

        self.require_edit_permission(caller, &role, &chain).await?;

        let toggled: Vec<Uuid> = changes
            .enable_actions
            .iter()
            .chain(changes.disable_actions.iter())
            .copied()
            .collect();
        let actions = self.load_live_actions(&toggled).await?;
        validate_action_levels(&chain, role.lvl_id, &actions)?;

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let role: Role = sqlx::query_as(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                is_active = COALESCE($3, is_active),
                shared = COALESCE($4, shared)
            WHERE id = $1
            RETURNING id, name, type_id, lvl_id, scope_id, shared, is_active,
                      purpose, created_at, deleted_at
            "#,
        )
        .bind(role.id)
        .bind(&changes.name)
        .bind(changes.is_active)
        .bind(changes.shared)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_constraint_error)?;

        for action_id in &changes.enable_actions {
            sqlx::query(
                r#"
                INSERT INTO role_actions (role_id, action_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role.id)
            .bind(action_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }
        if !changes.disable_actions.is_empty() {
            sqlx::query(
                "DELETE FROM role_actions WHERE role_id = $1 AND action_id = ANY($2)",
            )
            .bind(role.id)
            .bind(&changes.disable_actions)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(role_id = %role.id, "role edited");
        Ok(role)
    }

    /// Soft-delete a role and remove its action junction rows.
    pub async fn delete_role(&self, caller: &User, role_id: Uuid) -> Result<()> {
        let role = self.get_role(role_id).await?;
        let chain = self.hierarchy.load_chain().await?;
        let type_name = level_name(&chain, role.type_id)?;

        self.permissions
            .check_permission(caller, names::DELETE_ROLE, &type_name, role.scope_id)
            .await?;

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query("UPDATE roles SET deleted_at = NOW() WHERE id = $1")
            .bind(role.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Junction rows are cascaded explicitly, not via object-graph magic.
        sqlx::query("DELETE FROM role_actions WHERE role_id = $1")
            .bind(role.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(role_id = %role.id, "role deleted");
        Ok(())
    }

    /// Roles the caller may assign to `target`, with scope display names.
    ///
    /// A role is visible when the caller's expanded `LIST_ROLES` and
    /// `LIST_USERS` coverage both reach the role's scope, or when the role is
    /// shared, anchored within the target's ancestor context, and its grant
    /// level sits at or above the target's own level.
    pub async fn list_assignable_roles(
        &self,
        caller: &User,
        target: &User,
    ) -> Result<Vec<AssignableRole>> {
        let chain = self.hierarchy.load_chain().await?;

        let roles: Vec<Role> = sqlx::query_as(
            r#"
            SELECT id, name, type_id, lvl_id, scope_id, shared, is_active,
                   purpose, created_at, deleted_at
            FROM roles
            WHERE deleted_at IS NULL AND is_active
            ORDER BY name
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let listing_actions = [
            names::LIST_ROLES.to_string(),
            names::LIST_USERS.to_string(),
        ];
        let expanded = self
            .permissions
            .action_resources_expanded(caller.id, Some(&listing_actions))
            .await?;
        let coverage = listing_coverage(&expanded);

        let target_context: HashSet<Uuid> = match (chain.by_id(target.type_id), target.scope_id) {
            (Some(level), Some(scope_id)) => {
                let context = self.directory.get_context(&level.name, scope_id).await?;
                flatten_context(&context).into_iter().collect()
            }
            _ => HashSet::new(),
        };

        let visible: Vec<Role> = roles
            .into_iter()
            .filter(|role| {
                role_visible(&chain, role, &coverage, target.type_id, &target_context)
            })
            .collect();

        // Display names only; a directory failure degrades the listing, it
        // never blocks it.
        let lookups: Vec<(String, Uuid)> = visible
            .iter()
            .filter_map(|role| {
                let level = chain.by_id(role.type_id)?;
                Some((level.name.clone(), role.scope_id?))
            })
            .collect();
        let names = if lookups.is_empty() {
            HashMap::new()
        } else {
            match self.directory.get_resources_info(&lookups).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(error = %e, "scope name lookup failed");
                    HashMap::new()
                }
            }
        };

        Ok(visible
            .into_iter()
            .map(|role| {
                let scope_name = role
                    .scope_id
                    .and_then(|id| names.get(&id))
                    .map(|info| info.name.clone());
                AssignableRole { role, scope_name }
            })
            .collect())
    }

    /// Grant a role to a user at an anchor. Idempotent: a live duplicate is
    /// returned as-is, and a concurrent duplicate insert resolves to the one
    /// surviving row via the uniqueness constraint plus a re-read.
    pub async fn grant_role(&self, caller: &User, new: &NewAssignment) -> Result<Assignment> {
        let chain = self.hierarchy.load_chain().await?;
        let type_name = level_name(&chain, new.type_id)?;

        self.permissions
            .check_permission(caller, names::ASSIGN_ROLES, &type_name, new.resource_id)
            .await?;

        // The role must be live and active to be granted at all.
        let role = self.get_role(new.role_id).await?;
        if !role.is_active {
            return Err(AppError::WrongArguments("role is inactive".to_string()));
        }

        self.get_or_create_assignment(new).await
    }

    /// Idempotent assignment creation: a live duplicate is returned as-is,
    /// and a concurrent duplicate insert loses the `ON CONFLICT` race but
    /// resolves to the surviving row via the re-read. Callers are expected
    /// to have cleared the permission gate already.
    pub async fn get_or_create_assignment(&self, new: &NewAssignment) -> Result<Assignment> {
        if let Some(existing) = self.find_live_assignment(new).await? {
            return Ok(existing);
        }

        sqlx::query(
            r#"
            INSERT INTO assignments (id, user_id, role_id, type_id, resource_id, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.role_id)
        .bind(new.type_id)
        .bind(new.resource_id)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_live_assignment(new)
            .await?
            .ok_or_else(|| AppError::Internal("assignment not visible after insert".to_string()))
    }

    /// Revoke an assignment (soft delete).
    pub async fn revoke_role(&self, caller: &User, assignment_id: Uuid) -> Result<()> {
        let assignment: Assignment = sqlx::query_as(
            r#"
            SELECT id, user_id, role_id, type_id, resource_id, created_at, deleted_at
            FROM assignments
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(assignment_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("assignment not found".to_string()))?;

        let chain = self.hierarchy.load_chain().await?;
        let type_name = level_name(&chain, assignment.type_id)?;
        self.permissions
            .check_permission(
                caller,
                names::ASSIGN_ROLES,
                &type_name,
                assignment.resource_id,
            )
            .await?;

        sqlx::query("UPDATE assignments SET deleted_at = NOW() WHERE id = $1")
            .bind(assignment.id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::info!(assignment_id = %assignment.id, "assignment revoked");
        Ok(())
    }

    /// Live assignments for a role (the holders view).
    pub async fn list_role_assignments(&self, role_id: Uuid) -> Result<Vec<Assignment>> {
        let assignments: Vec<Assignment> = sqlx::query_as(
            r#"
            SELECT id, user_id, role_id, type_id, resource_id, created_at, deleted_at
            FROM assignments
            WHERE role_id = $1 AND deleted_at IS NULL
            ORDER BY created_at
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(assignments)
    }

    /// The three-way editor check. Candidates are tried in order; the first
    /// one the caller holds at the role's scope permits the edit.
    async fn require_edit_permission(
        &self,
        caller: &User,
        role: &Role,
        chain: &TypeChain,
    ) -> Result<()> {
        let holds_role = self.caller_holds_role(caller.id, role.id).await?;
        let caller_above_role = chain.is_strict_ancestor(caller.type_id, role.type_id);
        let type_name = level_name(chain, role.type_id)?;

        for action in editor_actions(holds_role, caller_above_role) {
            match self
                .permissions
                .check_permission(caller, action, &type_name, role.scope_id)
                .await
            {
                Ok(_) => return Ok(()),
                Err(AppError::Forbidden) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Forbidden)
    }

    async fn caller_holds_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM assignments
            WHERE user_id = $1 AND role_id = $2 AND deleted_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn find_live_assignment(&self, new: &NewAssignment) -> Result<Option<Assignment>> {
        let assignment: Option<Assignment> = sqlx::query_as(
            r#"
            SELECT id, user_id, role_id, type_id, resource_id, created_at, deleted_at
            FROM assignments
            WHERE user_id = $1 AND role_id = $2 AND type_id = $3
              AND resource_id IS NOT DISTINCT FROM $4
              AND deleted_at IS NULL
            "#,
        )
        .bind(new.user_id)
        .bind(new.role_id)
        .bind(new.type_id)
        .bind(new.resource_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(assignment)
    }

    /// Resolve ids to live actions. A missing or soft-deleted id is a caller
    /// error, not a silent drop.
    async fn load_live_actions(&self, action_ids: &[Uuid]) -> Result<Vec<Action>> {
        if action_ids.is_empty() {
            return Ok(Vec::new());
        }
        let actions: Vec<Action> = sqlx::query_as(
            r#"
            SELECT id, name, type_id, action_group_id, sort_order,
                   created_at, deleted_at
            FROM actions
            WHERE id = ANY($1) AND deleted_at IS NULL
            "#,
        )
        .bind(action_ids)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let found: HashSet<Uuid> = actions.iter().map(|a| a.id).collect();
        if let Some(missing) = action_ids.iter().find(|id| !found.contains(id)) {
            return Err(AppError::WrongArguments(format!(
                "unknown action {missing}"
            )));
        }
        Ok(actions)
    }
}

fn level_name(chain: &TypeChain, type_id: i32) -> Result<String> {
    chain
        .by_id(type_id)
        .map(|t| t.name.clone())
        .ok_or_else(|| AppError::WrongArguments(format!("unknown level id {type_id}")))
}

fn map_constraint_error(e: sqlx::Error) -> AppError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return AppError::Conflict("role already exists".to_string());
        }
    }
    AppError::Database(e.to_string())
}

/// Actions that can permit an edit, in check order. Every editor needs one
/// of these at the role's scope.
pub fn editor_actions(holds_role: bool, caller_above_role: bool) -> Vec<&'static str> {
    let mut actions = vec![names::EDIT_ROLES];
    if holds_role {
        actions.push(names::EDIT_OWN_ROLES);
    }
    if caller_above_role {
        actions.push(names::EDIT_SUBLEVEL_ROLES);
    }
    actions
}

/// Reject any toggled action whose level sits above the role's `lvl_id`.
pub fn validate_action_levels(
    chain: &TypeChain,
    role_lvl_id: i32,
    actions: &[Action],
) -> Result<()> {
    let allowed = chain.self_and_descendant_ids(role_lvl_id);
    for action in actions {
        if !allowed.contains(&action.type_id) {
            return Err(AppError::WrongArguments(format!(
                "action '{}' is above the role's level",
                action.name
            )));
        }
    }
    Ok(())
}

/// Scopes reachable under BOTH listing actions. Coverage requires the pair;
/// holding only one of them reveals nothing.
pub fn listing_coverage(expanded: &ActionResources) -> HashSet<(String, Option<Uuid>)> {
    let list_roles: HashSet<_> = expanded
        .get(names::LIST_ROLES)
        .map(|refs| refs.iter().cloned().collect())
        .unwrap_or_default();
    let list_users: HashSet<_> = expanded
        .get(names::LIST_USERS)
        .map(|refs| refs.iter().cloned().collect())
        .unwrap_or_default();
    list_roles.intersection(&list_users).cloned().collect()
}

/// Visibility rule for the assignable-roles listing.
pub fn role_visible(
    chain: &TypeChain,
    role: &Role,
    coverage: &HashSet<(String, Option<Uuid>)>,
    target_type_id: i32,
    target_context: &HashSet<Uuid>,
) -> bool {
    let Some(level) = chain.by_id(role.type_id) else {
        return false;
    };

    let covered = coverage.contains(&(level.name.clone(), None))
        || coverage.contains(&(level.name.clone(), role.scope_id));
    if covered {
        return true;
    }

    if !role.shared {
        return false;
    }
    let in_context = match role.scope_id {
        None => true,
        Some(scope_id) => target_context.contains(&scope_id),
    };
    in_context && chain.is_at_or_above(role.lvl_id, target_type_id)
}
