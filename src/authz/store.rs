//! Repository traits for roles, grants and assignments, plus an in-memory
//! implementation used by tests and by deployments without a database.
//!
//! The SQL implementation lives in [`crate::storage`].

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::authz::errors::AuthzError;
use crate::authz::types::{PermissionGrant, Role, RoleAssignment, User};
use crate::errors::StoreError;

/// Role definitions and the grants they reference.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_role(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn upsert_role(&self, role: Role) -> Result<(), StoreError>;

    async fn get_grant(&self, id: &str) -> Result<Option<PermissionGrant>, StoreError>;

    async fn upsert_grant(&self, grant: PermissionGrant) -> Result<(), StoreError>;

    /// All grants attached to `role`. Dangling grant ids are skipped.
    async fn grants_for_role(&self, role: &str) -> Result<Vec<PermissionGrant>, StoreError> {
        let Some(role) = self.get_role(role).await? else {
            return Ok(Vec::new());
        };
        let mut grants = Vec::with_capacity(role.grants.len());
        for id in &role.grants {
            match self.get_grant(id).await? {
                Some(grant) => grants.push(grant),
                None => tracing::warn!(role = %role.name, grant = %id, "role references missing grant"),
            }
        }
        Ok(grants)
    }
}

/// User identities and the roles assigned to them.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn get_user(&self, name: &str) -> Result<Option<User>, StoreError>;

    async fn upsert_user(&self, user: User) -> Result<(), StoreError>;

    /// Names of every role assigned to `user`.
    async fn roles_for_user(&self, user: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Record an assignment. Existing identical assignments are left alone.
    async fn upsert_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError>;
}

/// Assign `role` to `user`, creating the user record if needed. Fails with
/// `UndefinedRole` when the role does not exist.
pub async fn assign_role(
    roles: &dyn RoleStore,
    assignments: &dyn AssignmentStore,
    user: &str,
    role: &str,
) -> Result<(), AuthzError> {
    if roles.get_role(role).await?.is_none() {
        return Err(AuthzError::UndefinedRole(role.to_string()));
    }
    if assignments.get_user(user).await?.is_none() {
        assignments.upsert_user(User::new(user)).await?;
    }
    assignments
        .upsert_assignment(RoleAssignment::new(user, role))
        .await?;
    Ok(())
}

/// Create the superuser role if it does not exist yet. Returns true when
/// the role was created.
pub async fn ensure_superuser_role(roles: &dyn RoleStore, name: &str) -> Result<bool, StoreError> {
    if roles.get_role(name).await?.is_some() {
        return Ok(false);
    }
    let mut role = Role::new(name);
    role.description = Some("Bypasses all inquiry permission checks".to_string());
    role.system = true;
    roles.upsert_role(role).await?;
    Ok(true)
}

#[derive(Debug, Default)]
struct RbacTables {
    roles: HashMap<String, Role>,
    grants: HashMap<String, PermissionGrant>,
    users: HashMap<String, User>,
    /// user -> role names
    assignments: HashMap<String, BTreeSet<String>>,
}

/// Thread-safe in-memory RBAC store.
///
/// Reads take a shared lock on a single table set, so each resolver query
/// sees a consistent snapshot of the data it touches.
#[derive(Debug, Default)]
pub struct MemoryRbacStore {
    tables: RwLock<RbacTables>,
}

impl MemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&RbacTables) -> T) -> T {
        let guard = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut RbacTables) -> T) -> T {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl RoleStore for MemoryRbacStore {
    async fn get_role(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.read(|t| t.roles.get(name).cloned()))
    }

    async fn upsert_role(&self, role: Role) -> Result<(), StoreError> {
        self.write(|t| {
            t.roles.insert(role.name.clone(), role);
        });
        Ok(())
    }

    async fn get_grant(&self, id: &str) -> Result<Option<PermissionGrant>, StoreError> {
        Ok(self.read(|t| t.grants.get(id).cloned()))
    }

    async fn upsert_grant(&self, grant: PermissionGrant) -> Result<(), StoreError> {
        self.write(|t| {
            t.grants.insert(grant.id.clone(), grant);
        });
        Ok(())
    }

    async fn grants_for_role(&self, role: &str) -> Result<Vec<PermissionGrant>, StoreError> {
        Ok(self.read(|t| {
            t.roles
                .get(role)
                .map(|r| {
                    r.grants
                        .iter()
                        .filter_map(|id| t.grants.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        }))
    }
}

#[async_trait]
impl AssignmentStore for MemoryRbacStore {
    async fn get_user(&self, name: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read(|t| t.users.get(name).cloned()))
    }

    async fn upsert_user(&self, user: User) -> Result<(), StoreError> {
        self.write(|t| {
            t.users.insert(user.name.clone(), user);
        });
        Ok(())
    }

    async fn roles_for_user(&self, user: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.read(|t| t.assignments.get(user).cloned().unwrap_or_default()))
    }

    async fn upsert_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError> {
        self.write(|t| {
            t.assignments
                .entry(assignment.user)
                .or_default()
                .insert(assignment.role);
        });
        Ok(())
    }
}
