use std::sync::Arc;

use crate::authz::store::{AssignmentStore, RoleStore};
use crate::authz::types::{PermissionType, ResourceType, ResourceUid};
use crate::authz::Subject;
use crate::errors::StoreError;

pub const DEFAULT_SUPERUSER_ROLE: &str = "admin";

/// Answers "does user U hold permission P on resource (type, uid)?" from the
/// role, grant and assignment stores.
///
/// Resolution is allow-only and OR-across-roles: any role carrying a matching
/// grant is enough, and there is no deny grant or permission hierarchy.
pub struct GrantResolver {
    roles: Arc<dyn RoleStore>,
    assignments: Arc<dyn AssignmentStore>,
    superuser_role: String,
    enabled: bool,
}

impl GrantResolver {
    pub fn new(roles: Arc<dyn RoleStore>, assignments: Arc<dyn AssignmentStore>) -> Self {
        Self {
            roles,
            assignments,
            superuser_role: DEFAULT_SUPERUSER_ROLE.to_string(),
            enabled: true,
        }
    }

    pub fn with_superuser_role(mut self, role: impl Into<String>) -> Self {
        self.superuser_role = role.into();
        self
    }

    /// With RBAC disabled every `resolve` query is allowed.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn superuser_role(&self) -> &str {
        &self.superuser_role
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn role_store(&self) -> &dyn RoleStore {
        self.roles.as_ref()
    }

    pub fn assignment_store(&self) -> &dyn AssignmentStore {
        self.assignments.as_ref()
    }

    /// Load `user`'s assigned roles into a [`Subject`].
    pub async fn subject(&self, user: &str) -> Result<Subject, StoreError> {
        let roles = self.assignments.roles_for_user(user).await?;
        Ok(Subject::new(user, roles, &self.superuser_role))
    }

    pub async fn resolve(
        &self,
        user: &str,
        resource_type: ResourceType,
        resource_uid: &ResourceUid,
        permission_type: PermissionType,
    ) -> Result<bool, StoreError> {
        let subject = self.subject(user).await?;
        self.resolve_for(&subject, resource_type, resource_uid, permission_type)
            .await
    }

    /// Same as [`resolve`](Self::resolve) for an already loaded subject.
    pub async fn resolve_for(
        &self,
        subject: &Subject,
        resource_type: ResourceType,
        resource_uid: &ResourceUid,
        permission_type: PermissionType,
    ) -> Result<bool, StoreError> {
        if !self.enabled || subject.is_superuser() {
            return Ok(true);
        }

        for role in &subject.roles {
            let grants = self.roles.grants_for_role(role).await?;
            if let Some(grant) = grants
                .iter()
                .find(|g| g.matches(resource_type, resource_uid, permission_type))
            {
                tracing::debug!(
                    user = %subject.name,
                    role = %role,
                    grant = %grant.id,
                    permission = %permission_type,
                    resource = %resource_uid,
                    "permission granted"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }
}
