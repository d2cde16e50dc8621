use std::path::Path;

use crate::authz::errors::AuthzError;
use crate::authz::policy::parse_kdl_document;
use crate::authz::store::{assign_role, AssignmentStore, RoleStore};
use crate::authz::types::*;

/// Counts of records written by [`apply_policy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub roles: usize,
    pub grants: usize,
    pub users: usize,
    pub assignments: usize,
}

/// Load all `.kdl` policy files from the given directory, in file name
/// order, and merge them into one policy.
pub fn load_policies(dir: &Path) -> Result<ParsedPolicy, AuthzError> {
    if !dir.is_dir() {
        return Err(AuthzError::InvalidPolicy(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut merged = ParsedPolicy::default();
    let mut file_count = 0;

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AuthzError::PolicyLoadError {
                path: path.display().to_string(),
                source,
            })?;
        merged.merge(parse_kdl_document(&contents)?);
        file_count += 1;
    }

    tracing::info!(
        files = file_count,
        roles = merged.roles.len(),
        users = merged.users.len(),
        assignments = merged.assignments.len(),
        "Loaded authorization policies"
    );

    Ok(merged)
}

/// Write a parsed policy into the stores.
///
/// Roles and their grants go first so that assignments may reference roles
/// declared anywhere in the policy set. An assignment naming a role that is
/// neither in the policy nor already stored fails with `UndefinedRole`.
pub async fn apply_policy(
    policy: &ParsedPolicy,
    roles: &dyn RoleStore,
    assignments: &dyn AssignmentStore,
) -> Result<ApplySummary, AuthzError> {
    let mut summary = ApplySummary::default();

    for def in &policy.roles {
        let mut role = Role::new(&def.name);
        role.description = def.description.clone();
        for grant in &def.grants {
            roles.upsert_grant(grant.clone()).await?;
            role.grants.push(grant.id.clone());
            summary.grants += 1;
        }
        // keep the system flag of a role the service created itself
        if let Some(existing) = roles.get_role(&def.name).await? {
            role.system = existing.system;
        }
        roles.upsert_role(role).await?;
        summary.roles += 1;
    }

    for name in &policy.users {
        if assignments.get_user(name).await?.is_none() {
            assignments.upsert_user(User::new(name)).await?;
            summary.users += 1;
        }
    }

    for a in &policy.assignments {
        assign_role(roles, assignments, &a.user, &a.role).await?;
        summary.assignments += 1;
    }

    tracing::debug!(
        roles = summary.roles,
        grants = summary.grants,
        users = summary.users,
        assignments = summary.assignments,
        "Applied authorization policy"
    );

    Ok(summary)
}
