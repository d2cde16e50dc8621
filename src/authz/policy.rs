use crate::authz::errors::AuthzError;
use crate::authz::types::*;
use kdl::KdlDocument;

/// Parse a KDL document string into typed policy structs.
///
/// ```kdl
/// role "role_respond" {
///     description "May answer inquiries"
///     grant "inquiry" uid="*" {
///         - "inquiry_respond"
///     }
/// }
/// user "alice"
/// assign "alice" role="role_respond"
/// ```
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "role" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidPolicy(
                        "role node requires a string argument (e.g. role \"role_respond\")".into(),
                    )
                })?;

                let mut description = None;
                let mut grants = Vec::new();

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "description" => {
                                description = first_string_arg(child);
                            }
                            "grant" => {
                                let id = format!("{name}#{}", grants.len());
                                grants.push(parse_grant(&name, id, child)?);
                            }
                            other => {
                                return Err(AuthzError::InvalidPolicy(format!(
                                    "unexpected child `{other}` in role `{name}` (expected `description` or `grant`)"
                                )));
                            }
                        }
                    }
                }

                policy.roles.push(RoleDef {
                    name,
                    description,
                    grants,
                });
            }
            "user" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidPolicy(
                        "user node requires a string argument (e.g. user \"alice\")".into(),
                    )
                })?;
                policy.users.push(name);
            }
            "assign" => {
                let user = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidPolicy(
                        "assign node requires a user argument (e.g. assign \"alice\" role=\"role_respond\")"
                            .into(),
                    )
                })?;

                let role = node
                    .get("role")
                    .and_then(|v| v.as_string())
                    .ok_or_else(|| {
                        AuthzError::InvalidPolicy(format!(
                            "assign `{user}` missing `role` property (e.g. role=\"role_respond\")"
                        ))
                    })?;

                policy.assignments.push(RoleAssignment::new(user, role));
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn parse_grant(role: &str, id: String, node: &kdl::KdlNode) -> Result<PermissionGrant, AuthzError> {
    let resource_type: ResourceType = first_string_arg(node)
        .ok_or_else(|| {
            AuthzError::InvalidPolicy(format!(
                "grant in role `{role}` requires a resource type argument (e.g. grant \"inquiry\")"
            ))
        })?
        .parse()?;

    let uid = node
        .get("uid")
        .and_then(|v| v.as_string())
        .unwrap_or(WILDCARD_UID);
    let resource_uid = ResourceUid::parse(resource_type, uid).ok_or_else(|| {
        AuthzError::InvalidPolicy(format!("grant in role `{role}` has an empty `uid`"))
    })?;

    let permission_types = dash_list(node)
        .iter()
        .map(|p| p.parse::<PermissionType>())
        .collect::<Result<Vec<_>, _>>()?;

    PermissionGrant::new(id, resource_type, resource_uid, permission_types)
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
fn dash_list(node: &kdl::KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
