use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::authz::errors::AuthzError;

/// Category of resource a grant or check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Inquiry,
}

impl ResourceType {
    pub const ALL: [ResourceType; 1] = [ResourceType::Inquiry];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Inquiry => "inquiry",
        }
    }
}

impl FromStr for ResourceType {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AuthzError::UnknownResourceType(s.to_string()))
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single capability. Permission types are independent of each other:
/// holding `InquiryView` says nothing about `InquiryList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    InquiryView,
    InquiryList,
    InquiryRespond,
}

impl PermissionType {
    pub const ALL: [PermissionType; 3] = [
        PermissionType::InquiryView,
        PermissionType::InquiryList,
        PermissionType::InquiryRespond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::InquiryView => "inquiry_view",
            PermissionType::InquiryList => "inquiry_list",
            PermissionType::InquiryRespond => "inquiry_respond",
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            PermissionType::InquiryView
            | PermissionType::InquiryList
            | PermissionType::InquiryRespond => ResourceType::Inquiry,
        }
    }

    /// Name without the resource prefix, e.g. "respond".
    pub fn short_name(&self) -> &'static str {
        let full = self.as_str();
        let prefix = self.resource_type().as_str();
        &full[prefix.len() + 1..]
    }
}

impl FromStr for PermissionType {
    type Err = AuthzError;

    /// Accepts the qualified tag (`inquiry_respond`) or the short form (`respond`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionType::ALL
            .into_iter()
            .find(|p| p.as_str() == s || p.short_name() == s)
            .ok_or_else(|| AuthzError::UnknownPermissionType(s.to_string()))
    }
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const WILDCARD_UID: &str = "*";

/// Identifier half of a grant scope: a specific resource, or every resource
/// of the grant's type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceUid {
    Wildcard,
    Specific(String),
}

impl ResourceUid {
    pub fn specific(id: impl Into<String>) -> Self {
        ResourceUid::Specific(id.into())
    }

    /// Parse a stored uid. `*` and the bare resource type name (e.g. `inquiry`)
    /// both denote the type-level wildcard.
    pub fn parse(resource_type: ResourceType, s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        if s == WILDCARD_UID || s == resource_type.as_str() {
            return Some(ResourceUid::Wildcard);
        }
        Some(ResourceUid::Specific(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceUid::Wildcard => WILDCARD_UID,
            ResourceUid::Specific(id) => id,
        }
    }

    /// Whether a grant scoped to `self` covers a check against `target`.
    /// A specific grant never covers the collection-level (wildcard) target.
    pub fn covers(&self, target: &ResourceUid) -> bool {
        match (self, target) {
            (ResourceUid::Wildcard, _) => true,
            (ResourceUid::Specific(a), ResourceUid::Specific(b)) => a == b,
            (ResourceUid::Specific(_), ResourceUid::Wildcard) => false,
        }
    }
}

impl std::fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceUid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Allow-only grant of one or more permission types on a resource scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionGrant {
    pub id: String,
    pub resource_type: ResourceType,
    pub resource_uid: ResourceUid,
    permission_types: BTreeSet<PermissionType>,
}

impl PermissionGrant {
    /// Build a grant, rejecting an empty permission set and permission types
    /// that belong to a different resource type.
    pub fn new(
        id: impl Into<String>,
        resource_type: ResourceType,
        resource_uid: ResourceUid,
        permission_types: impl IntoIterator<Item = PermissionType>,
    ) -> Result<Self, AuthzError> {
        let id = id.into();
        let permission_types: BTreeSet<PermissionType> = permission_types.into_iter().collect();

        if permission_types.is_empty() {
            return Err(AuthzError::EmptyPermissionSet(id));
        }
        if let Some(p) = permission_types
            .iter()
            .find(|p| p.resource_type() != resource_type)
        {
            return Err(AuthzError::PermissionNotApplicable {
                permission: p.to_string(),
                resource_type: resource_type.to_string(),
            });
        }

        Ok(Self {
            id,
            resource_type,
            resource_uid,
            permission_types,
        })
    }

    pub fn permission_types(&self) -> &BTreeSet<PermissionType> {
        &self.permission_types
    }

    pub fn matches(
        &self,
        resource_type: ResourceType,
        resource_uid: &ResourceUid,
        permission_type: PermissionType,
    ) -> bool {
        self.resource_type == resource_type
            && self.resource_uid.covers(resource_uid)
            && self.permission_types.contains(&permission_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A named role holding references to permission grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub description: Option<String>,
    /// Grant ids
    pub grants: Vec<String>,
    /// Built-in role created by the service itself (the superuser role)
    #[serde(default)]
    pub system: bool,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            grants: Vec::new(),
            system: false,
        }
    }

    pub fn with_grant(mut self, grant_id: impl Into<String>) -> Self {
        self.grants.push(grant_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user: String,
    pub role: String,
}

impl RoleAssignment {
    pub fn new(user: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
        }
    }
}

// ---------- Policy file types ----------

/// A role as declared in a policy file, with its grants already validated.
#[derive(Debug, Clone)]
pub struct RoleDef {
    pub name: String,
    pub description: Option<String>,
    pub grants: Vec<PermissionGrant>,
}

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub roles: Vec<RoleDef>,
    pub users: Vec<String>,
    pub assignments: Vec<RoleAssignment>,
}

impl ParsedPolicy {
    pub fn merge(&mut self, other: ParsedPolicy) {
        self.roles.extend(other.roles);
        self.users.extend(other.users);
        self.assignments.extend(other.assignments);
    }
}
