use parley::authz::service::AuthorizationService;
use parley::authz::store::{assign_role, ensure_superuser_role, AssignmentStore, RoleStore};
use parley::authz::types::{PermissionGrant, PermissionType, ResourceType, ResourceUid, Role};
use parley::inquiry::{Inquiry, NewInquiry};
use serde_json::json;

/// Users and roles mirroring a typical inquiry deployment:
///
/// | user                     | role             | grant            |
/// |--------------------------|------------------|------------------|
/// | `admin`                  | `admin`          | superuser        |
/// | `user_get`               | `role_get`       | `inquiry_view`   |
/// | `user_list`              | `role_list`      | `inquiry_list`   |
/// | `user_respond`           | `role_respond`   | `inquiry_respond`|
/// | `user_respond_paramtest` | `role_respond_2` | `inquiry_respond`|
/// | `no_permissions`         | none             | none             |
pub async fn seed_rbac(roles: &dyn RoleStore, assignments: &dyn AssignmentStore) {
    ensure_superuser_role(roles, "admin")
        .await
        .expect("Failed to create superuser role");

    for (role, permission) in [
        ("role_get", PermissionType::InquiryView),
        ("role_list", PermissionType::InquiryList),
        ("role_respond", PermissionType::InquiryRespond),
        ("role_respond_2", PermissionType::InquiryRespond),
    ] {
        let grant_id = format!("{role}#0");
        let grant = PermissionGrant::new(
            grant_id.clone(),
            ResourceType::Inquiry,
            ResourceUid::Wildcard,
            [permission],
        )
        .expect("Invalid test grant");
        roles.upsert_grant(grant).await.expect("Failed to store grant");
        roles
            .upsert_role(Role::new(role).with_grant(grant_id))
            .await
            .expect("Failed to store role");
    }

    for (user, role) in [
        ("admin", "admin"),
        ("user_get", "role_get"),
        ("user_list", "role_list"),
        ("user_respond", "role_respond"),
        ("user_respond_paramtest", "role_respond_2"),
    ] {
        assign_role(roles, assignments, user, role)
            .await
            .expect("Failed to assign test role");
    }

    assignments
        .upsert_user(parley::authz::types::User::new("no_permissions"))
        .await
        .expect("Failed to create test user");
}

/// Builder for inquiries created through the service by `admin`
pub struct InquiryBuilder {
    new: NewInquiry,
}

impl InquiryBuilder {
    pub fn new() -> Self {
        Self {
            new: NewInquiry {
                schema: json!({
                    "type": "object",
                    "properties": { "continue": { "type": "boolean" } },
                    "required": ["continue"]
                }),
                action_ref: Some("wolfpack.ask".to_string()),
                ttl: Some(1440),
                ..Default::default()
            },
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.new.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_users(mut self, users: &[&str]) -> Self {
        self.new.users = users.iter().map(|u| u.to_string()).collect();
        self
    }

    pub fn with_ttl(mut self, minutes: i64) -> Self {
        self.new.ttl = Some(minutes);
        self
    }

    pub async fn create(self, service: &AuthorizationService) -> Inquiry {
        service
            .create_inquiry("admin", self.new)
            .await
            .expect("Failed to create test inquiry")
    }
}

impl Default for InquiryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
