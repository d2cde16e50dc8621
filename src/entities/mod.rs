pub mod inquiry;
pub mod permission_grant;
pub mod role;
pub mod role_assignment;
pub mod user;

pub use inquiry::Entity as Inquiry;
pub use permission_grant::Entity as PermissionGrant;
pub use role::Entity as Role;
pub use role_assignment::Entity as RoleAssignment;
pub use user::Entity as User;
