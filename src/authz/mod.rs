pub mod errors;
pub mod gate;
pub mod loader;
pub mod policy;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

use std::collections::BTreeSet;

/// An authenticated caller with its role set resolved for the current request.
/// Built fresh per request; never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub roles: BTreeSet<String>,
    superuser: bool,
}

impl Subject {
    pub fn new(name: impl Into<String>, roles: BTreeSet<String>, superuser_role: &str) -> Self {
        let superuser = roles.contains(superuser_role);
        Self {
            name: name.into(),
            roles,
            superuser,
        }
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
