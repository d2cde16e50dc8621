//! Per-inquiry responder restriction, evaluated independently of RBAC grants.

use crate::authz::Subject;
use crate::inquiry::types::Inquiry;

/// Whether `subject` may answer `inquiry` according to the inquiry's own
/// `roles`/`users` allow-list.
///
/// An inquiry with neither list set is unrestricted. Otherwise the caller
/// must be named in `users` or hold at least one role named in `roles`.
/// Grant tables are never consulted.
pub fn permits(subject: &Subject, inquiry: &Inquiry) -> bool {
    if subject.is_superuser() || !inquiry.is_restricted() {
        return true;
    }

    inquiry.users.contains(&subject.name) || inquiry.roles.iter().any(|r| subject.has_role(r))
}
