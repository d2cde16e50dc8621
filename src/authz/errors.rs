use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::errors::StoreError;
use crate::inquiry::types::InquiryStatus;

/// Construction and policy-loading errors. These are caller contract
/// violations, never outcomes of a runtime decision.
#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(parley::authz::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(parley::authz::invalid_policy),
        help("Each policy file may contain `role`, `user` and `assign` KDL nodes")
    )]
    InvalidPolicy(String),

    #[error("Unknown resource type `{0}`")]
    #[diagnostic(
        code(parley::authz::unknown_resource_type),
        help("Supported resource types: inquiry")
    )]
    UnknownResourceType(String),

    #[error("Unknown permission type `{0}`")]
    #[diagnostic(
        code(parley::authz::unknown_permission_type),
        help("Supported permission types: inquiry_view, inquiry_list, inquiry_respond")
    )]
    UnknownPermissionType(String),

    #[error("Permission `{permission}` does not apply to resource type `{resource_type}`")]
    #[diagnostic(code(parley::authz::permission_not_applicable))]
    PermissionNotApplicable {
        permission: String,
        resource_type: String,
    },

    #[error("Grant `{0}` has no permission types")]
    #[diagnostic(
        code(parley::authz::empty_grant),
        help("A grant must list at least one permission, e.g. grant \"inquiry\" {{ - \"inquiry_view\" }}")
    )]
    EmptyPermissionSet(String),

    #[error("Undefined role `{0}`")]
    #[diagnostic(
        code(parley::authz::undefined_role),
        help("Define the role with: role \"<name>\" {{ grant \"inquiry\" {{ ... }} }}")
    )]
    UndefinedRole(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(parley::authz::kdl_parse),
        help("Check your KDL file syntax; see https://kdl.dev for the syntax reference")
    )]
    KdlParse(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    #[diagnostic(code(parley::authz::io))]
    Io(#[from] std::io::Error),
}

/// Outcomes of an inquiry operation that did not succeed.
///
/// `PermissionDenied` and `GateDenied` are kept apart for the audit log only;
/// both render as the same opaque 403 to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum InquiryError {
    #[error("user `{user}` lacks `{permission}`")]
    #[diagnostic(code(parley::inquiry::permission_denied))]
    PermissionDenied { user: String, permission: String },

    #[error("user `{user}` is not an allowed responder for inquiry `{inquiry}`")]
    #[diagnostic(code(parley::inquiry::gate_denied))]
    GateDenied { user: String, inquiry: String },

    #[error("inquiry `{id}` is already {status}")]
    #[diagnostic(code(parley::inquiry::already_resolved))]
    AlreadyResolved { id: String, status: InquiryStatus },

    #[error("inquiry `{0}` not found")]
    #[diagnostic(code(parley::inquiry::not_found))]
    UnknownResource(String),

    #[error("invalid inquiry: {0}")]
    #[diagnostic(code(parley::inquiry::invalid))]
    InvalidInput(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl InquiryError {
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            InquiryError::PermissionDenied { .. } | InquiryError::GateDenied { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            InquiryError::PermissionDenied { .. } | InquiryError::GateDenied { .. } => {
                StatusCode::FORBIDDEN
            }
            InquiryError::AlreadyResolved { .. } => StatusCode::CONFLICT,
            InquiryError::UnknownResource(_) => StatusCode::NOT_FOUND,
            InquiryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            InquiryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InquiryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            // Never reveal which layer refused the caller
            InquiryError::PermissionDenied { .. } | InquiryError::GateDenied { .. } => {
                json!({ "error": "forbidden" })
            }
            InquiryError::AlreadyResolved { id, status } => json!({
                "error": "already_resolved",
                "id": id,
                "status": status.as_str(),
            }),
            InquiryError::UnknownResource(id) => json!({ "error": "not_found", "id": id }),
            InquiryError::InvalidInput(msg) => json!({ "error": "invalid_request", "detail": msg }),
            InquiryError::Store(e) => {
                tracing::error!(error = %e, "inquiry store failure");
                json!({ "error": "internal_error" })
            }
        };
        (status, Json(body)).into_response()
    }
}
