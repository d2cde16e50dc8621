use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Header set by the authenticating proxy in front of the service.
pub const AUTH_USER_HEADER: &str = "x-auth-user";

/// Authenticated caller as asserted by the upstream proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user: String,
}

impl CallerIdentity {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTH_USER_HEADER)?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self::new(value))
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthenticated" })),
            )
                .into_response()
        })
    }
}
