//! HTTP surface over [`AuthorizationService`].
//!
//! Identity comes from the `X-Auth-User` header set by the authenticating
//! proxy. Both denial layers map to the same opaque 403 body.
use crate::authz::errors::InquiryError;
use crate::authz::service::AuthorizationService;
use crate::identity::CallerIdentity;
use crate::inquiry::types::{Inquiry, InquiryFilter, InquiryStatus, NewInquiry};
use crate::settings::Settings;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub service: Arc<AuthorizationService>,
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    // Inquiry payloads may carry workflow data
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );

    response
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/v1/inquiries",
            get(list_inquiries).post(create_inquiry),
        )
        .route(
            "/api/v1/inquiries/{id}",
            get(get_inquiry).put(respond_inquiry),
        )
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

pub async fn serve(settings: Settings, service: Arc<AuthorizationService>) -> miette::Result<()> {
    let state = AppState {
        settings: Arc::new(settings),
        service,
    };

    let addr: SocketAddr = state
        .settings
        .bind_addr()
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let router = router(state);

    tracing::info!(%addr, "Inquiry API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl ListQuery {
    fn into_filter(self) -> Result<InquiryFilter, InquiryError> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(s) => Some(InquiryStatus::parse(s).ok_or_else(|| {
                InquiryError::InvalidInput(format!(
                    "unknown status `{s}` (expected pending, responded or timeout)"
                ))
            })?),
        };
        Ok(InquiryFilter {
            status,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

async fn list_inquiries(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Inquiry>>, InquiryError> {
    let filter = q.into_filter()?;
    let inquiries = state.service.list_inquiries(&caller.user, &filter).await?;
    Ok(Json(inquiries))
}

async fn get_inquiry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Inquiry>, InquiryError> {
    Ok(Json(state.service.get_inquiry(&caller.user, &id).await?))
}

#[derive(Debug, Deserialize)]
struct RespondRequest {
    response: Value,
}

async fn respond_inquiry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<Inquiry>, InquiryError> {
    if !req.response.is_object() {
        return Err(InquiryError::InvalidInput(
            "response must be a JSON object".to_string(),
        ));
    }
    Ok(Json(
        state
            .service
            .respond(&caller.user, &id, req.response)
            .await?,
    ))
}

async fn create_inquiry(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(new): Json<NewInquiry>,
) -> Result<(StatusCode, Json<Inquiry>), InquiryError> {
    let inquiry = state.service.create_inquiry(&caller.user, new).await?;
    Ok((StatusCode::CREATED, Json(inquiry)))
}
