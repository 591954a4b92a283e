//! HTTP interface: the batch trigger, the on-demand endpoints and `/metrics`.

use crate::batch::{BatchError, BatchRunner, RunSummary};
use crate::checker::{CheckError, Checker};
use crate::core::{AccountId, DomainId};
use crate::notification::{Dispatcher, NotifyError};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

/// Header carrying the account an on-demand request acts for.
pub const ACCOUNT_HEADER: &str = "x-account-id";

const DEFAULT_HISTORY_LIMIT: usize = 30;
const MAX_HISTORY_LIMIT: usize = 500;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub batch: BatchRunner,
    pub checker: Checker,
    pub dispatcher: Dispatcher,
    pub cron_secret: Option<String>,
    pub api_token: Option<String>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/cron/check-all-domains", get(run_batch))
        .route("/api/check-domain", post(check_domain))
        .route("/api/domains", post(add_domain))
        .route("/api/recheck-domain", post(recheck_domain))
        .route("/api/domains/{id}", delete(delete_domain))
        .route(
            "/api/domains/{id}/public-token",
            post(issue_public_token).delete(revoke_public_token),
        )
        .route("/api/domains/{id}/history", get(history))
        .route("/api/status/{token}", get(public_status))
        .route("/api/webhook/test", post(test_webhook))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Batch(BatchError),
    Check(CheckError),
    Notify(NotifyError),
}

impl From<CheckError> for ApiError {
    fn from(e: CheckError) -> Self {
        ApiError::Check(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" })),
            ApiError::Batch(e) => {
                error!(error = %e, "Batch run failed");
                let details = match &e {
                    BatchError::ListDomains(source) => source.to_string(),
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to fetch domains", "details": details }),
                )
            }
            ApiError::Check(e) => match e {
                CheckError::InvalidDomain(_) => {
                    (StatusCode::BAD_REQUEST, json!({ "error": "Invalid domain name" }))
                }
                CheckError::QuotaReached { current, limit } => (
                    StatusCode::FORBIDDEN,
                    json!({
                        "error": e.to_string(),
                        "code": "LIMIT_REACHED",
                        "current": current,
                        "limit": limit,
                    }),
                ),
                CheckError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Domain not found" })),
                CheckError::Forbidden => (StatusCode::FORBIDDEN, json!({ "error": "Forbidden" })),
                CheckError::Duplicate(_) => (StatusCode::CONFLICT, json!({ "error": e.to_string() })),
                CheckError::Store(ref source) => {
                    error!(error = %source, "Store failure in on-demand request");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "Database error", "details": source.to_string() }),
                    )
                }
            },
            ApiError::Notify(e) => match e {
                NotifyError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, json!({ "error": e.to_string() })),
                other => {
                    warn!(error = %other, "Test webhook failed");
                    (StatusCode::BAD_GATEWAY, json!({ "error": other.to_string() }))
                }
            },
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Authentication
// =============================================================================

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// An unset secret denies every request.
fn check_bearer(headers: &HeaderMap, secret: Option<&str>) -> Result<(), ApiError> {
    match (secret, bearer(headers)) {
        (Some(expected), Some(given)) if !expected.is_empty() && expected == given => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Authenticates an on-demand request and returns the account it acts for.
fn account(state: &AppState, headers: &HeaderMap) -> Result<AccountId, ApiError> {
    check_bearer(headers, state.api_token.as_deref())?;
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or(ApiError::Unauthorized)
}

// =============================================================================
// Handlers
// =============================================================================

async fn run_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, ApiError> {
    check_bearer(&headers, state.cron_secret.as_deref())?;
    let summary = state.batch.run().await.map_err(ApiError::Batch)?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct DomainRequest {
    domain: String,
}

async fn check_domain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DomainRequest>,
) -> Result<Response, ApiError> {
    let account_id = account(&state, &headers)?;
    let report = state.checker.precheck(account_id, &body.domain).await?;
    Ok(Json(report).into_response())
}

async fn add_domain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DomainRequest>,
) -> Result<Response, ApiError> {
    let account_id = account(&state, &headers)?;
    let domain = state.checker.add_domain(account_id, &body.domain).await?;
    Ok((StatusCode::CREATED, Json(domain)).into_response())
}

#[derive(Debug, Deserialize)]
struct RecheckRequest {
    domain_id: DomainId,
}

async fn recheck_domain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RecheckRequest>,
) -> Result<Response, ApiError> {
    let account_id = account(&state, &headers)?;
    let domain = state.checker.recheck(account_id, body.domain_id).await?;
    Ok(Json(domain).into_response())
}

async fn delete_domain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<DomainId>,
) -> Result<Response, ApiError> {
    let account_id = account(&state, &headers)?;
    state.checker.delete_domain(account_id, id).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

async fn issue_public_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<DomainId>,
) -> Result<Response, ApiError> {
    let account_id = account(&state, &headers)?;
    let token = state.checker.issue_public_token(account_id, id).await?;
    Ok(Json(json!({ "token": token })).into_response())
}

async fn revoke_public_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<DomainId>,
) -> Result<Response, ApiError> {
    let account_id = account(&state, &headers)?;
    state.checker.revoke_public_token(account_id, id).await?;
    Ok(Json(json!({ "success": true })).into_response())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<DomainId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let account_id = account(&state, &headers)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let records = state.checker.history(account_id, id, limit).await?;
    Ok(Json(records).into_response())
}

async fn public_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let status = state.checker.public_status(&token).await?;
    Ok(Json(status).into_response())
}

#[derive(Debug, Deserialize)]
struct WebhookTestRequest {
    webhook_url: String,
}

async fn test_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WebhookTestRequest>,
) -> Result<Response, ApiError> {
    account(&state, &headers)?;
    state
        .dispatcher
        .send_test_webhook(&body.webhook_url)
        .await
        .map_err(ApiError::Notify)?;
    Ok(Json(json!({ "success": true })).into_response())
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(auth) = auth {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        }
        headers
    }

    #[test]
    fn test_bearer_must_match_secret() {
        assert!(check_bearer(&headers(Some("Bearer s3cret")), Some("s3cret")).is_ok());
        assert!(check_bearer(&headers(Some("Bearer wrong")), Some("s3cret")).is_err());
        assert!(check_bearer(&headers(Some("s3cret")), Some("s3cret")).is_err());
        assert!(check_bearer(&headers(None), Some("s3cret")).is_err());
    }

    #[test]
    fn test_unset_or_empty_secret_denies_everything() {
        assert!(check_bearer(&headers(Some("Bearer ")), Some("")).is_err());
        assert!(check_bearer(&headers(Some("Bearer anything")), None).is_err());
    }

    #[test]
    fn test_quota_error_response() {
        let response = ApiError::Check(CheckError::QuotaReached {
            current: 3,
            limit: 3,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
