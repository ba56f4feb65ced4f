//! HTTP handlers for the completion surface.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, Json};

use crate::api::types::{ChatRequest, ErrorResponse};
use crate::api::AppState;
use crate::error::{ProxyError, UpstreamError};

/// Header carrying the tenant identity, supplied by the auth collaborator
/// in front of the proxy.
pub const TENANT_HEADER: &str = "x-tenant-id";

pub(crate) fn tenant_from(headers: &HeaderMap) -> String {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("default")
        .to_string()
}

pub(crate) fn map_proxy_error(err: ProxyError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, error_type, code) = match &err {
        ProxyError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error", None),
        ProxyError::SecretBlocked { .. } => (
            StatusCode::BAD_REQUEST,
            "security_error",
            Some("secret_blocked"),
        ),
        ProxyError::QuotaExceeded { .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            "quota_error",
            Some("quota_exceeded"),
        ),
        ProxyError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_error",
            Some("rate_limit"),
        ),
        ProxyError::Upstream(UpstreamError::Timeout(_)) => (
            StatusCode::GATEWAY_TIMEOUT,
            "upstream_error",
            Some("upstream_timeout"),
        ),
        ProxyError::Upstream(UpstreamError::Status { status, .. }) => (
            // Pass the upstream status through when it is a valid code.
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            "upstream_error",
            None,
        ),
        ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error", None),
        ProxyError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
    };

    (
        status,
        Json(ErrorResponse::new(err.to_string(), error_type, code)),
    )
}

pub(crate) fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, "invalid_request_error", None)),
    )
}

pub async fn chat_completions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response, (StatusCode, Json<ErrorResponse>)> {
    let tenant = tenant_from(&headers);

    if !state.limiter.check(&tenant) {
        return Err(map_proxy_error(ProxyError::RateLimited));
    }

    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("Invalid JSON body: {}", e)))?;

    if request.is_stream() {
        return super::stream::handle_streaming(state, request, tenant).await;
    }

    let response = state
        .proxy
        .chat_completion(request, &tenant)
        .await
        .map_err(map_proxy_error)?;
    Ok(axum::response::IntoResponse::into_response(Json(response)))
}

pub async fn models_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    state
        .proxy
        .models()
        .await
        .map(Json)
        .map_err(map_proxy_error)
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
