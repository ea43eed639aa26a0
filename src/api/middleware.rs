//! API Middleware
//!
//! Bearer-token authentication, request logging and the operational log.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;

use super::metrics::METRICS_PATH;
use super::oplog::OperationalLog;
use super::state::AppState;

const CORRELATION_HEADER: &str = "x-correlation-id";

// =========================================================================
// JWT authentication
// =========================================================================

/// Resolve the caller from `Authorization: Bearer <jwt>` and attach it to the
/// request's `OperationContext`
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    let claims = state.auth.verify_token(token)?;

    let mut context = request
        .extensions()
        .get::<OperationContext>()
        .cloned()
        .unwrap_or_default()
        .with_caller(claims.user_id);
    context.ensure_correlation_id();

    request.extensions_mut().insert(context.clone());
    request.extensions_mut().insert(claims);

    let mut response = next.run(request).await;
    // Lets the outer logging layer see who called
    response.extensions_mut().insert(context);
    Ok(response)
}

// =========================================================================
// Header masking
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request logging
// =========================================================================

/// Largest request body buffered for the operational log
const MAX_LOGGED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Paths that are neither logged nor captured
const UNLOGGED_PATHS: &[&str] = &["/health", METRICS_PATH];

/// Assigns a correlation id, logs the request and its outcome, and emits one
/// operational log record carrying both bodies. `/health` and `/metrics` are
/// not logged.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    if UNLOGGED_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let method = parts.method.clone();
    let uri = parts.uri.clone();
    let headers = mask_headers_for_logging(&parts.headers);

    let correlation_id = parts
        .headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    parts
        .extensions
        .insert(OperationContext::new().with_correlation_id(correlation_id));

    let request_bytes = match to_bytes(body, MAX_LOGGED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::InvalidRequest(format!("unreadable request body: {e}"))
                .into_response()
        }
    };
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let oplog = OperationalLog::new(host, uri.path().to_string(), method.to_string())
        .with_request(content_type, &request_bytes);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = %correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let request = Request::from_parts(parts, Body::from(request_bytes));
    let response = next.run(request).await;

    let caller = response
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.caller_user_id);
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = %correlation_id,
        caller = ?caller,
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    let response_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::Internal(format!("unreadable response body: {e}")).into_response()
        }
    };

    let oplog = oplog
        .with_response(status, &response_bytes)
        .with_user(caller);
    match serde_json::to_string(&oplog) {
        Ok(record) => tracing::info!(
            correlation_id = %correlation_id,
            oplog = %record,
            "Operational log"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize operational log"),
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        parts.headers.insert(CORRELATION_HEADER, value);
    }
    Response::from_parts(parts, Body::from(response_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        headers.insert("x-correlation-id", "c-123".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let auth = masked.iter().find(|(k, _)| k == "authorization");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let correlation = masked.iter().find(|(k, _)| k == "x-correlation-id");

        assert_eq!(auth.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(correlation.unwrap().1, "c-123");
    }

    #[test]
    fn test_unlogged_paths() {
        assert!(UNLOGGED_PATHS.contains(&"/health"));
        assert!(UNLOGGED_PATHS.contains(&"/metrics"));
        assert!(!UNLOGGED_PATHS.contains(&"/login"));
    }

    #[test]
    fn test_sensitive_headers_list() {
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(SENSITIVE_HEADERS.contains(&"cookie"));
        assert!(!SENSITIVE_HEADERS.contains(&"content-type"));
    }
}
