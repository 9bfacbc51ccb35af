use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use warden_infra::IdpError;

use crate::forwarder::ForwardError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn internal_error() -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal Server Error")
}

pub fn forward_error_to_response(err: ForwardError) -> Response {
    let status = err.status();
    match err {
        ForwardError::ServiceNotFound => json_error(status, "service_not_found", "Service not found"),
        ForwardError::AccessDenied => json_error(status, "access_denied", "Access denied"),
        ForwardError::MethodNotSupported => json_error(status, "method_not_supported", "Method not supported"),
        ForwardError::Unauthenticated => json_error(status, "unauthorized", "Unauthorized"),
        ForwardError::Body(e) => json_error(status, "invalid_body", e.to_string()),
        ForwardError::SystemAdmin(e) => {
            tracing::error!(error = %e, "system admin lookup failed");
            internal_error()
        }
        ForwardError::Upstream(message) => json_error(status, "upstream_error", message),
    }
}

/// Provider rejections (bad credentials, expired refresh token) are passed
/// through with their status and body; anything else is logged and hidden.
pub fn idp_error_to_response(err: IdpError) -> Response {
    match err {
        IdpError::Status { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| json!({ "message": body }));
            (status, axum::Json(body)).into_response()
        }
        other => {
            tracing::error!(error = %other, "identity provider call failed");
            internal_error()
        }
    }
}
