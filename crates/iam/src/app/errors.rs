use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::app::dto::Failure;
use crate::manager::ManagerError;

pub fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(Failure {
            status: "failed",
            message: message.to_string(),
        }),
    )
        .into_response()
}

pub fn internal_error() -> Response {
    failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

pub fn bad_request(rejection: JsonRejection) -> Response {
    failure(StatusCode::BAD_REQUEST, &rejection.body_text())
}

pub fn manager_error_status(err: &ManagerError) -> StatusCode {
    match err {
        ManagerError::Validation(_) => StatusCode::BAD_REQUEST,
        ManagerError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ManagerError::Forbidden(_) => StatusCode::FORBIDDEN,
        ManagerError::NotFound => StatusCode::NOT_FOUND,
        ManagerError::Idp(_) | ManagerError::Roles(_) => StatusCode::BAD_GATEWAY,
        ManagerError::Repository(_) | ManagerError::SystemAdmin(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-caused errors carry their message; provider and storage failures
/// are logged and replaced by a generic one.
pub fn manager_error_to_response(err: ManagerError) -> Response {
    let status = manager_error_status(&err);
    match err {
        ManagerError::Validation(message) => failure(status, &message),
        ManagerError::Forbidden(message) => failure(status, message),
        ManagerError::Unauthenticated => failure(status, "Unauthorized"),
        ManagerError::NotFound => failure(status, "User not found"),
        ManagerError::Idp(e) => {
            tracing::error!(error = %e, "identity provider call failed");
            failure(status, "Keycloak error")
        }
        ManagerError::Roles(e) => {
            tracing::error!(error = %e, "realm roles unavailable");
            failure(status, "Keycloak error")
        }
        ManagerError::Repository(e) => {
            tracing::error!(error = %e, "user repository failure");
            internal_error()
        }
        ManagerError::SystemAdmin(e) => {
            tracing::error!(error = %e, "system admin lookup failed");
            internal_error()
        }
    }
}
