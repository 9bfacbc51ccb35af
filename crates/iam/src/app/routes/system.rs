use std::sync::Arc;

use axum::{
    Extension, Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use warden_auth::SystemAdminError;

use crate::app::errors::{failure, internal_error};
use crate::manager::{ManagerError, UserManager};

pub async fn ping() -> Json<&'static str> {
    Json("pong!")
}

/// The system admin's id as a bare JSON string.
pub async fn get_sys_id(Extension(manager): Extension<Arc<UserManager>>) -> Response {
    match manager.system_admin_id().await {
        Ok(id) => Json(id).into_response(),
        Err(ManagerError::SystemAdmin(SystemAdminError::NotProvisioned)) => {
            failure(StatusCode::NOT_FOUND, "System admin not found")
        }
        Err(e) => {
            tracing::error!(error = %e, "system admin lookup failed");
            internal_error()
        }
    }
}
