//! HTTP application wiring for the identity administration service.
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: response envelopes
//! - `errors.rs`: `{status: "failed", message}` error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;

use crate::manager::UserManager;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(manager: Arc<UserManager>) -> Router {
    Router::new()
        .route("/ping", get(routes::system::ping))
        .route("/get_sys_id", get(routes::system::get_sys_id))
        .route("/create", post(routes::users::create))
        .route("/update", put(routes::users::update))
        .route("/delete/:user_id", delete(routes::users::delete))
        .route("/get", get(routes::users::get_self))
        .route("/get/:user_id", get(routes::users::get_by_id))
        .route("/get_by_keycloak_uid/:uid", get(routes::users::get_by_idp_uid))
        .route("/roles", get(routes::users::roles))
        .layer(ServiceBuilder::new().layer(Extension(manager)))
}
