//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: shared clients (identity provider, user directory, forwarder)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    routing::{any, get, post},
};
use tower::ServiceBuilder;

use crate::body::BODY_LIMIT;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::GatewayServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: GatewayServices) -> Router {
    // Forward routes: require a bearer token resolved to a local user.
    let protected = Router::new()
        .route("/api/:service/:action", any(routes::forward::forward))
        .route("/api/:service/:action/*path", any(routes::forward::forward))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(axum::middleware::from_fn_with_state(
            services.auth_state(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/ping", get(routes::system::ping))
        .route("/api/login", post(routes::session::login))
        .route("/api/refresh", post(routes::session::refresh))
        .route("/api/logout", post(routes::session::logout))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_id_middleware))
                .layer(Extension(services)),
        )
}
