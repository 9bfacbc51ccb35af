//! Identity-aware API gateway: authenticates callers against the identity
//! provider and forwards requests to the backend services.

pub mod app;
pub mod authz;
pub mod body;
pub mod config;
pub mod context;
pub mod forwarder;
pub mod middleware;
pub mod routing;
pub mod upstream;
