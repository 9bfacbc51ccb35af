//! Tracing/logging setup and lifecycle banners shared by the services.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Startup / ready / shutdown events.
pub mod banner;

pub use banner::{ServiceInfo, log_header, log_ready, log_shutdown};
