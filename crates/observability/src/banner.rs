//! Lifecycle banners, emitted as structured `tracing` events so they land in
//! the same JSON stream as everything else.

use chrono::Utc;

/// What a service reports about itself when it comes up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Storage backend description, if the service has one.
    pub database: Option<String>,
}

impl ServiceInfo {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Call first thing in `main`, before configuration is loaded.
pub fn log_header(service: &str, version: &str) {
    tracing::info!(service, version, "starting");
}

/// Call once initialization has completed and the listener is bound.
pub fn log_ready(info: &ServiceInfo) {
    tracing::info!(
        service = info.service,
        version = info.version,
        environment = %info.environment,
        host = %info.host,
        port = info.port,
        workers = info.workers,
        database = info.database.as_deref().unwrap_or("-"),
        url = %info.url(),
        started_at = %Utc::now().to_rfc3339(),
        "service is running"
    );
}

pub fn log_shutdown(service: &str) {
    tracing::info!(service, stopped_at = %Utc::now().to_rfc3339(), "shutting down");
}
