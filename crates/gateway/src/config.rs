//! Gateway configuration, read once from the environment at startup.

use std::time::Duration;

use thiserror::Error;

use warden_auth::IdentityHeaderMode;
use warden_infra::KeycloakConfig;

use crate::routing::RoutingTable;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub environment: String,
    pub keycloak: KeycloakConfig,
    pub routing: RoutingTable,
    pub identity_header: IdentityHeaderMode,
    pub upstream_timeout: Duration,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let keycloak = KeycloakConfig::new(
            required(&lookup, "SERVER_URL")?,
            required(&lookup, "REALM")?,
            required(&lookup, "CLIENT_ID")?,
        )
        .with_client_secret(lookup("CLIENT_SECRET").filter(|s| !s.trim().is_empty()));

        let mut routing = match lookup("SERVICE_MAP") {
            Some(raw) if !raw.trim().is_empty() => RoutingTable::parse(&raw).map_err(|reason| ConfigError::Invalid {
                key: "SERVICE_MAP",
                reason,
            })?,
            _ => RoutingTable::new(),
        };
        routing.insert("user", required(&lookup, "USERS_URL")?);

        let identity_header = parsed(&lookup, "FORWARD_IDENTITY_HEADER", IdentityHeaderMode::User)?;
        let timeout_secs: u64 = parsed(&lookup, "UPSTREAM_TIMEOUT_SECS", 150)?;

        Ok(Self {
            host: lookup("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "GATEWAY_PORT", 8080)?,
            workers: parsed(&lookup, "GATEWAY_WORKERS", 1)?,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "local".to_string()),
            keycloak,
            routing,
            identity_header,
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn users_url(&self) -> Option<&str> {
        self.routing.base("user")
    }
}
