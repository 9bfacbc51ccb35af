//! IAM service configuration, read once from the environment at startup.

use thiserror::Error;

use warden_infra::KeycloakConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// The account created at first start and protected afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct SystemAdminSeed {
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for SystemAdminSeed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SystemAdminSeed")
            .field("user_name", &self.user_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct IamConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub environment: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub system_admin: SystemAdminSeed,
    pub keycloak: KeycloakConfig,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl IamConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let system_admin = SystemAdminSeed {
            user_name: required(&lookup, "SYSTEM_ADMIN_USER_NAME")?.to_lowercase(),
            first_name: required(&lookup, "SYSTEM_ADMIN_FIRST_NAME")?,
            last_name: required(&lookup, "SYSTEM_ADMIN_LAST_NAME")?,
            email: required(&lookup, "SYSTEM_ADMIN_EMAIL")?,
            password: required(&lookup, "SYSTEM_ADMIN_PASSWORD")?,
        };

        let keycloak = KeycloakConfig::new(
            required(&lookup, "SERVER_URL")?,
            required(&lookup, "REALM")?,
            required(&lookup, "CLIENT_ID")?,
        )
        .with_client_secret(optional(&lookup, "CLIENT_SECRET"))
        .with_admin(
            required(&lookup, "KC_BOOTSTRAP_ADMIN_USERNAME")?,
            required(&lookup, "KC_BOOTSTRAP_ADMIN_PASSWORD")?,
        );

        Ok(Self {
            host: optional(&lookup, "IAM_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "IAM_PORT", 8081)?,
            workers: parsed(&lookup, "IAM_WORKERS", 1)?,
            environment: optional(&lookup, "ENVIRONMENT").unwrap_or_else(|| "local".to_string()),
            database_url: optional(&lookup, "DATABASE_URL"),
            system_admin,
            keycloak,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: Vec<(&'static str, &'static str)>) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> = pairs.into_iter().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SYSTEM_ADMIN_USER_NAME", "SysAdmin"),
            ("SYSTEM_ADMIN_FIRST_NAME", "System"),
            ("SYSTEM_ADMIN_LAST_NAME", "Admin"),
            ("SYSTEM_ADMIN_EMAIL", "root@x.com"),
            ("SYSTEM_ADMIN_PASSWORD", "s3cret"),
            ("SERVER_URL", "http://kc:8080"),
            ("REALM", "demo"),
            ("CLIENT_ID", "iam"),
            ("KC_BOOTSTRAP_ADMIN_USERNAME", "admin"),
            ("KC_BOOTSTRAP_ADMIN_PASSWORD", "admin"),
        ]
    }

    #[test]
    fn defaults_and_seed() {
        let cfg = IamConfig::from_lookup(lookup(base())).unwrap();

        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.system_admin.user_name, "sysadmin");
        assert_eq!(cfg.keycloak.admin_username.as_deref(), Some("admin"));
        assert!(!format!("{:?}", cfg.system_admin).contains("s3cret"));
    }

    #[test]
    fn admin_credentials_are_required() {
        let pairs = base()
            .into_iter()
            .filter(|(k, _)| *k != "KC_BOOTSTRAP_ADMIN_PASSWORD")
            .collect();
        assert_eq!(
            IamConfig::from_lookup(lookup(pairs)).unwrap_err(),
            ConfigError::Missing("KC_BOOTSTRAP_ADMIN_PASSWORD")
        );
    }

    #[test]
    fn database_url_selects_postgres() {
        let mut pairs = base();
        pairs.push(("DATABASE_URL", "postgres://localhost/warden"));
        pairs.push(("IAM_WORKERS", "4"));
        let cfg = IamConfig::from_lookup(lookup(pairs)).unwrap();

        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/warden"));
        assert_eq!(cfg.workers, 4);
    }
}
