use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{DomainError, RoleId, UserId};

/// Serialized identity payload header (JSON object with at least `id` and `roles`).
pub const USER_HEADER: &str = "x-user";
/// Comma-joined role id list.
pub const ROLES_HEADER: &str = "x-roles";
/// Internal user id, sent together with [`ROLES_HEADER`].
pub const USER_ID_HEADER: &str = "x-user-id";

/// The resolved `{id, roles}` pair attached to an authenticated request.
///
/// When decoded from an `X-User` payload, any additional fields of the user
/// record are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub id: UserId,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

/// How the gateway forwards caller identity to upstream services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityHeaderMode {
    /// `X-User: <json>`
    #[default]
    User,
    /// `X-Roles: a,b` + `X-User-Id: <id>`
    Roles,
}

impl FromStr for IdentityHeaderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "roles" => Ok(Self::Roles),
            other => Err(format!("unknown identity header mode '{other}'")),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityHeaderError {
    #[error("malformed identity header: {0}")]
    Malformed(String),

    #[error("missing identity header")]
    Missing,

    #[error(transparent)]
    InvalidUserId(#[from] DomainError),
}

impl CallerIdentity {
    pub fn new(id: UserId, roles: Vec<RoleId>) -> Self {
        Self { id, roles }
    }

    /// Decode an `X-User` header value.
    pub fn from_user_header(value: &str) -> Result<Self, IdentityHeaderError> {
        serde_json::from_str(value).map_err(|e| IdentityHeaderError::Malformed(e.to_string()))
    }

    /// Decode the `X-User-Id` / `X-Roles` header pair.
    pub fn from_role_headers(user_id: &str, roles: Option<&str>) -> Result<Self, IdentityHeaderError> {
        let id: UserId = user_id.parse()?;
        let roles = roles
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(RoleId::new)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { id, roles })
    }

    pub fn roles_header_value(&self) -> String {
        self.roles
            .iter()
            .map(RoleId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn is(&self, user_id: UserId) -> bool {
        self.id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn caller() -> CallerIdentity {
        CallerIdentity::new(
            UserId::from_uuid(Uuid::now_v7()),
            vec![RoleId::new("r-admin"), RoleId::new("r-user")],
        )
    }

    #[test]
    fn user_header_ignores_extra_record_fields() {
        let c = caller();
        let raw = serde_json::json!({
            "id": c.id,
            "user_name": "alice",
            "email": "a@x.com",
            "roles": ["r-admin", "r-user"],
        })
        .to_string();

        assert_eq!(CallerIdentity::from_user_header(&raw).unwrap(), c);
    }

    #[test]
    fn user_header_without_roles_defaults_to_empty() {
        let id = UserId::from_uuid(Uuid::now_v7());
        let raw = format!(r#"{{"id":"{id}"}}"#);
        let decoded = CallerIdentity::from_user_header(&raw).unwrap();
        assert!(decoded.roles.is_empty());
    }

    #[test]
    fn malformed_user_header_is_rejected() {
        assert!(matches!(
            CallerIdentity::from_user_header("{not json"),
            Err(IdentityHeaderError::Malformed(_))
        ));
    }

    #[test]
    fn role_headers_round_trip() {
        let c = caller();
        let decoded =
            CallerIdentity::from_role_headers(&c.id.to_string(), Some(&c.roles_header_value())).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn role_headers_reject_bad_user_id() {
        assert!(matches!(
            CallerIdentity::from_role_headers("nope", Some("a")),
            Err(IdentityHeaderError::InvalidUserId(_))
        ));
    }

    #[test]
    fn header_mode_parses_case_insensitively() {
        assert_eq!("Roles".parse::<IdentityHeaderMode>().unwrap(), IdentityHeaderMode::Roles);
        assert_eq!(" user ".parse::<IdentityHeaderMode>().unwrap(), IdentityHeaderMode::User);
        assert!("jwt".parse::<IdentityHeaderMode>().is_err());
    }
}
