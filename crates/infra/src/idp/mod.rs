//! Identity provider boundary.
//!
//! The provider is the system of record for credentials, tokens and realm
//! roles. Services only talk to it through [`IdentityProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_auth::{RealmRole, RealmRoleSource, RoleCacheError};
use warden_core::IdpUid;

pub mod in_memory;
pub mod keycloak;

pub use in_memory::InMemoryIdentityProvider;
pub use keycloak::{KeycloakClient, KeycloakConfig};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdpError {
    #[error("identity provider unreachable: {0}")]
    Network(String),

    /// Non-success HTTP status; `body` is the raw response text.
    #[error("identity provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected identity provider response: {0}")]
    Decode(String),

    #[error("identity provider did not return the new account id")]
    MissingLocation,

    #[error("unknown realm role '{0}'")]
    UnknownRole(String),

    #[error("identity provider admin credentials are not configured")]
    AdminCredentialsMissing,

    #[error("identity provider not ready: {0}")]
    NotReady(String),
}

impl IdpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            IdpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Token endpoint response, narrowed to what callers hand back to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
}

/// Subset of the OIDC userinfo document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: IdpUid,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A provider account to create. `roles` are realm role names.
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub roles: Vec<String>,
}

impl core::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewAccount")
            .field("user_name", &self.user_name)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// Full profile to push after a local update. `roles: None` leaves the
/// provider's role mappings untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub roles: Option<Vec<String>>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<TokenSet, IdpError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IdpError>;

    async fn logout(&self, refresh_token: &str) -> Result<(), IdpError>;

    async fn user_info(&self, access_token: &str) -> Result<UserInfo, IdpError>;

    async fn realm_roles(&self) -> Result<Vec<RealmRole>, IdpError>;

    /// Create an account with the given realm roles and return its uid.
    async fn create_user(&self, account: &NewAccount) -> Result<IdpUid, IdpError>;

    async fn update_user(&self, uid: IdpUid, update: &AccountUpdate) -> Result<(), IdpError>;

    async fn delete_user(&self, uid: IdpUid) -> Result<(), IdpError>;

    /// Create the realm role if it does not exist yet.
    async fn ensure_realm_role(&self, name: &str) -> Result<(), IdpError>;

    /// Provision realm-level settings (realm, client). No-op by default.
    async fn initialize_realm(&self) -> Result<(), IdpError> {
        Ok(())
    }
}

/// Adapts an [`IdentityProvider`] to the role cache's source trait.
pub struct IdpRoleSource {
    idp: Arc<dyn IdentityProvider>,
}

impl IdpRoleSource {
    pub fn new(idp: Arc<dyn IdentityProvider>) -> Self {
        Self { idp }
    }
}

#[async_trait]
impl RealmRoleSource for IdpRoleSource {
    async fn list_realm_roles(&self) -> Result<Vec<RealmRole>, RoleCacheError> {
        self.idp
            .realm_roles()
            .await
            .map_err(|e| RoleCacheError::RoleFetchFailed(e.to_string()))
    }
}
