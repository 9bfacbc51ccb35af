use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use warden_auth::{AuthorizationGate, IdentityHeaderMode, RoleCache, SystemAdminResolver};
use warden_infra::{IdentityProvider, IdpError, IdpRoleSource, KeycloakClient};

use crate::config::GatewayConfig;
use crate::forwarder::Forwarder;
use crate::middleware::AuthState;
use crate::routing::RoutingTable;
use crate::upstream::{DirectoryError, UserDirectoryClient};

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("no route configured for the user service")]
    MissingUserRoute,

    #[error(transparent)]
    Idp(#[from] IdpError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Everything the gateway handlers share.
#[derive(Clone)]
pub struct GatewayServices {
    pub idp: Arc<dyn IdentityProvider>,
    pub directory: Arc<UserDirectoryClient>,
    pub forwarder: Arc<Forwarder>,
}

impl GatewayServices {
    pub fn new(
        idp: Arc<dyn IdentityProvider>,
        routing: RoutingTable,
        identity_mode: IdentityHeaderMode,
        upstream_timeout: Duration,
    ) -> Result<Self, ServicesError> {
        let users_url = routing.base("user").ok_or(ServicesError::MissingUserRoute)?;
        let directory = Arc::new(UserDirectoryClient::new(users_url, upstream_timeout)?);

        let roles = Arc::new(RoleCache::new(Arc::new(IdpRoleSource::new(idp.clone()))));
        let system_admin = Arc::new(SystemAdminResolver::new(directory.clone()));
        let gate = AuthorizationGate::new(roles, system_admin);

        let forwarder = Arc::new(Forwarder::new(routing, gate, identity_mode, upstream_timeout)?);
        Ok(Self {
            idp,
            directory,
            forwarder,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ServicesError> {
        let idp: Arc<dyn IdentityProvider> = Arc::new(KeycloakClient::new(config.keycloak.clone())?);
        Self::new(
            idp,
            config.routing.clone(),
            config.identity_header,
            config.upstream_timeout,
        )
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            idp: self.idp.clone(),
            directory: self.directory.clone(),
        }
    }
}
