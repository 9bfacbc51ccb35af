//! Startup provisioning: realm roles, then the system admin account.

use thiserror::Error;

use warden_auth::RoleCacheError;
use warden_auth::roles::REALM_ROLE_NAMES;
use warden_core::UserId;
use warden_infra::{IdentityProvider, IdpError};

use crate::config::SystemAdminSeed;
use crate::manager::{ManagerError, UserManager};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to provision realm role '{role}': {source}")]
    Role { role: &'static str, source: IdpError },

    #[error("failed to load realm roles: {0}")]
    RoleCache(#[from] RoleCacheError),

    #[error("failed to provision system admin: {0}")]
    SystemAdmin(#[from] ManagerError),
}

/// Idempotent; safe to run on every start.
pub async fn bootstrap(manager: &UserManager, seed: &SystemAdminSeed) -> Result<UserId, BootstrapError> {
    let idp = manager.identity_provider();
    for role in REALM_ROLE_NAMES {
        idp.ensure_realm_role(role)
            .await
            .map_err(|source| BootstrapError::Role { role, source })?;
    }

    let roles = manager.gate().role_cache();
    roles.invalidate();
    roles.refresh().await?;

    let id = manager.create_system_admin(seed).await?;
    manager.gate().system_admin().prime(id);
    tracing::info!(user_id = %id, "bootstrap complete");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warden_infra::{InMemoryIdentityProvider, InMemoryUserRepository, UserRepository};

    fn seed() -> SystemAdminSeed {
        SystemAdminSeed {
            user_name: "sysadmin".to_string(),
            first_name: "System".to_string(),
            last_name: "Admin".to_string(),
            email: "root@x.com".to_string(),
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn provisions_roles_and_system_admin_once() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let idp = Arc::new(InMemoryIdentityProvider::new());
        let manager = UserManager::new(repo.clone(), idp.clone(), "sysadmin");

        let first = bootstrap(&manager, &seed()).await.unwrap();
        let second = bootstrap(&manager, &seed()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.len(), 1);
        assert_eq!(idp.account_count(), 1);
        for name in REALM_ROLE_NAMES {
            assert!(idp.role_id(name).is_some(), "missing role {name}");
        }

        let record = repo.find_by_id(first).await.unwrap().unwrap();
        assert_eq!(record.roles, vec![idp.role_id("systemAdmin").unwrap()]);
        assert_eq!(manager.gate().system_admin().cached(), Some(first));
    }

    #[tokio::test]
    async fn unreachable_role_listing_fails_bootstrap() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let idp = Arc::new(InMemoryIdentityProvider::with_standard_roles());
        idp.fail_roles(true);
        let manager = UserManager::new(repo.clone(), idp, "sysadmin");

        let err = bootstrap(&manager, &seed()).await.unwrap_err();
        assert!(matches!(err, BootstrapError::RoleCache(_)));
        assert!(repo.is_empty());
    }
}
