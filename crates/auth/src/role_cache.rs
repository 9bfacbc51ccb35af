//! Process-wide memo of the privileged realm role ids.
//!
//! Populated lazily from the identity provider and refreshed only on demand.
//! The lock is never held across an `.await`: a fetch happens unlocked and the
//! result is swapped in afterwards, so concurrent first-populates may fetch
//! twice and the last write wins.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use warden_core::RoleId;

use crate::roles::{PrivilegedRole, RealmRole};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleCacheError {
    #[error("failed to fetch realm roles: {0}")]
    RoleFetchFailed(String),
}

/// Source of the realm role list (the identity provider).
#[async_trait]
pub trait RealmRoleSource: Send + Sync {
    async fn list_realm_roles(&self) -> Result<Vec<RealmRole>, RoleCacheError>;
}

/// Cached ids of the privileged roles. A `None` means the role was not present
/// in the realm at the last refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegedRoleIds {
    pub admin: Option<RoleId>,
    pub system_admin: Option<RoleId>,
}

impl PrivilegedRoleIds {
    pub fn from_realm_roles(roles: &[RealmRole]) -> Self {
        let mut ids = Self::default();
        for role in roles {
            if role.name == PrivilegedRole::Admin.as_str() {
                ids.admin = Some(role.id.clone());
            } else if role.name == PrivilegedRole::SystemAdmin.as_str() {
                ids.system_admin = Some(role.id.clone());
            }
        }
        ids
    }

    pub fn get(&self, role: PrivilegedRole) -> Option<&RoleId> {
        match role {
            PrivilegedRole::Admin => self.admin.as_ref(),
            PrivilegedRole::SystemAdmin => self.system_admin.as_ref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.admin.is_some() && self.system_admin.is_some()
    }

    /// `true` iff `roles` contains any known privileged id.
    pub fn intersects(&self, roles: &[RoleId]) -> bool {
        roles
            .iter()
            .any(|r| self.admin.as_ref() == Some(r) || self.system_admin.as_ref() == Some(r))
    }
}

pub struct RoleCache {
    source: Arc<dyn RealmRoleSource>,
    ids: RwLock<Option<PrivilegedRoleIds>>,
}

impl RoleCache {
    pub fn new(source: Arc<dyn RealmRoleSource>) -> Self {
        Self {
            source,
            ids: RwLock::new(None),
        }
    }

    /// Current cached ids, if the cache has been populated.
    pub fn snapshot(&self) -> Option<PrivilegedRoleIds> {
        self.ids
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-fetch the realm roles. On failure the cache is left untouched.
    pub async fn refresh(&self) -> Result<PrivilegedRoleIds, RoleCacheError> {
        let roles = self.source.list_realm_roles().await?;
        let ids = PrivilegedRoleIds::from_realm_roles(&roles);

        tracing::debug!(
            admin = ?ids.admin,
            system_admin = ?ids.system_admin,
            "role cache refreshed"
        );

        *self
            .ids
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ids.clone());
        Ok(ids)
    }

    /// Id of a privileged role, populating the cache on first access.
    pub async fn role_id(&self, role: PrivilegedRole) -> Result<Option<RoleId>, RoleCacheError> {
        if let Some(ids) = self.snapshot() {
            return Ok(ids.get(role).cloned());
        }
        let ids = self.refresh().await?;
        Ok(ids.get(role).cloned())
    }

    /// `true` iff `roles` intersects `{admin, systemAdmin}`.
    ///
    /// When either id is unknown, one refresh is attempted first. A failed
    /// refresh is logged and the check runs against whatever is cached.
    pub async fn is_privileged(&self, roles: &[RoleId]) -> bool {
        let cached = self.snapshot().unwrap_or_default();
        if cached.is_complete() {
            return cached.intersects(roles);
        }

        match self.refresh().await {
            Ok(ids) => ids.intersects(roles),
            Err(e) => {
                tracing::error!(error = %e, "privileged role ids unavailable");
                cached.intersects(roles)
            }
        }
    }

    /// Drop the cached ids; the next access re-fetches.
    pub fn invalidate(&self) {
        *self
            .ids
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scriptable role source shared with the gate tests.
    pub(crate) struct FakeRoles {
        pub roles: Mutex<Vec<RealmRole>>,
        pub fail: AtomicBool,
        pub calls: AtomicUsize,
    }

    impl FakeRoles {
        pub(crate) fn standard() -> Arc<Self> {
            Arc::new(Self {
                roles: Mutex::new(vec![
                    role("r-user", "user"),
                    role("r-admin", "admin"),
                    role("r-sys", "systemAdmin"),
                ]),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }
    }

    pub(crate) fn role(id: &str, name: &str) -> RealmRole {
        RealmRole {
            id: RoleId::new(id),
            name: name.to_string(),
            description: None,
        }
    }

    #[async_trait]
    impl RealmRoleSource for FakeRoles {
        async fn list_realm_roles(&self) -> Result<Vec<RealmRole>, RoleCacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RoleCacheError::RoleFetchFailed("provider down".to_string()));
            }
            Ok(self.roles.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn lookups_are_idempotent_and_cached() {
        let source = FakeRoles::standard();
        let cache = RoleCache::new(source.clone());

        let first = cache.role_id(PrivilegedRole::Admin).await.unwrap();
        let second = cache.role_id(PrivilegedRole::Admin).await.unwrap();

        assert_eq!(first, Some(RoleId::new("r-admin")));
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_cache_empty() {
        let source = FakeRoles::standard();
        source.fail.store(true, Ordering::SeqCst);
        let cache = RoleCache::new(source.clone());

        assert!(matches!(
            cache.role_id(PrivilegedRole::SystemAdmin).await,
            Err(RoleCacheError::RoleFetchFailed(_))
        ));
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn is_privileged_fails_closed_when_provider_is_down() {
        let source = FakeRoles::standard();
        source.fail.store(true, Ordering::SeqCst);
        let cache = RoleCache::new(source.clone());

        assert!(!cache.is_privileged(&[RoleId::new("r-admin")]).await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn is_privileged_matches_either_role() {
        let cache = RoleCache::new(FakeRoles::standard());

        assert!(cache.is_privileged(&[RoleId::new("r-admin")]).await);
        assert!(cache.is_privileged(&[RoleId::new("r-user"), RoleId::new("r-sys")]).await);
        assert!(!cache.is_privileged(&[RoleId::new("r-user")]).await);
        assert!(!cache.is_privileged(&[]).await);
    }

    #[tokio::test]
    async fn incomplete_cache_refreshes_once_per_check() {
        let source = FakeRoles::standard();
        source.roles.lock().unwrap().retain(|r| r.name != "systemAdmin");
        let cache = RoleCache::new(source.clone());

        assert!(cache.is_privileged(&[RoleId::new("r-admin")]).await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let source = FakeRoles::standard();
        let cache = RoleCache::new(source.clone());

        cache.refresh().await.unwrap();
        source.roles.lock().unwrap()[1] = role("r-admin-2", "admin");
        assert_eq!(
            cache.role_id(PrivilegedRole::Admin).await.unwrap(),
            Some(RoleId::new("r-admin"))
        );

        cache.invalidate();
        assert_eq!(
            cache.role_id(PrivilegedRole::Admin).await.unwrap(),
            Some(RoleId::new("r-admin-2"))
        );
    }
}
