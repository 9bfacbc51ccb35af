//! Memoized lookup of the system administrator's internal id.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use warden_core::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemAdminError {
    #[error("system admin account is not provisioned")]
    NotProvisioned,

    #[error("system admin lookup failed: {0}")]
    Lookup(String),
}

/// Where the system admin id comes from: the user repository inside the
/// identity administration service, or that service's `/get_sys_id` endpoint
/// from the gateway.
#[async_trait]
pub trait SystemAdminSource: Send + Sync {
    /// `Ok(None)` when no system admin account exists.
    async fn find_system_admin_id(&self) -> Result<Option<UserId>, SystemAdminError>;
}

pub struct SystemAdminResolver {
    source: Arc<dyn SystemAdminSource>,
    cached: RwLock<Option<UserId>>,
}

impl SystemAdminResolver {
    pub fn new(source: Arc<dyn SystemAdminSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    /// Resolve once, then serve from memory for the lifetime of the process.
    pub async fn system_admin_id(&self) -> Result<UserId, SystemAdminError> {
        if let Some(id) = self.cached() {
            return Ok(id);
        }

        tracing::warn!("system admin id not cached, resolving");
        let id = self
            .source
            .find_system_admin_id()
            .await?
            .ok_or(SystemAdminError::NotProvisioned)?;

        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id);
        Ok(id)
    }

    pub fn cached(&self) -> Option<UserId> {
        *self
            .cached
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed the memo directly (used right after bootstrap creates the account).
    pub fn prime(&self, id: UserId) {
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id);
    }

    pub fn invalidate(&self) {
        *self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// `true` iff the caller is the system admin. Resolver failures propagate.
    pub async fn is_system_admin(&self, caller: UserId) -> Result<bool, SystemAdminError> {
        Ok(self.system_admin_id().await? == caller)
    }
}
