//! Authorization gate.
//!
//! The decision rules are pure functions (`self_or_privileged`,
//! `role_elevation`, `system_admin_targeted`) so they can be property-tested;
//! [`AuthorizationGate`] wires them to the role cache and the system admin
//! resolver.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use warden_core::{RoleId, UserId};

use crate::principal::CallerIdentity;
use crate::role_cache::RoleCache;
use crate::system_admin::{SystemAdminError, SystemAdminResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotSelfOrPrivileged,
    RoleElevation,
    SystemAdminProtected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AuthzError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AuthzError::Denied(reason)),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("access denied ({0:?})")]
    Denied(DenyReason),

    #[error(transparent)]
    SystemAdmin(#[from] SystemAdminError),
}

/// References to a user that a request may carry: the payload's `id` and
/// `user_id` fields and the path after the action segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetRefs<'a> {
    pub id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub path_suffix: Option<&'a str>,
}

impl<'a> TargetRefs<'a> {
    fn candidates(&self) -> impl Iterator<Item = &'a str> {
        let path_segments = self
            .path_suffix
            .into_iter()
            .flat_map(|p| p.split('/'))
            .filter(|s| !s.is_empty());
        self.id.into_iter().chain(self.user_id).chain(path_segments)
    }
}

fn refers_to(candidate: &str, user: UserId) -> bool {
    candidate
        .trim()
        .parse::<UserId>()
        .is_ok_and(|id| id == user)
}

pub fn self_or_privileged(caller_id: UserId, target: UserId, privileged: bool) -> Decision {
    if caller_id == target || privileged {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotSelfOrPrivileged)
    }
}

pub fn role_elevation(caller_privileged: bool, requests_roles: bool) -> Decision {
    if requests_roles && !caller_privileged {
        Decision::Deny(DenyReason::RoleElevation)
    } else {
        Decision::Allow
    }
}

pub fn system_admin_targeted(system_admin: UserId, caller_id: UserId, refs: &TargetRefs<'_>) -> Decision {
    if caller_id == system_admin {
        return Decision::Allow;
    }
    if refs.candidates().any(|c| refers_to(c, system_admin)) {
        Decision::Deny(DenyReason::SystemAdminProtected)
    } else {
        Decision::Allow
    }
}

#[derive(Clone)]
pub struct AuthorizationGate {
    roles: Arc<RoleCache>,
    system_admin: Arc<SystemAdminResolver>,
}

impl AuthorizationGate {
    pub fn new(roles: Arc<RoleCache>, system_admin: Arc<SystemAdminResolver>) -> Self {
        Self { roles, system_admin }
    }

    pub fn role_cache(&self) -> &Arc<RoleCache> {
        &self.roles
    }

    pub fn system_admin(&self) -> &Arc<SystemAdminResolver> {
        &self.system_admin
    }

    pub async fn is_privileged(&self, roles: &[RoleId]) -> bool {
        self.roles.is_privileged(roles).await
    }

    pub async fn check_self_or_privileged(&self, caller: &CallerIdentity, target: UserId) -> Decision {
        if caller.id == target {
            return Decision::Allow;
        }
        let privileged = self.roles.is_privileged(&caller.roles).await;
        self_or_privileged(caller.id, target, privileged)
    }

    pub async fn check_role_elevation_allowed<R>(&self, caller_roles: &[RoleId], requested: &[R]) -> Decision {
        if requested.is_empty() {
            return Decision::Allow;
        }
        let privileged = self.roles.is_privileged(caller_roles).await;
        role_elevation(privileged, true)
    }

    /// Deny when a non-system-admin caller references the system admin.
    pub async fn check_system_admin_protected(
        &self,
        caller_id: UserId,
        refs: &TargetRefs<'_>,
    ) -> Result<Decision, SystemAdminError> {
        let system_admin = self.system_admin.system_admin_id().await?;
        let decision = system_admin_targeted(system_admin, caller_id, refs);
        if !decision.is_allowed() {
            tracing::warn!(caller = %caller_id, "request targeting the system admin denied");
        }
        Ok(decision)
    }
}
