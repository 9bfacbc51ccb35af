//! User record model shared by the identity administration service and its stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{IdpUid, RoleId, UserId};

/// A persisted user record.
///
/// # Invariants
/// - `user_name` is stored lowercase and is unique case-insensitively.
/// - `email` is unique.
/// - `idp_uid` is only `None` transiently, while the identity provider account
///   is being created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub idp_uid: Option<IdpUid>,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub roles: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub idp_uid: IdpUid,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub roles: Vec<RoleId>,
}

impl NewUser {
    /// Materialize the record with a fresh id and timestamps.
    pub fn into_record(self, id: UserId, now: DateTime<Utc>) -> UserRecord {
        UserRecord {
            id,
            idp_uid: Some(self.idp_uid),
            user_name: self.user_name.to_lowercase(),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            roles: self.roles,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<RoleId>>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.user_name.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.roles.is_none()
    }

    /// Apply the patch in place and bump `updated_at`.
    pub fn apply(&self, record: &mut UserRecord, now: DateTime<Utc>) {
        if let Some(user_name) = &self.user_name {
            record.user_name = user_name.to_lowercase();
        }
        if let Some(first_name) = &self.first_name {
            record.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            record.last_name = last_name.clone();
        }
        if let Some(email) = &self.email {
            record.email = email.clone();
        }
        if let Some(roles) = &self.roles {
            record.roles = roles.clone();
        }
        record.updated_at = now;
    }
}
