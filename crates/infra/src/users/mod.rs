//! User record persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_core::{IdpUid, UserId, UserPatch, UserRecord};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryUserRepository;
pub use postgres::PostgresUserRepository;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// A uniqueness constraint on the named field would be violated.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("user not found")]
    NotFound,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence of user records.
///
/// Implementations enforce uniqueness of `user_name` (case-insensitive),
/// `email` and `idp_uid` at write time.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, record: UserRecord) -> Result<UserRecord, RepositoryError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError>;

    async fn find_by_user_name(&self, user_name: &str) -> Result<Option<UserRecord>, RepositoryError>;

    async fn find_by_idp_uid(&self, uid: IdpUid) -> Result<Option<UserRecord>, RepositoryError>;

    /// `exclude` skips the record being updated.
    async fn user_name_exists(&self, user_name: &str, exclude: Option<UserId>) -> Result<bool, RepositoryError>;

    async fn email_exists(&self, email: &str, exclude: Option<UserId>) -> Result<bool, RepositoryError>;

    /// Apply `patch` atomically and return the updated record.
    async fn update(&self, id: UserId, patch: &UserPatch, now: DateTime<Utc>) -> Result<UserRecord, RepositoryError>;

    /// `Ok(false)` when nothing was deleted.
    async fn delete(&self, id: UserId) -> Result<bool, RepositoryError>;
}
