use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{IdpUid, UserId, UserPatch, UserRecord};

use super::{RepositoryError, UserRepository};

/// In-memory user store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    inner: RwLock<HashMap<UserId, UserRecord>>,
    fail_next_insert: AtomicBool,
}

fn lock_error() -> RepositoryError {
    RepositoryError::Backend("lock poisoned".to_string())
}

fn check_unique(
    records: &HashMap<UserId, UserRecord>,
    candidate: &UserRecord,
) -> Result<(), RepositoryError> {
    for other in records.values().filter(|r| r.id != candidate.id) {
        if other.user_name.eq_ignore_ascii_case(&candidate.user_name) {
            return Err(RepositoryError::Duplicate("user_name".to_string()));
        }
        if other.email == candidate.email {
            return Err(RepositoryError::Duplicate("email".to_string()));
        }
        if candidate.idp_uid.is_some() && other.idp_uid == candidate.idp_uid {
            return Err(RepositoryError::Duplicate("idp_uid".to_string()));
        }
    }
    Ok(())
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `insert` fail with a backend error.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, pred: impl Fn(&UserRecord) -> bool) -> Result<Option<UserRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| lock_error())?;
        Ok(map.values().find(|r| pred(r)).cloned())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, record: UserRecord) -> Result<UserRecord, RepositoryError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Backend("injected insert failure".to_string()));
        }
        let mut map = self.inner.write().map_err(|_| lock_error())?;
        if map.contains_key(&record.id) {
            return Err(RepositoryError::Duplicate("id".to_string()));
        }
        check_unique(&map, &record)?;
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let map = self.inner.read().map_err(|_| lock_error())?;
        Ok(map.get(&id).cloned())
    }

    async fn find_by_user_name(&self, user_name: &str) -> Result<Option<UserRecord>, RepositoryError> {
        self.find(|r| r.user_name.eq_ignore_ascii_case(user_name))
    }

    async fn find_by_idp_uid(&self, uid: IdpUid) -> Result<Option<UserRecord>, RepositoryError> {
        self.find(|r| r.idp_uid == Some(uid))
    }

    async fn user_name_exists(&self, user_name: &str, exclude: Option<UserId>) -> Result<bool, RepositoryError> {
        self.find(|r| Some(r.id) != exclude && r.user_name.eq_ignore_ascii_case(user_name))
            .map(|found| found.is_some())
    }

    async fn email_exists(&self, email: &str, exclude: Option<UserId>) -> Result<bool, RepositoryError> {
        self.find(|r| Some(r.id) != exclude && r.email == email)
            .map(|found| found.is_some())
    }

    async fn update(&self, id: UserId, patch: &UserPatch, now: DateTime<Utc>) -> Result<UserRecord, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| lock_error())?;
        let mut updated = map.get(&id).cloned().ok_or(RepositoryError::NotFound)?;
        patch.apply(&mut updated, now);
        check_unique(&map, &updated)?;
        map.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| lock_error())?;
        Ok(map.remove(&id).is_some())
    }
}
