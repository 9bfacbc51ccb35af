use std::sync::Arc;

use async_trait::async_trait;

use warden_auth::{SystemAdminError, SystemAdminSource};
use warden_core::UserId;
use warden_infra::UserRepository;

/// Looks the system admin up by its well-known user name.
pub struct RepositorySystemAdminSource {
    repo: Arc<dyn UserRepository>,
    user_name: String,
}

impl RepositorySystemAdminSource {
    pub fn new(repo: Arc<dyn UserRepository>, user_name: impl Into<String>) -> Self {
        Self {
            repo,
            user_name: user_name.into(),
        }
    }
}

#[async_trait]
impl SystemAdminSource for RepositorySystemAdminSource {
    async fn find_system_admin_id(&self) -> Result<Option<UserId>, SystemAdminError> {
        self.repo
            .find_by_user_name(&self.user_name)
            .await
            .map(|found| found.map(|r| r.id))
            .map_err(|e| SystemAdminError::Lookup(e.to_string()))
    }
}
