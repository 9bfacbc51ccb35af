//! User administration: local records kept in step with provider accounts.
//!
//! ## Consistency
//!
//! The provider and the local store share no transaction.
//!
//! | Operation | Order | On second-step failure |
//! |-----------|-------|------------------------|
//! | create | provider, then local | provider account deleted; if that fails, `DriftEvent::OrphanedAccount` |
//! | update | local, then provider | local write kept, `DriftEvent::UpdateNotPropagated`, error returned |
//! | delete | provider, then local | local record kept, error returned |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_auth::{
    AllowedRole, AuthorizationGate, CallerIdentity, PrivilegedRole, RealmRole, RoleCache, RoleCacheError,
    SystemAdminError, SystemAdminResolver,
};
use warden_core::{
    DomainError, IdpUid, NewUser, RoleId, UserId, UserPatch, UserRecord, normalize_user_name, validate_email,
    validate_names,
};
use warden_infra::{AccountUpdate, IdentityProvider, IdpError, IdpRoleSource, NewAccount, RepositoryError, UserRepository};

use crate::config::SystemAdminSeed;
use crate::credentials::{CredentialNotifier, LogNotifier, PasswordGenerator, RandomPasswordGenerator};
use crate::directory::RepositorySystemAdminSource;
use crate::reconcile::{DriftEvent, LogSink, ReconciliationSink};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// Shown to the client as is.
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("User not found")]
    NotFound,

    #[error("identity provider: {0}")]
    Idp(#[from] IdpError),

    #[error("realm roles: {0}")]
    Roles(#[from] RoleCacheError),

    #[error("repository: {0}")]
    Repository(RepositoryError),

    #[error(transparent)]
    SystemAdmin(#[from] SystemAdminError),
}

impl From<DomainError> for ManagerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(message) => ManagerError::Validation(message),
            other => ManagerError::Validation(other.to_string()),
        }
    }
}

impl From<RepositoryError> for ManagerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ManagerError::NotFound,
            RepositoryError::Duplicate(field) => ManagerError::Validation(format!("{} already exists", duplicate_label(&field))),
            other => ManagerError::Repository(other),
        }
    }
}

fn duplicate_label(field: &str) -> &'static str {
    match field {
        "user_name" => "User name",
        "email" => "Email",
        _ => "User",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<AllowedRole>,
}

/// Fields left out are not changed. `user_id` defaults to the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<AllowedRole>>,
}

impl UpdateUserInput {
    fn touches_provider_fields(&self) -> bool {
        self.user_name.is_some()
            || self.first_name.is_some()
            || self.last_name.is_some()
            || self.email.is_some()
            || self.roles.as_ref().is_some_and(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The provider account changed, so existing tokens carry stale claims.
    pub reauthentication_required: bool,
}

impl UpdateOutcome {
    pub fn message(&self) -> &'static str {
        if self.reauthentication_required {
            "User updated successfully. A new login token will be needed."
        } else {
            "User updated successfully."
        }
    }
}

/// A user record as returned to clients: the provider uid is never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub roles: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserView {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            user_name: record.user_name,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email,
            roles: record.roles,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Ids of the named realm roles, in request order.
fn resolve_role_ids(names: &[&str], realm: &[RealmRole]) -> Result<Vec<RoleId>, ManagerError> {
    names
        .iter()
        .map(|name| {
            realm
                .iter()
                .find(|r| r.name == *name)
                .map(|r| r.id.clone())
                .ok_or_else(|| ManagerError::Validation("Invalid roles provided".to_string()))
        })
        .collect()
}

fn role_names(roles: &[AllowedRole]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = Vec::with_capacity(roles.len());
    for role in roles {
        if !names.contains(&role.as_str()) {
            names.push(role.as_str());
        }
    }
    names
}

pub struct UserManager {
    repo: Arc<dyn UserRepository>,
    idp: Arc<dyn IdentityProvider>,
    gate: AuthorizationGate,
    passwords: Arc<dyn PasswordGenerator>,
    notifier: Arc<dyn CredentialNotifier>,
    reconciliation: Arc<dyn ReconciliationSink>,
}

impl UserManager {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        idp: Arc<dyn IdentityProvider>,
        system_admin_user_name: impl Into<String>,
    ) -> Self {
        let roles = Arc::new(RoleCache::new(Arc::new(IdpRoleSource::new(idp.clone()))));
        let system_admin = Arc::new(SystemAdminResolver::new(Arc::new(RepositorySystemAdminSource::new(
            repo.clone(),
            system_admin_user_name,
        ))));
        Self {
            repo,
            idp,
            gate: AuthorizationGate::new(roles, system_admin),
            passwords: Arc::new(RandomPasswordGenerator),
            notifier: Arc::new(LogNotifier),
            reconciliation: Arc::new(LogSink),
        }
    }

    pub fn with_passwords(mut self, passwords: Arc<dyn PasswordGenerator>) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CredentialNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_reconciliation(mut self, sink: Arc<dyn ReconciliationSink>) -> Self {
        self.reconciliation = sink;
        self
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn identity_provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.idp
    }

    pub async fn system_admin_id(&self) -> Result<UserId, ManagerError> {
        Ok(self.gate.system_admin().system_admin_id().await?)
    }

    async fn is_system_admin(&self, caller: &CallerIdentity) -> Result<bool, ManagerError> {
        Ok(self.gate.system_admin().is_system_admin(caller.id).await?)
    }

    async fn realm_role_ids(&self, names: &[&str]) -> Result<Vec<RoleId>, ManagerError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let realm = self.idp.realm_roles().await?;
        resolve_role_ids(names, &realm)
    }

    /// Insert the record for a freshly created provider account; delete the
    /// account again when the insert fails.
    async fn insert_or_compensate(&self, record: UserRecord, uid: IdpUid) -> Result<UserRecord, ManagerError> {
        let user_name = record.user_name.clone();
        match self.repo.insert(record).await {
            Ok(saved) => Ok(saved),
            Err(insert_err) => {
                tracing::warn!(idp_uid = %uid, error = %insert_err, "local insert failed, deleting provider account");
                if let Err(rollback_err) = self.idp.delete_user(uid).await {
                    self.reconciliation.report(DriftEvent::OrphanedAccount {
                        idp_uid: uid,
                        user_name,
                        error: rollback_err.to_string(),
                    });
                }
                Err(insert_err.into())
            }
        }
    }

    /// Create the system admin (provider account + record) unless a record
    /// with its user name exists. Returns the record id.
    pub async fn create_system_admin(&self, seed: &SystemAdminSeed) -> Result<UserId, ManagerError> {
        if let Some(existing) = self.repo.find_by_user_name(&seed.user_name).await? {
            tracing::info!(user_id = %existing.id, "system admin already provisioned");
            return Ok(existing.id);
        }

        let role = PrivilegedRole::SystemAdmin.as_str();
        let role_ids = self.realm_role_ids(&[role]).await?;

        let uid = self
            .idp
            .create_user(&NewAccount {
                user_name: seed.user_name.clone(),
                first_name: seed.first_name.clone(),
                last_name: seed.last_name.clone(),
                email: seed.email.clone(),
                password: seed.password.clone(),
                roles: vec![role.to_string()],
            })
            .await?;

        let record = NewUser {
            idp_uid: uid,
            user_name: seed.user_name.clone(),
            first_name: seed.first_name.clone(),
            last_name: seed.last_name.clone(),
            email: seed.email.clone(),
            roles: role_ids,
        }
        .into_record(UserId::new(), Utc::now());

        let saved = self.insert_or_compensate(record, uid).await?;
        tracing::info!(user_id = %saved.id, "system admin created");
        Ok(saved.id)
    }

    /// `caller` is absent for internal calls; when present, requesting roles
    /// requires privilege.
    pub async fn create_user(
        &self,
        caller: Option<&CallerIdentity>,
        input: CreateUserInput,
    ) -> Result<UserId, ManagerError> {
        let user_name = normalize_user_name(&input.user_name);
        validate_names(Some(&user_name), Some(&input.first_name), Some(&input.last_name))?;
        validate_email(&input.email)?;

        if let Some(caller) = caller {
            if !self
                .gate
                .check_role_elevation_allowed(&caller.roles, &input.roles)
                .await
                .is_allowed()
            {
                return Err(ManagerError::Forbidden("Unauthorized to assign roles"));
            }
        }

        if self.repo.user_name_exists(&user_name, None).await? {
            return Err(ManagerError::Validation(format!("Username '{user_name}' already exists")));
        }
        if self.repo.email_exists(&input.email, None).await? {
            return Err(ManagerError::Validation(format!("Email '{}' already exists", input.email)));
        }

        let names = role_names(&input.roles);
        let role_ids = self.realm_role_ids(&names).await?;

        let password = self.passwords.generate();
        let uid = self
            .idp
            .create_user(&NewAccount {
                user_name: user_name.clone(),
                first_name: input.first_name.clone(),
                last_name: input.last_name.clone(),
                email: input.email.clone(),
                password: password.clone(),
                roles: names.iter().map(|n| n.to_string()).collect(),
            })
            .await?;

        let record = NewUser {
            idp_uid: uid,
            user_name,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            roles: role_ids,
        }
        .into_record(UserId::new(), Utc::now());

        let saved = self.insert_or_compensate(record, uid).await?;
        self.notifier
            .credentials_issued(&saved.email, &saved.user_name, &password);
        tracing::info!(user_id = %saved.id, "user created");
        Ok(saved.id)
    }

    pub async fn update_user(&self, caller: &CallerIdentity, input: UpdateUserInput) -> Result<UpdateOutcome, ManagerError> {
        let target = input.user_id.unwrap_or(caller.id);

        if target == self.system_admin_id().await? {
            return Err(ManagerError::Forbidden("System admin user cannot be updated"));
        }
        if !self
            .gate
            .check_self_or_privileged(caller, target)
            .await
            .is_allowed()
        {
            return Err(ManagerError::Forbidden("Unauthorized to update user"));
        }

        let requested_roles = input.roles.clone().unwrap_or_default();
        if !self
            .gate
            .check_role_elevation_allowed(&caller.roles, &requested_roles)
            .await
            .is_allowed()
        {
            return Err(ManagerError::Forbidden("Unauthorized to update roles"));
        }

        let user_name = input.user_name.as_deref().map(normalize_user_name);
        validate_names(user_name.as_deref(), input.first_name.as_deref(), input.last_name.as_deref())?;
        if let Some(email) = &input.email {
            validate_email(email)?;
        }

        let names = role_names(&requested_roles);
        let role_ids = self.realm_role_ids(&names).await?;

        let existing = self.repo.find_by_id(target).await?.ok_or(ManagerError::NotFound)?;

        if let Some(name) = user_name.as_deref().filter(|n| *n != existing.user_name) {
            if self.repo.user_name_exists(name, Some(target)).await? {
                return Err(ManagerError::Validation(format!("Username '{name}' already exists")));
            }
        }
        if let Some(email) = input.email.as_deref().filter(|e| *e != existing.email) {
            if self.repo.email_exists(email, Some(target)).await? {
                return Err(ManagerError::Validation(format!("Email '{email}' already exists")));
            }
        }

        let patch = UserPatch {
            user_name,
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            email: input.email.clone(),
            roles: (!role_ids.is_empty()).then_some(role_ids),
        };
        let updated = self.repo.update(target, &patch, Utc::now()).await?;
        tracing::info!(user_id = %target, "user updated");

        if !input.touches_provider_fields() {
            return Ok(UpdateOutcome {
                reauthentication_required: false,
            });
        }

        let push = match updated.idp_uid {
            Some(uid) => {
                let update = AccountUpdate {
                    user_name: updated.user_name.clone(),
                    first_name: updated.first_name.clone(),
                    last_name: updated.last_name.clone(),
                    email: updated.email.clone(),
                    roles: (!names.is_empty()).then(|| names.iter().map(|n| n.to_string()).collect()),
                };
                self.idp.update_user(uid, &update).await
            }
            None => Err(IdpError::Decode("user record has no provider account".to_string())),
        };

        if let Err(err) = push {
            self.reconciliation.report(DriftEvent::UpdateNotPropagated {
                user_id: target,
                idp_uid: updated.idp_uid,
                error: err.to_string(),
            });
            return Err(err.into());
        }

        Ok(UpdateOutcome {
            reauthentication_required: true,
        })
    }

    pub async fn delete_user(&self, caller: Option<&CallerIdentity>, user_id: UserId) -> Result<(), ManagerError> {
        if user_id == self.system_admin_id().await? {
            return Err(ManagerError::Forbidden("System admin user cannot be deleted"));
        }
        if let Some(caller) = caller {
            if !self
                .gate
                .check_self_or_privileged(caller, user_id)
                .await
                .is_allowed()
            {
                return Err(ManagerError::Forbidden("Unauthorized to delete user"));
            }
        }

        let existing = self.repo.find_by_id(user_id).await?.ok_or(ManagerError::NotFound)?;

        if let Some(uid) = existing.idp_uid {
            match self.idp.delete_user(uid).await {
                Ok(()) => {}
                Err(IdpError::Status { status: 404, .. }) => {
                    tracing::warn!(user_id = %user_id, idp_uid = %uid, "provider account already gone");
                }
                Err(err) => {
                    tracing::error!(user_id = %user_id, idp_uid = %uid, error = %err, "provider delete failed, keeping local record");
                    return Err(err.into());
                }
            }
        }

        if !self.repo.delete(user_id).await? {
            return Err(ManagerError::NotFound);
        }
        tracing::info!(user_id = %user_id, "user deleted");
        Ok(())
    }

    /// Drop the system admin role id from a record shown to anyone but the
    /// system admin.
    async fn view_for(&self, caller: Option<&CallerIdentity>, record: UserRecord) -> Result<UserView, ManagerError> {
        let mut view = UserView::from(record);
        let Some(caller) = caller else {
            return Ok(view);
        };
        if self.is_system_admin(caller).await? {
            return Ok(view);
        }
        if let Some(system_admin_role) = self.gate.role_cache().role_id(PrivilegedRole::SystemAdmin).await? {
            view.roles.retain(|r| *r != system_admin_role);
        }
        Ok(view)
    }

    /// `user_id` defaults to the caller's own record.
    pub async fn get_user(
        &self,
        caller: Option<&CallerIdentity>,
        user_id: Option<UserId>,
    ) -> Result<UserView, ManagerError> {
        let target = match (user_id, caller) {
            (Some(id), Some(caller)) => {
                if !self
                    .gate
                    .check_self_or_privileged(caller, id)
                    .await
                    .is_allowed()
                {
                    return Err(ManagerError::Forbidden("Unauthorized access to user data"));
                }
                id
            }
            (Some(id), None) => id,
            (None, Some(caller)) => caller.id,
            (None, None) => return Err(ManagerError::Unauthenticated),
        };

        let record = self.repo.find_by_id(target).await?.ok_or(ManagerError::NotFound)?;
        self.view_for(caller, record).await
    }

    /// Lookup used by the gateway to resolve a token's subject. Without a
    /// caller the record is returned unfiltered; with one, the same access
    /// and role filtering as [`UserManager::get_user`] applies.
    pub async fn get_user_by_idp_uid(
        &self,
        caller: Option<&CallerIdentity>,
        uid: IdpUid,
    ) -> Result<UserView, ManagerError> {
        let record = self
            .repo
            .find_by_idp_uid(uid)
            .await?
            .ok_or(ManagerError::NotFound)?;

        if let Some(caller) = caller {
            if !self
                .gate
                .check_self_or_privileged(caller, record.id)
                .await
                .is_allowed()
            {
                return Err(ManagerError::Forbidden("Unauthorized access to user data"));
            }
        }
        self.view_for(caller, record).await
    }

    /// Custom realm roles; `systemAdmin` only for the system admin.
    pub async fn get_roles(&self, caller: Option<&CallerIdentity>) -> Result<Vec<RealmRole>, ManagerError> {
        let roles = self.idp.realm_roles().await?;
        let show_system_admin = match caller {
            Some(caller) => self.is_system_admin(caller).await?,
            None => false,
        };
        Ok(roles
            .into_iter()
            .filter(RealmRole::is_custom)
            .filter(|r| show_system_admin || !r.is_system_admin())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap;
    use crate::reconcile::RecordingSink;
    use proptest::prelude::*;
    use warden_infra::{InMemoryIdentityProvider, InMemoryUserRepository};

    struct Harness {
        manager: UserManager,
        repo: Arc<InMemoryUserRepository>,
        idp: Arc<InMemoryIdentityProvider>,
        drift: Arc<RecordingSink>,
        system_admin: CallerIdentity,
    }

    fn seed() -> SystemAdminSeed {
        SystemAdminSeed {
            user_name: "sysadmin".to_string(),
            first_name: "System".to_string(),
            last_name: "Admin".to_string(),
            email: "root@x.com".to_string(),
            password: "root-pw".to_string(),
        }
    }

    async fn harness() -> Harness {
        let repo = Arc::new(InMemoryUserRepository::new());
        let idp = Arc::new(InMemoryIdentityProvider::with_standard_roles());
        let drift = Arc::new(RecordingSink::new());
        let manager = UserManager::new(repo.clone(), idp.clone(), "sysadmin").with_reconciliation(drift.clone());

        let id = bootstrap(&manager, &seed()).await.unwrap();
        let system_admin = CallerIdentity::new(id, vec![idp.role_id("systemAdmin").unwrap()]);
        Harness {
            manager,
            repo,
            idp,
            drift,
            system_admin,
        }
    }

    fn input(user_name: &str, roles: &[AllowedRole]) -> CreateUserInput {
        CreateUserInput {
            user_name: user_name.to_string(),
            first_name: "Alice".to_string(),
            last_name: "A".to_string(),
            email: format!("{}@x.com", user_name.to_lowercase()),
            roles: roles.to_vec(),
        }
    }

    impl Harness {
        async fn create(&self, user_name: &str, roles: &[AllowedRole]) -> CallerIdentity {
            let id = self.manager.create_user(None, input(user_name, roles)).await.unwrap();
            let record = self.repo.find_by_id(id).await.unwrap().unwrap();
            CallerIdentity::new(id, record.roles)
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trip() {
        let h = harness().await;
        let id = h
            .manager
            .create_user(None, input("Alice", &[AllowedRole::User]))
            .await
            .unwrap();

        let view = h.manager.get_user(None, Some(id)).await.unwrap();
        assert_eq!(view.user_name, "alice");
        assert_eq!(view.roles, vec![h.idp.role_id("user").unwrap()]);

        let record = h.repo.find_by_id(id).await.unwrap().unwrap();
        let account = h.idp.account(record.idp_uid.unwrap()).unwrap();
        assert_eq!(account.roles, vec!["user".to_string()]);
    }

    #[tokio::test]
    async fn invalid_names_are_reported_together() {
        let h = harness().await;
        let mut bad = input("9lives", &[]);
        bad.first_name = "".to_string();

        let err = h.manager.create_user(None, bad).await.unwrap_err();
        assert_eq!(
            err,
            ManagerError::Validation("Invalid user name, Invalid first name".to_string())
        );
    }

    #[tokio::test]
    async fn duplicate_user_name_is_rejected_case_insensitively() {
        let h = harness().await;
        h.create("alice", &[]).await;

        let mut dup = input("ALICE", &[]);
        dup.email = "other@x.com".to_string();
        let err = h.manager.create_user(None, dup).await.unwrap_err();
        assert_eq!(err, ManagerError::Validation("Username 'alice' already exists".to_string()));
    }

    #[tokio::test]
    async fn roles_missing_from_realm_are_invalid() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let idp = Arc::new(InMemoryIdentityProvider::new());
        idp.add_realm_role(RealmRole {
            id: RoleId::new("only-user"),
            name: "user".to_string(),
            description: None,
        });
        let manager = UserManager::new(repo, idp.clone(), "sysadmin");

        let err = manager
            .create_user(None, input("alice", &[AllowedRole::Admin]))
            .await
            .unwrap_err();
        assert_eq!(err, ManagerError::Validation("Invalid roles provided".to_string()));
        assert_eq!(idp.account_count(), 0);
    }

    #[tokio::test]
    async fn failed_insert_deletes_provider_account() {
        let h = harness().await;
        let accounts = h.idp.account_count();
        h.repo.fail_next_insert();

        let err = h.manager.create_user(None, input("alice", &[])).await.unwrap_err();

        assert!(matches!(err, ManagerError::Repository(_)));
        assert_eq!(h.idp.account_count(), accounts);
        assert!(h.drift.events().is_empty());
    }

    #[tokio::test]
    async fn failed_rollback_is_reported_as_drift() {
        let h = harness().await;
        h.repo.fail_next_insert();
        h.idp.fail_delete(true);

        assert!(h.manager.create_user(None, input("alice", &[])).await.is_err());

        let events = h.drift.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], DriftEvent::OrphanedAccount { user_name, .. } if user_name == "alice"));
    }

    #[tokio::test]
    async fn system_admin_cannot_be_updated() {
        let h = harness().await;
        let alice = h.create("alice", &[AllowedRole::User]).await;

        let err = h
            .manager
            .update_user(
                &alice,
                UpdateUserInput {
                    user_id: Some(h.system_admin.id),
                    first_name: Some("X".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, ManagerError::Forbidden("System admin user cannot be updated"));
    }

    #[tokio::test]
    async fn self_update_pushes_to_provider() {
        let h = harness().await;
        let alice = h.create("alice", &[AllowedRole::User]).await;

        let outcome = h
            .manager
            .update_user(
                &alice,
                UpdateUserInput {
                    first_name: Some("Alicia".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.message(), "User updated successfully. A new login token will be needed.");

        let record = h.repo.find_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(record.first_name, "Alicia");
        assert_eq!(h.idp.account(record.idp_uid.unwrap()).unwrap().first_name, "Alicia");
    }

    #[tokio::test]
    async fn plain_user_cannot_change_roles_or_other_users() {
        let h = harness().await;
        let alice = h.create("alice", &[AllowedRole::User]).await;
        let bob = h.create("bob", &[AllowedRole::User]).await;

        let err = h
            .manager
            .update_user(
                &alice,
                UpdateUserInput {
                    roles: Some(vec![AllowedRole::Admin]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, ManagerError::Forbidden("Unauthorized to update roles"));

        let err = h
            .manager
            .update_user(
                &alice,
                UpdateUserInput {
                    user_id: Some(bob.id),
                    last_name: Some("B".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, ManagerError::Forbidden("Unauthorized to update user"));
    }

    #[tokio::test]
    async fn admin_can_change_roles() {
        let h = harness().await;
        let admin = h.create("boss", &[AllowedRole::Admin]).await;
        let alice = h.create("alice", &[AllowedRole::User]).await;

        h.manager
            .update_user(
                &admin,
                UpdateUserInput {
                    user_id: Some(alice.id),
                    roles: Some(vec![AllowedRole::Admin, AllowedRole::User]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let record = h.repo.find_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(
            record.roles,
            vec![h.idp.role_id("admin").unwrap(), h.idp.role_id("user").unwrap()]
        );
        let mut provider_roles = h.idp.account(record.idp_uid.unwrap()).unwrap().roles;
        provider_roles.sort();
        assert_eq!(provider_roles, vec!["admin".to_string(), "user".to_string()]);
    }

    #[tokio::test]
    async fn user_name_change_checks_uniqueness_excluding_self() {
        let h = harness().await;
        let alice = h.create("alice", &[]).await;
        h.create("bob", &[]).await;

        let same = UpdateUserInput {
            user_name: Some("ALICE".to_string()),
            ..Default::default()
        };
        assert!(h.manager.update_user(&alice, same).await.is_ok());

        let taken = UpdateUserInput {
            user_name: Some("bob".to_string()),
            ..Default::default()
        };
        assert_eq!(
            h.manager.update_user(&alice, taken).await.unwrap_err(),
            ManagerError::Validation("Username 'bob' already exists".to_string())
        );
    }

    #[tokio::test]
    async fn provider_update_failure_keeps_local_write_and_reports_drift() {
        let h = harness().await;
        let alice = h.create("alice", &[]).await;
        h.idp.fail_update(true);

        let err = h
            .manager
            .update_user(
                &alice,
                UpdateUserInput {
                    last_name: Some("Changed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ManagerError::Idp(_)));
        assert_eq!(h.repo.find_by_id(alice.id).await.unwrap().unwrap().last_name, "Changed");
        assert!(matches!(
            h.drift.events().as_slice(),
            [DriftEvent::UpdateNotPropagated { user_id, .. }] if *user_id == alice.id
        ));
    }

    #[tokio::test]
    async fn provider_delete_failure_keeps_local_record() {
        let h = harness().await;
        let alice = h.create("alice", &[]).await;
        h.idp.fail_delete(true);

        let err = h.manager.delete_user(None, alice.id).await.unwrap_err();

        assert!(matches!(err, ManagerError::Idp(_)));
        assert!(h.manager.get_user(None, Some(alice.id)).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_account_and_record() {
        let h = harness().await;
        let alice = h.create("alice", &[]).await;
        let accounts = h.idp.account_count();

        h.manager.delete_user(Some(&alice), alice.id).await.unwrap();

        assert_eq!(h.idp.account_count(), accounts - 1);
        assert_eq!(h.manager.get_user(None, Some(alice.id)).await.unwrap_err(), ManagerError::NotFound);
    }

    #[tokio::test]
    async fn system_admin_cannot_be_deleted() {
        let h = harness().await;
        let err = h
            .manager
            .delete_user(Some(&h.system_admin), h.system_admin.id)
            .await
            .unwrap_err();
        assert_eq!(err, ManagerError::Forbidden("System admin user cannot be deleted"));
    }

    #[tokio::test]
    async fn get_defaults_to_caller_and_guards_other_records() {
        let h = harness().await;
        let alice = h.create("alice", &[AllowedRole::User]).await;
        let bob = h.create("bob", &[AllowedRole::User]).await;
        let admin = h.create("boss", &[AllowedRole::Admin]).await;

        assert_eq!(h.manager.get_user(Some(&alice), None).await.unwrap().id, alice.id);
        assert_eq!(
            h.manager.get_user(Some(&alice), Some(bob.id)).await.unwrap_err(),
            ManagerError::Forbidden("Unauthorized access to user data")
        );
        assert_eq!(h.manager.get_user(Some(&admin), Some(bob.id)).await.unwrap().id, bob.id);
        assert_eq!(h.manager.get_user(None, None).await.unwrap_err(), ManagerError::Unauthenticated);
    }

    #[tokio::test]
    async fn system_admin_role_is_hidden_from_other_callers() {
        let h = harness().await;
        let admin = h.create("boss", &[AllowedRole::Admin]).await;
        let sys_role = h.idp.role_id("systemAdmin").unwrap();

        let seen_by_admin = h.manager.get_user(Some(&admin), Some(h.system_admin.id)).await.unwrap();
        assert!(!seen_by_admin.roles.contains(&sys_role));

        let seen_by_self = h.manager.get_user(Some(&h.system_admin), None).await.unwrap();
        assert!(seen_by_self.roles.contains(&sys_role));

        let roles = h.manager.get_roles(Some(&admin)).await.unwrap();
        assert!(roles.iter().all(|r| r.name != "systemAdmin"));
        assert!(roles.iter().any(|r| r.name == "admin"));
        let roles = h.manager.get_roles(None).await.unwrap();
        assert!(roles.iter().all(|r| r.name != "systemAdmin"));
        let roles = h.manager.get_roles(Some(&h.system_admin)).await.unwrap();
        assert!(roles.iter().any(|r| r.name == "systemAdmin"));
    }

    #[tokio::test]
    async fn lookup_by_provider_uid_keeps_all_roles() {
        let h = harness().await;
        let record = h.repo.find_by_id(h.system_admin.id).await.unwrap().unwrap();

        let view = h.manager.get_user_by_idp_uid(None, record.idp_uid.unwrap()).await.unwrap();
        assert_eq!(view.id, h.system_admin.id);
        assert_eq!(view.roles, record.roles);
        assert!(serde_json::to_value(&view).unwrap().get("idp_uid").is_none());
    }

    #[tokio::test]
    async fn lookup_by_provider_uid_guards_other_records() {
        let h = harness().await;
        let alice = h.create("alice", &[AllowedRole::User]).await;
        let bob = h.create("bob", &[AllowedRole::User]).await;
        let admin = h.create("boss", &[AllowedRole::Admin]).await;
        let uid_of = |id: UserId| {
            let repo = h.repo.clone();
            async move { repo.find_by_id(id).await.unwrap().unwrap().idp_uid.unwrap() }
        };
        let sys_uid = uid_of(h.system_admin.id).await;
        let bob_uid = uid_of(bob.id).await;
        let alice_uid = uid_of(alice.id).await;
        let sys_role = h.idp.role_id("systemAdmin").unwrap();

        for uid in [sys_uid, bob_uid] {
            assert_eq!(
                h.manager.get_user_by_idp_uid(Some(&alice), uid).await.unwrap_err(),
                ManagerError::Forbidden("Unauthorized access to user data")
            );
        }
        assert_eq!(
            h.manager.get_user_by_idp_uid(Some(&alice), alice_uid).await.unwrap().id,
            alice.id
        );

        let seen_by_admin = h.manager.get_user_by_idp_uid(Some(&admin), sys_uid).await.unwrap();
        assert!(!seen_by_admin.roles.contains(&sys_role));
        let seen_by_self = h
            .manager
            .get_user_by_idp_uid(Some(&h.system_admin), sys_uid)
            .await
            .unwrap();
        assert!(seen_by_self.roles.contains(&sys_role));
    }

    #[tokio::test]
    async fn privileged_checks_reuse_cached_role_ids() {
        let h = harness().await;
        let admin = h.create("boss", &[AllowedRole::Admin]).await;
        let before = h.idp.role_fetches();

        for _ in 0..3 {
            assert!(h.manager.gate().is_privileged(&admin.roles).await);
        }
        assert_eq!(h.idp.role_fetches(), before);
    }

    #[tokio::test]
    async fn plain_caller_cannot_create_users_with_roles() {
        let h = harness().await;
        let alice = h.create("alice", &[AllowedRole::User]).await;

        let err = h
            .manager
            .create_user(Some(&alice), input("mallory", &[AllowedRole::Admin]))
            .await
            .unwrap_err();
        assert_eq!(err, ManagerError::Forbidden("Unauthorized to assign roles"));
    }

    proptest! {
        #[test]
        fn role_names_cover_every_request_once(
            roles in proptest::collection::vec(prop_oneof![Just(AllowedRole::User), Just(AllowedRole::Admin)], 0..8)
        ) {
            let names = role_names(&roles);
            for role in &roles {
                prop_assert_eq!(names.iter().filter(|n| **n == role.as_str()).count(), 1);
            }
            prop_assert!(names.len() <= 2);
            prop_assert_eq!(names.first().copied(), roles.first().map(|r| r.as_str()));
        }
    }
}
