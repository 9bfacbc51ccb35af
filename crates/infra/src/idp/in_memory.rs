//! In-memory identity provider for tests and local development.
//!
//! Accounts, tokens and realm roles live in process memory. Individual admin
//! operations can be switched to fail, to exercise consistency paths.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use warden_auth::RealmRole;
use warden_auth::roles::REALM_ROLE_NAMES;
use warden_core::{IdpUid, RoleId};

use super::{AccountUpdate, IdentityProvider, IdpError, NewAccount, TokenSet, UserInfo};

const ACCESS_TOKEN_TTL_SECS: i64 = 300;
const REFRESH_TOKEN_TTL_SECS: i64 = 1800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAccount {
    pub uid: IdpUid,
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub roles: Vec<String>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<IdpUid, StoredAccount>,
    access_tokens: HashMap<String, IdpUid>,
    refresh_tokens: HashMap<String, IdpUid>,
    roles: Vec<RealmRole>,
}

#[derive(Default)]
pub struct InMemoryIdentityProvider {
    state: RwLock<State>,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    fail_roles: AtomicBool,
    role_fetches: AtomicUsize,
}

fn invalid_grant(description: &str) -> IdpError {
    IdpError::Status {
        status: 401,
        body: json!({ "error": "invalid_grant", "error_description": description }).to_string(),
    }
}

fn injected(operation: &str) -> IdpError {
    IdpError::Status {
        status: 500,
        body: format!("injected {operation} failure"),
    }
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider pre-seeded with the `user`, `admin` and `systemAdmin` realm roles.
    pub fn with_standard_roles() -> Self {
        let idp = Self::new();
        {
            let mut state = idp.write();
            state.roles = REALM_ROLE_NAMES
                .iter()
                .map(|name| RealmRole {
                    id: RoleId::new(format!("role-{name}")),
                    name: name.to_string(),
                    description: None,
                })
                .collect();
        }
        idp
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_roles(&self, fail: bool) {
        self.fail_roles.store(fail, Ordering::SeqCst);
    }

    /// Number of realm role listings served so far.
    pub fn role_fetches(&self) -> usize {
        self.role_fetches.load(Ordering::SeqCst)
    }

    pub fn account(&self, uid: IdpUid) -> Option<StoredAccount> {
        self.read().accounts.get(&uid).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.read().accounts.len()
    }

    pub fn role_id(&self, name: &str) -> Option<RoleId> {
        self.read()
            .roles
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id.clone())
    }

    pub fn add_realm_role(&self, role: RealmRole) {
        self.write().roles.push(role);
    }

    fn issue_tokens(state: &mut State, uid: IdpUid) -> TokenSet {
        let access_token = Uuid::new_v4().simple().to_string();
        let refresh_token = Uuid::new_v4().simple().to_string();
        state.access_tokens.insert(access_token.clone(), uid);
        state.refresh_tokens.insert(refresh_token.clone(), uid);
        TokenSet {
            access_token,
            expires_in: ACCESS_TOKEN_TTL_SECS,
            refresh_expires_in: REFRESH_TOKEN_TTL_SECS,
            refresh_token,
        }
    }

    fn check_roles(state: &State, names: &[String]) -> Result<(), IdpError> {
        match names.iter().find(|n| !state.roles.iter().any(|r| &r.name == *n)) {
            Some(unknown) => Err(IdpError::UnknownRole(unknown.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn login(&self, username: &str, password: &str) -> Result<TokenSet, IdpError> {
        let mut state = self.write();
        let uid = state
            .accounts
            .values()
            .find(|a| a.user_name.eq_ignore_ascii_case(username) && a.password == password)
            .map(|a| a.uid)
            .ok_or_else(|| invalid_grant("Invalid user credentials"))?;
        Ok(Self::issue_tokens(&mut state, uid))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IdpError> {
        let mut state = self.write();
        let uid = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| invalid_grant("Invalid refresh token"))?;
        if !state.accounts.contains_key(&uid) {
            return Err(invalid_grant("User not found"));
        }
        Ok(Self::issue_tokens(&mut state, uid))
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), IdpError> {
        let mut state = self.write();
        let uid = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| invalid_grant("Invalid refresh token"))?;
        state.access_tokens.retain(|_, owner| *owner != uid);
        Ok(())
    }

    async fn user_info(&self, access_token: &str) -> Result<UserInfo, IdpError> {
        let state = self.read();
        let uid = *state.access_tokens.get(access_token).ok_or_else(|| IdpError::Status {
            status: 401,
            body: json!({ "error": "invalid_token" }).to_string(),
        })?;
        let account = state.accounts.get(&uid).ok_or_else(|| IdpError::Status {
            status: 401,
            body: json!({ "error": "invalid_token" }).to_string(),
        })?;
        Ok(UserInfo {
            sub: uid,
            preferred_username: Some(account.user_name.clone()),
            email: Some(account.email.clone()),
        })
    }

    async fn realm_roles(&self) -> Result<Vec<RealmRole>, IdpError> {
        self.role_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(injected("realm_roles"));
        }
        Ok(self.read().roles.clone())
    }

    async fn create_user(&self, account: &NewAccount) -> Result<IdpUid, IdpError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("create_user"));
        }
        let mut state = self.write();
        Self::check_roles(&state, &account.roles)?;
        if state
            .accounts
            .values()
            .any(|a| a.user_name.eq_ignore_ascii_case(&account.user_name) || a.email == account.email)
        {
            return Err(IdpError::Status {
                status: 409,
                body: json!({ "errorMessage": "User exists with same username or email" }).to_string(),
            });
        }

        let uid = IdpUid::from_uuid(Uuid::new_v4());
        state.accounts.insert(
            uid,
            StoredAccount {
                uid,
                user_name: account.user_name.to_lowercase(),
                first_name: account.first_name.clone(),
                last_name: account.last_name.clone(),
                email: account.email.clone(),
                password: account.password.clone(),
                roles: account.roles.clone(),
            },
        );
        Ok(uid)
    }

    async fn update_user(&self, uid: IdpUid, update: &AccountUpdate) -> Result<(), IdpError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected("update_user"));
        }
        let mut state = self.write();
        if let Some(roles) = &update.roles {
            Self::check_roles(&state, roles)?;
        }
        let account = state.accounts.get_mut(&uid).ok_or_else(|| IdpError::Status {
            status: 404,
            body: json!({ "error": "User not found" }).to_string(),
        })?;
        account.user_name = update.user_name.to_lowercase();
        account.first_name = update.first_name.clone();
        account.last_name = update.last_name.clone();
        account.email = update.email.clone();
        if let Some(roles) = &update.roles {
            account.roles = roles.clone();
        }
        Ok(())
    }

    async fn delete_user(&self, uid: IdpUid) -> Result<(), IdpError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete_user"));
        }
        let mut state = self.write();
        if state.accounts.remove(&uid).is_none() {
            return Err(IdpError::Status {
                status: 404,
                body: json!({ "error": "User not found" }).to_string(),
            });
        }
        state.access_tokens.retain(|_, owner| *owner != uid);
        state.refresh_tokens.retain(|_, owner| *owner != uid);
        Ok(())
    }

    async fn ensure_realm_role(&self, name: &str) -> Result<(), IdpError> {
        let mut state = self.write();
        if !state.roles.iter().any(|r| r.name == name) {
            state.roles.push(RealmRole {
                id: RoleId::new(format!("role-{name}")),
                name: name.to_string(),
                description: None,
            });
        }
        Ok(())
    }
}
