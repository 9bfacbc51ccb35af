//! Keycloak implementation of [`IdentityProvider`] over `reqwest`.
//!
//! Token lifecycle calls use the configured realm client. Administrative calls
//! obtain a short-lived admin token from the master realm (`admin-cli`
//! password grant) per operation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use warden_auth::RealmRole;
use warden_auth::roles::REALM_ROLE_NAMES;
use warden_core::IdpUid;

use super::{AccountUpdate, IdentityProvider, IdpError, NewAccount, TokenSet, UserInfo};

/// Access token lifespan set on a freshly created realm (10 hours).
const REALM_ACCESS_TOKEN_LIFESPAN_SECS: u64 = 36_000;

#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    pub server_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub timeout: Duration,
}

impl KeycloakConfig {
    pub fn new(server_url: impl Into<String>, realm: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: None,
            admin_username: None,
            admin_password: None,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_admin(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin_username = Some(username.into());
        self.admin_password = Some(password.into());
        self
    }

    pub fn with_client_secret(mut self, secret: Option<String>) -> Self {
        self.client_secret = secret;
        self
    }
}

pub struct KeycloakClient {
    http: Client,
    config: KeycloakConfig,
}

fn network(e: reqwest::Error) -> IdpError {
    IdpError::Network(e.to_string())
}

/// Pass successful responses through; turn anything else into `IdpError::Status`.
async fn ensure_success(response: Response, operation: &str) -> Result<Response, IdpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!(operation, status = status.as_u16(), body = %body, "keycloak request failed");
    Err(IdpError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Success, or `409 Conflict` (already exists).
async fn ensure_created(response: Response, operation: &str) -> Result<(), IdpError> {
    if response.status() == reqwest::StatusCode::CONFLICT {
        info!(operation, "already exists");
        return Ok(());
    }
    ensure_success(response, operation).await.map(|_| ())
}

/// Last path segment of the `Location` header of a create response.
fn uid_from_location(response: &Response) -> Result<IdpUid, IdpError> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .and_then(|segment| segment.parse::<Uuid>().ok())
        .map(IdpUid::from_uuid)
        .ok_or(IdpError::MissingLocation)
}

impl KeycloakClient {
    pub fn new(config: KeycloakConfig) -> Result<Self, IdpError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(network)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    fn base(&self) -> &str {
        self.config.server_url.trim_end_matches('/')
    }

    fn oidc_url(&self, endpoint: &str) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/{}",
            self.base(),
            self.config.realm,
            endpoint
        )
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/admin/realms/{}{}", self.base(), self.config.realm, path)
    }

    async fn admin_token(&self) -> Result<String, IdpError> {
        let (Some(username), Some(password)) = (
            self.config.admin_username.as_deref(),
            self.config.admin_password.as_deref(),
        ) else {
            return Err(IdpError::AdminCredentialsMissing);
        };

        let url = format!("{}/realms/master/protocol/openid-connect/token", self.base());
        let form = [
            ("username", username),
            ("password", password),
            ("grant_type", "password"),
            ("client_id", "admin-cli"),
        ];
        let response = self.http.post(&url).form(&form).send().await.map_err(network)?;
        let tokens: TokenSet = ensure_success(response, "admin_token")
            .await?
            .json()
            .await
            .map_err(|e| IdpError::Decode(e.to_string()))?;
        Ok(tokens.access_token)
    }

    async fn token_grant(&self, grant: &[(&str, &str)], operation: &str) -> Result<TokenSet, IdpError> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(self.oidc_url("token"))
            .form(&form)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, operation)
            .await?
            .json()
            .await
            .map_err(|e| IdpError::Decode(e.to_string()))
    }

    async fn fetch_realm_roles(&self, token: &str) -> Result<Vec<RealmRole>, IdpError> {
        let response = self
            .http
            .get(self.admin_url("/roles"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, "realm_roles")
            .await?
            .json()
            .await
            .map_err(|e| IdpError::Decode(e.to_string()))
    }

    /// Resolve role names to full representations (role mapping needs ids).
    async fn resolve_roles(&self, token: &str, names: &[String]) -> Result<Vec<RealmRole>, IdpError> {
        if names.is_empty() {
            return Ok(vec![]);
        }
        let realm_roles = self.fetch_realm_roles(token).await?;
        names
            .iter()
            .map(|name| {
                realm_roles
                    .iter()
                    .find(|r| &r.name == name)
                    .cloned()
                    .ok_or_else(|| IdpError::UnknownRole(name.clone()))
            })
            .collect()
    }

    async fn map_roles(
        &self,
        token: &str,
        uid: IdpUid,
        roles: &[RealmRole],
        remove: bool,
    ) -> Result<(), IdpError> {
        if roles.is_empty() {
            return Ok(());
        }
        let url = self.admin_url(&format!("/users/{uid}/role-mappings/realm"));
        let request = if remove {
            self.http.delete(&url)
        } else {
            self.http.post(&url)
        };
        let response = request
            .bearer_auth(token)
            .json(roles)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, "role_mapping").await.map(|_| ())
    }

    /// Bring the user's managed realm roles in line with `wanted`.
    async fn sync_roles(&self, token: &str, uid: IdpUid, wanted: &[String]) -> Result<(), IdpError> {
        let response = self
            .http
            .get(self.admin_url(&format!("/users/{uid}/role-mappings/realm")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;
        let current: Vec<RealmRole> = ensure_success(response, "role_mapping")
            .await?
            .json()
            .await
            .map_err(|e| IdpError::Decode(e.to_string()))?;

        let to_remove: Vec<RealmRole> = current
            .iter()
            .filter(|r| REALM_ROLE_NAMES.contains(&r.name.as_str()) && !wanted.contains(&r.name))
            .cloned()
            .collect();
        let missing: Vec<String> = wanted
            .iter()
            .filter(|name| !current.iter().any(|r| &r.name == *name))
            .cloned()
            .collect();
        let to_add = self.resolve_roles(token, &missing).await?;

        self.map_roles(token, uid, &to_remove, true).await?;
        self.map_roles(token, uid, &to_add, false).await
    }

    /// Poll the server root until it answers 200.
    pub async fn wait_until_ready(&self, attempts: u32, delay: Duration) -> Result<(), IdpError> {
        let mut last_error = String::from("no attempt made");
        for attempt in 1..=attempts {
            match self.http.get(self.base()).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(attempt, "connected to keycloak");
                    return Ok(());
                }
                Ok(response) => last_error = format!("status {}", response.status()),
                Err(e) => last_error = e.to_string(),
            }
            warn!(attempt, attempts, error = %last_error, "keycloak not ready, retrying");
            tokio::time::sleep(delay).await;
        }
        Err(IdpError::NotReady(last_error))
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn login(&self, username: &str, password: &str) -> Result<TokenSet, IdpError> {
        let form = [
            ("grant_type", "password"),
            ("scope", "openid"),
            ("username", username),
            ("password", password),
        ];
        self.token_grant(&form, "login").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IdpError> {
        let form = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
        self.token_grant(&form, "refresh").await
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), IdpError> {
        let mut form = vec![
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let response = self
            .http
            .post(self.oidc_url("logout"))
            .form(&form)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, "logout").await.map(|_| ())
    }

    async fn user_info(&self, access_token: &str) -> Result<UserInfo, IdpError> {
        let response = self
            .http
            .get(self.oidc_url("userinfo"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, "user_info")
            .await?
            .json()
            .await
            .map_err(|e| IdpError::Decode(e.to_string()))
    }

    async fn realm_roles(&self) -> Result<Vec<RealmRole>, IdpError> {
        let token = self.admin_token().await?;
        self.fetch_realm_roles(&token).await
    }

    async fn create_user(&self, account: &NewAccount) -> Result<IdpUid, IdpError> {
        let token = self.admin_token().await?;
        // Resolve first so an unknown role never leaves an account behind.
        let roles = self.resolve_roles(&token, &account.roles).await?;

        let body = json!({
            "username": account.user_name,
            "firstName": account.first_name,
            "lastName": account.last_name,
            "email": account.email,
            "enabled": true,
            "emailVerified": true,
            "credentials": [{
                "type": "password",
                "value": account.password,
                "temporary": false,
            }],
        });
        let response = self
            .http
            .post(self.admin_url("/users"))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        let response = ensure_success(response, "create_user").await?;
        let uid = uid_from_location(&response)?;
        debug!(idp_uid = %uid, user_name = %account.user_name, "keycloak account created");

        if let Err(e) = self.map_roles(&token, uid, &roles, false).await {
            warn!(idp_uid = %uid, error = %e, "role assignment failed, removing account");
            if let Err(cleanup) = self.delete_user(uid).await {
                error!(idp_uid = %uid, error = %cleanup, "failed to remove partially created account");
            }
            return Err(e);
        }
        Ok(uid)
    }

    async fn update_user(&self, uid: IdpUid, update: &AccountUpdate) -> Result<(), IdpError> {
        let token = self.admin_token().await?;
        let body = json!({
            "username": update.user_name,
            "firstName": update.first_name,
            "lastName": update.last_name,
            "email": update.email,
        });
        let response = self
            .http
            .put(self.admin_url(&format!("/users/{uid}")))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, "update_user").await?;

        if let Some(roles) = &update.roles {
            self.sync_roles(&token, uid, roles).await?;
        }
        Ok(())
    }

    async fn delete_user(&self, uid: IdpUid) -> Result<(), IdpError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .delete(self.admin_url(&format!("/users/{uid}")))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, "delete_user").await.map(|_| ())
    }

    async fn ensure_realm_role(&self, name: &str) -> Result<(), IdpError> {
        let token = self.admin_token().await?;
        let response = self
            .http
            .post(self.admin_url("/roles"))
            .bearer_auth(&token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(network)?;
        ensure_created(response, "ensure_realm_role").await
    }

    async fn initialize_realm(&self) -> Result<(), IdpError> {
        let token = self.admin_token().await?;

        let realm = json!({
            "realm": self.config.realm,
            "enabled": true,
            "accessTokenLifespan": REALM_ACCESS_TOKEN_LIFESPAN_SECS,
        });
        let response = self
            .http
            .post(format!("{}/admin/realms", self.base()))
            .bearer_auth(&token)
            .json(&realm)
            .send()
            .await
            .map_err(network)?;
        ensure_created(response, "create_realm").await?;

        let client = json!({
            "clientId": self.config.client_id,
            "name": self.config.client_id,
            "enabled": true,
            "publicClient": self.config.client_secret.is_none(),
            "protocol": "openid-connect",
            "redirectUris": ["*"],
            "webOrigins": ["*"],
            "directAccessGrantsEnabled": true,
            "serviceAccountsEnabled": false,
            "standardFlowEnabled": true,
            "implicitFlowEnabled": false,
        });
        let response = self
            .http
            .post(self.admin_url("/clients"))
            .bearer_auth(&token)
            .json(&client)
            .send()
            .await
            .map_err(network)?;
        ensure_created(response, "create_client").await?;

        let settings = json!({
            "realm": self.config.realm,
            "editUsernameAllowed": true,
        });
        let response = self
            .http
            .put(self.admin_url(""))
            .bearer_auth(&token)
            .json(&settings)
            .send()
            .await
            .map_err(network)?;
        ensure_success(response, "enable_edit_username").await?;

        info!(realm = %self.config.realm, client_id = %self.config.client_id, "keycloak realm initialized");
        Ok(())
    }
}
