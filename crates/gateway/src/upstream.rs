//! Client for the identity administration service's lookup endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use warden_auth::{SystemAdminError, SystemAdminSource};
use warden_core::{IdpUid, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user service unreachable: {0}")]
    Network(String),

    #[error("user service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected user service response: {0}")]
    Decode(String),
}

/// Reads user records from the `user` service.
#[derive(Debug, Clone)]
pub struct UserDirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl UserDirectoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> Result<Option<Value>, DirectoryError> {
        let response = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .send()
            .await
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }

    /// Local user record (without the provider uid) for a provider account.
    /// `Ok(None)` when the account has no local record.
    pub async fn get_by_idp_uid(&self, uid: IdpUid) -> Result<Option<Value>, DirectoryError> {
        let Some(body) = self.get_json(&format!("get_by_keycloak_uid/{uid}")).await? else {
            return Ok(None);
        };
        match body.get("data") {
            Some(Value::Object(record)) => Ok(Some(Value::Object(record.clone()))),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(DirectoryError::Decode(format!("expected a user record, got {other}"))),
        }
    }

    pub async fn system_admin_id(&self) -> Result<Option<UserId>, DirectoryError> {
        let Some(body) = self.get_json("get_sys_id").await? else {
            return Ok(None);
        };
        let raw = match &body {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("data").and_then(Value::as_str).unwrap_or_default(),
            _ => "",
        };
        raw.parse::<UserId>()
            .map(Some)
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SystemAdminSource for UserDirectoryClient {
    async fn find_system_admin_id(&self) -> Result<Option<UserId>, SystemAdminError> {
        self.system_admin_id()
            .await
            .map_err(|e| SystemAdminError::Lookup(e.to_string()))
    }
}
