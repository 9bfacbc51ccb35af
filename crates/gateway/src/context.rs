use serde_json::Value;

use warden_auth::CallerIdentity;
use warden_core::UserId;

/// Authenticated caller for a request: the `{id, roles}` pair plus the raw
/// user record returned by the identity administration service.
///
/// Inserted by the auth middleware; must be present on every forwarded route.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerContext {
    identity: CallerIdentity,
    profile: Value,
}

impl CallerContext {
    pub fn new(identity: CallerIdentity, profile: Value) -> Self {
        Self { identity, profile }
    }

    /// Decode the identity from a user record; extra fields are kept in the profile.
    pub fn from_profile(profile: Value) -> Result<Self, serde_json::Error> {
        let identity: CallerIdentity = serde_json::from_value(profile.clone())?;
        Ok(Self { identity, profile })
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    pub fn user_id(&self) -> UserId {
        self.identity.id
    }

    pub fn profile(&self) -> &Value {
        &self.profile
    }
}

/// Correlation id for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
