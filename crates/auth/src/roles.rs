use serde::{Deserialize, Serialize};

use warden_core::RoleId;

/// Roles a client may request when creating or updating a user.
///
/// Anything else is rejected at deserialization, so handlers only ever see
/// normalized role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowedRole {
    User,
    Admin,
}

impl AllowedRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Realm roles that grant elevated privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegedRole {
    Admin,
    SystemAdmin,
}

impl PrivilegedRole {
    pub const ALL: [PrivilegedRole; 2] = [PrivilegedRole::Admin, PrivilegedRole::SystemAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SystemAdmin => "systemAdmin",
        }
    }
}

impl core::fmt::Display for PrivilegedRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Realm roles the identity administration service provisions at startup.
pub const REALM_ROLE_NAMES: [&str; 3] = ["user", "admin", "systemAdmin"];

/// A realm role as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmRole {
    pub id: RoleId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RealmRole {
    /// `false` for the provider's built-in roles.
    pub fn is_custom(&self) -> bool {
        let builtin_name = self.name.starts_with("default-roles-")
            || self.name == "offline_access"
            || self.name == "uma_authorization";
        let builtin_description = self
            .description
            .as_deref()
            .is_some_and(|d| d.starts_with("${role_"));
        !(builtin_name || builtin_description)
    }

    pub fn is_system_admin(&self) -> bool {
        self.name == PrivilegedRole::SystemAdmin.as_str()
    }
}
