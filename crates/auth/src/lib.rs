//! `warden-auth` — caller identity and authorization decisions.
//!
//! This crate is decoupled from HTTP and storage. Lookups it needs (realm
//! roles, the system admin account) go through the traits declared here and
//! are implemented by the services.

pub mod authorize;
pub mod principal;
pub mod role_cache;
pub mod roles;
pub mod system_admin;

pub use authorize::{AuthorizationGate, AuthzError, Decision, DenyReason, TargetRefs};
pub use principal::{CallerIdentity, IdentityHeaderError, IdentityHeaderMode};
pub use role_cache::{PrivilegedRoleIds, RealmRoleSource, RoleCache, RoleCacheError};
pub use roles::{AllowedRole, PrivilegedRole, RealmRole};
pub use system_admin::{SystemAdminError, SystemAdminResolver, SystemAdminSource};
