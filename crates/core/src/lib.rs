//! `warden-core` — shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no HTTP, no storage).

pub mod error;
pub mod id;
pub mod user;
pub mod validation;

pub use error::{DomainError, DomainResult};
pub use id::{IdpUid, RoleId, UserId};
pub use user::{NewUser, UserPatch, UserRecord};
pub use validation::{normalize_user_name, validate_email, validate_names};
