//! Identity administration service: user records kept consistent with the
//! identity provider's accounts.

pub mod app;
pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod identity;
pub mod manager;
pub mod reconcile;
