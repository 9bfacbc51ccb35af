//! Infrastructure layer: identity provider clients and user persistence.

pub mod idp;
pub mod users;

pub use idp::{
    AccountUpdate, IdentityProvider, IdpError, IdpRoleSource, InMemoryIdentityProvider, KeycloakClient,
    KeycloakConfig, NewAccount, TokenSet, UserInfo,
};
pub use users::{InMemoryUserRepository, PostgresUserRepository, RepositoryError, UserRepository};
