//! Caller identity as forwarded by the gateway.
//!
//! Either `X-User` (JSON user record) or `X-User-Id` + `X-Roles` is accepted.
//! Requests without either header are internal calls with no caller.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

use warden_auth::principal::{ROLES_HEADER, USER_HEADER, USER_ID_HEADER};
use warden_auth::{CallerIdentity, IdentityHeaderError};

use crate::app::errors::failure;

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, IdentityHeaderError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|e| IdentityHeaderError::Malformed(e.to_string()))
        })
        .transpose()
}

pub fn caller_from_headers(headers: &HeaderMap) -> Result<Option<CallerIdentity>, IdentityHeaderError> {
    if let Some(user) = header_text(headers, USER_HEADER)? {
        return CallerIdentity::from_user_header(user).map(Some);
    }
    match (header_text(headers, USER_ID_HEADER)?, header_text(headers, ROLES_HEADER)?) {
        (Some(id), roles) => CallerIdentity::from_role_headers(id, roles).map(Some),
        (None, Some(_)) => Err(IdentityHeaderError::Missing),
        (None, None) => Ok(None),
    }
}

fn invalid_identity(err: IdentityHeaderError) -> Response {
    tracing::warn!(error = %err, "rejecting request with invalid identity headers");
    failure(StatusCode::UNAUTHORIZED, "Invalid identity header")
}

/// Caller identity when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalCaller(pub Option<CallerIdentity>);

/// Caller identity, required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub CallerIdentity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for OptionalCaller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers)
            .map(OptionalCaller)
            .map_err(invalid_identity)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match caller_from_headers(&parts.headers) {
            Ok(Some(caller)) => Ok(Caller(caller)),
            Ok(None) => Err(failure(StatusCode::UNAUTHORIZED, "Unauthorized")),
            Err(e) => Err(invalid_identity(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;
    use warden_core::{RoleId, UserId};

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn x_user_takes_precedence() {
        let id = Uuid::now_v7();
        let h = headers(&[
            (USER_HEADER, format!(r#"{{"id":"{id}","roles":["r-admin"],"user_name":"a"}}"#)),
            (USER_ID_HEADER, Uuid::now_v7().to_string()),
        ]);
        let caller = caller_from_headers(&h).unwrap().unwrap();
        assert_eq!(caller.id, UserId::from_uuid(id));
        assert_eq!(caller.roles, vec![RoleId::new("r-admin")]);
    }

    #[test]
    fn role_headers_are_accepted() {
        let id = Uuid::now_v7();
        let h = headers(&[
            (USER_ID_HEADER, id.to_string()),
            (ROLES_HEADER, "r-user, r-admin".to_string()),
        ]);
        let caller = caller_from_headers(&h).unwrap().unwrap();
        assert_eq!(caller.roles.len(), 2);
    }

    #[test]
    fn no_headers_means_no_caller() {
        assert_eq!(caller_from_headers(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn roles_without_user_id_or_garbage_are_errors() {
        let h = headers(&[(ROLES_HEADER, "r-user".to_string())]);
        assert_eq!(caller_from_headers(&h), Err(IdentityHeaderError::Missing));

        let h = headers(&[(USER_HEADER, "not json".to_string())]);
        assert!(matches!(caller_from_headers(&h), Err(IdentityHeaderError::Malformed(_))));
    }
}
