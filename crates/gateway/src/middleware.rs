use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use warden_infra::IdentityProvider;

use crate::app::errors::json_error;
use crate::context::{CallerContext, RequestId};
use crate::upstream::UserDirectoryClient;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AuthState {
    pub idp: Arc<dyn IdentityProvider>,
    pub directory: Arc<UserDirectoryClient>,
}

fn unauthorized() -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized")
}

/// Resolve the bearer token to a local user record and attach it as
/// [`CallerContext`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(|_| unauthorized())?;

    let info = state.idp.user_info(token).await.map_err(|e| {
        tracing::info!(error = %e, "bearer token rejected by identity provider");
        unauthorized()
    })?;

    let profile = state
        .directory
        .get_by_idp_uid(info.sub)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, idp_uid = %info.sub, "user lookup failed");
            json_error(StatusCode::BAD_GATEWAY, "upstream_error", "User service unavailable")
        })?
        .ok_or_else(|| {
            tracing::info!(idp_uid = %info.sub, "authenticated account has no local record");
            unauthorized()
        })?;

    let caller = CallerContext::from_profile(profile).map_err(|e| {
        tracing::error!(error = %e, "user record is missing identity fields");
        unauthorized()
    })?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

/// Attach a [`RequestId`] (inbound `x-request-id` or a fresh one) and echo it back.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn headers(value: &'static str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_static(value));
        h
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc ")), Ok("abc"));
    }

    #[test]
    fn missing_or_malformed_authorization_is_unauthorized() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_bearer(&headers("Basic abc")), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_bearer(&headers("Bearer   ")), Err(StatusCode::UNAUTHORIZED));
    }
}
