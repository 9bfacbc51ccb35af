//! Token endpoints. Login and refresh return the provider's token set
//! enriched with the caller's local user record.

use axum::{
    Extension, Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use warden_infra::TokenSet;

use crate::app::GatewayServices;
use crate::app::dto::{LoginRequest, MessageResponse, RefreshRequest, SessionResponse};
use crate::app::errors::{idp_error_to_response, json_error};

fn bad_request(rejection: JsonRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

async fn enrich(services: &GatewayServices, tokens: TokenSet) -> Response {
    let info = match services.idp.user_info(&tokens.access_token).await {
        Ok(info) => info,
        Err(e) => return idp_error_to_response(e),
    };

    match services.directory.get_by_idp_uid(info.sub).await {
        Ok(Some(user)) => Json(SessionResponse { tokens, user }).into_response(),
        Ok(None) => {
            tracing::info!(idp_uid = %info.sub, "login for account without a local record");
            json_error(StatusCode::NOT_FOUND, "not_found", "User not found")
        }
        Err(e) => {
            tracing::error!(error = %e, "user lookup failed");
            json_error(StatusCode::BAD_GATEWAY, "upstream_error", "User service unavailable")
        }
    }
}

pub async fn login(
    Extension(services): Extension<GatewayServices>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection),
    };

    match services.idp.login(&req.username, &req.password).await {
        Ok(tokens) => enrich(&services, tokens).await,
        Err(e) => idp_error_to_response(e),
    }
}

pub async fn refresh(
    Extension(services): Extension<GatewayServices>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection),
    };

    match services.idp.refresh(&req.refresh_token).await {
        Ok(tokens) => enrich(&services, tokens).await,
        Err(e) => idp_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<GatewayServices>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection),
    };

    match services.idp.logout(&req.refresh_token).await {
        Ok(()) => Json(MessageResponse { message: "Logged out" }).into_response(),
        Err(e) => idp_error_to_response(e),
    }
}
