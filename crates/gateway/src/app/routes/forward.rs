use axum::{
    Extension, Json,
    extract::{Path, RawQuery, Request},
    http::Method,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::app::GatewayServices;
use crate::app::errors::forward_error_to_response;
use crate::body::{BodyError, ParsedBody};
use crate::context::{CallerContext, RequestId};
use crate::forwarder::{ForwardError, ForwardRequest, Stage, log_stage};

#[derive(Debug, Deserialize)]
pub struct ForwardPath {
    service: String,
    action: String,
    #[serde(default)]
    path: Option<String>,
}

fn parse_query(raw: Option<&str>) -> Result<Vec<(String, String)>, BodyError> {
    match raw {
        Some(q) if !q.is_empty() => {
            serde_urlencoded::from_str(q).map_err(|e| BodyError::Malformed(e.to_string()))
        }
        _ => Ok(Vec::new()),
    }
}

/// `/api/{service}/{action}[/{path...}]` for any method.
pub async fn forward(
    Extension(services): Extension<GatewayServices>,
    Extension(request_id): Extension<RequestId>,
    caller: Option<Extension<CallerContext>>,
    Path(target): Path<ForwardPath>,
    method: Method,
    RawQuery(raw_query): RawQuery,
    req: Request,
) -> Response {
    log_stage(&request_id, Stage::Received);

    let parsed = match parse_query(raw_query.as_deref()) {
        Ok(query) => ParsedBody::from_request(req).await.map(|body| (query, body)),
        Err(e) => Err(e),
    };
    let (query, body) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            log_stage(&request_id, Stage::Rejected);
            return forward_error_to_response(ForwardError::from(e));
        }
    };
    log_stage(&request_id, Stage::Parsed);

    let request = ForwardRequest {
        request_id,
        method,
        service: target.service,
        action: target.action,
        extra_path: target.path,
        query,
        body,
    };
    let caller = caller.map(|Extension(c)| c);

    match services.forwarder.forward(caller.as_ref(), request).await {
        Ok(reply) => (reply.status, Json(reply.data)).into_response(),
        Err(err) => forward_error_to_response(err),
    }
}
