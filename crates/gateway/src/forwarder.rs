//! Request forwarding pipeline.
//!
//! A forwarded request moves through `RECEIVED → PARSED → AUTHENTICATED →
//! AUTHORIZED → DISPATCHED → RESPONDED`, or to `REJECTED` from any state.
//! Every transition is logged at debug level with the request id.
//!
//! Upstream replies are normalized into a `{status_code, data}` envelope and
//! unwrapped again before being returned: the response status is the
//! envelope's `status_code` (400 when absent or unusable) and the body is its
//! `data` (the whole envelope minus `status_code` when absent).

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::{Map, Value};
use thiserror::Error;

use warden_auth::{AuthorizationGate, IdentityHeaderMode, SystemAdminError};
use warden_auth::principal::{ROLES_HEADER, USER_HEADER, USER_ID_HEADER};

use crate::authz::authorize_forward;
use crate::body::{BodyError, ParsedBody};
use crate::context::{CallerContext, RequestId};
use crate::middleware::REQUEST_ID_HEADER;
use crate::routing::{Route, RoutingTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    Authenticated,
    Authorized,
    Dispatched,
    Responded,
    Rejected,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "RECEIVED",
            Stage::Parsed => "PARSED",
            Stage::Authenticated => "AUTHENTICATED",
            Stage::Authorized => "AUTHORIZED",
            Stage::Dispatched => "DISPATCHED",
            Stage::Responded => "RESPONDED",
            Stage::Rejected => "REJECTED",
        }
    }
}

pub fn log_stage(request_id: &RequestId, stage: Stage) {
    tracing::debug!(request_id = request_id.as_str(), stage = stage.as_str(), "forward");
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("Service not found")]
    ServiceNotFound,

    #[error("Access denied")]
    AccessDenied,

    #[error("Method not supported")]
    MethodNotSupported,

    #[error("Unauthorized")]
    Unauthenticated,

    #[error(transparent)]
    Body(#[from] BodyError),

    #[error(transparent)]
    SystemAdmin(#[from] SystemAdminError),

    /// Network failure or timeout talking to the upstream service.
    #[error("{0}")]
    Upstream(String),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::ServiceNotFound => StatusCode::NOT_FOUND,
            ForwardError::AccessDenied => StatusCode::FORBIDDEN,
            ForwardError::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            ForwardError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ForwardError::Body(_) => StatusCode::BAD_REQUEST,
            ForwardError::SystemAdmin(_) | ForwardError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A parsed inbound request addressed to `/api/{service}/{action}[/{extra_path}]`.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub request_id: RequestId,
    pub method: Method,
    pub service: String,
    pub action: String,
    pub extra_path: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: ParsedBody,
}

/// Unwrapped upstream reply.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub data: Value,
}

/// Wrap an upstream body into an envelope carrying `status_code`, then unwrap it.
pub fn unwrap_envelope(upstream_status: StatusCode, body: &[u8]) -> UpstreamReply {
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
    };

    let mut envelope = match parsed {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    envelope
        .entry("status_code")
        .or_insert_with(|| Value::from(upstream_status.as_u16()));

    let status = envelope
        .remove("status_code")
        .and_then(|v| v.as_u64())
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::BAD_REQUEST);

    let data = match envelope.remove("data") {
        Some(data) => data,
        None => Value::Object(envelope),
    };
    UpstreamReply { status, data }
}

fn is_forwardable(method: &Method) -> bool {
    [Method::GET, Method::POST, Method::PUT, Method::DELETE].contains(method)
}

fn multipart_form(body: ParsedBody) -> Result<reqwest::multipart::Form, ForwardError> {
    let mut form = reqwest::multipart::Form::new();
    let ParsedBody::Multipart { fields, files } = body else {
        return Ok(form);
    };
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in files {
        let mut part = reqwest::multipart::Part::bytes(file.bytes.to_vec());
        if let Some(file_name) = file.file_name {
            part = part.file_name(file_name);
        }
        if let Some(content_type) = file.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| ForwardError::Upstream(e.to_string()))?;
        }
        form = form.part(file.field, part);
    }
    Ok(form)
}

pub struct Forwarder {
    http: reqwest::Client,
    routing: RoutingTable,
    gate: AuthorizationGate,
    identity_mode: IdentityHeaderMode,
}

impl Forwarder {
    pub fn new(
        routing: RoutingTable,
        gate: AuthorizationGate,
        identity_mode: IdentityHeaderMode,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            routing,
            gate,
            identity_mode,
        })
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub async fn forward(
        &self,
        caller: Option<&CallerContext>,
        req: ForwardRequest,
    ) -> Result<UpstreamReply, ForwardError> {
        let request_id = req.request_id.clone();
        let result = self.run(caller, req).await;
        match &result {
            Ok(reply) => {
                log_stage(&request_id, Stage::Responded);
                tracing::debug!(request_id = request_id.as_str(), status = reply.status.as_u16(), "upstream replied");
            }
            Err(err) => {
                log_stage(&request_id, Stage::Rejected);
                tracing::debug!(request_id = request_id.as_str(), error = %err, "forward rejected");
            }
        }
        result
    }

    async fn run(&self, caller: Option<&CallerContext>, req: ForwardRequest) -> Result<UpstreamReply, ForwardError> {
        let caller = caller.ok_or(ForwardError::Unauthenticated)?;
        log_stage(&req.request_id, Stage::Authenticated);

        let url = match self
            .routing
            .resolve(&req.service, &req.action, req.extra_path.as_deref())
        {
            Route::Found(url) => url,
            Route::NotFound => {
                tracing::info!(service = %req.service, "no route for service");
                return Err(ForwardError::ServiceNotFound);
            }
        };

        let decision = authorize_forward(
            &self.gate,
            caller,
            &req.body,
            &req.query,
            req.extra_path.as_deref(),
        )
        .await?;
        if !decision.is_allowed() {
            return Err(ForwardError::AccessDenied);
        }
        log_stage(&req.request_id, Stage::Authorized);

        if !is_forwardable(&req.method) {
            return Err(ForwardError::MethodNotSupported);
        }

        let mut builder = self
            .http
            .request(req.method.clone(), &url)
            .header(REQUEST_ID_HEADER, req.request_id.as_str());

        builder = match self.identity_mode {
            IdentityHeaderMode::User => builder.header(USER_HEADER, caller.profile().to_string()),
            IdentityHeaderMode::Roles => builder
                .header(ROLES_HEADER, caller.identity().roles_header_value())
                .header(USER_ID_HEADER, caller.user_id().to_string()),
        };

        builder = if req.method == Method::GET || req.method == Method::DELETE {
            let mut query = req.query;
            query.extend(req.body.scalar_fields());
            builder.query(&query)
        } else {
            let builder = builder.query(&req.query);
            match req.body {
                ParsedBody::Json(value) => builder.json(&value),
                ParsedBody::Form(pairs) => builder.form(&pairs),
                multipart @ ParsedBody::Multipart { .. } => builder.multipart(multipart_form(multipart)?),
            }
        };

        log_stage(&req.request_id, Stage::Dispatched);
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(request_id = req.request_id.as_str(), url = %url, error = %e, "upstream request failed");
            ForwardError::Upstream(e.to_string())
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ForwardError::Upstream(e.to_string()))?;
        Ok(unwrap_envelope(status, &bytes))
    }
}
