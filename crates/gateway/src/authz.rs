//! Gateway-side authorization guard for forwarded requests.
//!
//! Runs after routing and before dispatch, for every target service.

use warden_auth::{AuthorizationGate, Decision, SystemAdminError, TargetRefs};

use crate::body::ParsedBody;
use crate::context::CallerContext;

fn query_value<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Reject requests from non-system-admin callers that reference the system
/// admin through the payload `id`/`user_id` fields, the query string or the
/// path after the action.
pub async fn authorize_forward(
    gate: &AuthorizationGate,
    caller: &CallerContext,
    body: &ParsedBody,
    query: &[(String, String)],
    extra_path: Option<&str>,
) -> Result<Decision, SystemAdminError> {
    let id = body.field("id");
    let user_id = body.field("user_id");
    let payload = TargetRefs {
        id: id.as_deref(),
        user_id: user_id.as_deref(),
        path_suffix: extra_path,
    };

    let decision = gate
        .check_system_admin_protected(caller.user_id(), &payload)
        .await?;
    if !decision.is_allowed() {
        return Ok(decision);
    }

    let query_refs = TargetRefs {
        id: query_value(query, "id"),
        user_id: query_value(query, "user_id"),
        path_suffix: None,
    };
    if query_refs == TargetRefs::default() {
        return Ok(decision);
    }
    gate.check_system_admin_protected(caller.user_id(), &query_refs)
        .await
}
