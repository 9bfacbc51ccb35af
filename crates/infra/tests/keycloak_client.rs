use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use uuid::Uuid;

use warden_core::IdpUid;
use warden_infra::{IdentityProvider, IdpError, KeycloakClient, KeycloakConfig, NewAccount};

const REALM: &str = "demo";
const ADMIN_TOKEN: &str = "admin-token";

#[derive(Default)]
struct FakeKeycloak {
    created: Vec<Value>,
    mappings: Vec<(String, Value)>,
}

type Shared = Arc<Mutex<FakeKeycloak>>;

struct TestServer {
    base_url: String,
    state: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/realms/master/protocol/openid-connect/token", post(admin_token))
            .route("/realms/demo/protocol/openid-connect/token", post(user_token))
            .route("/admin/realms/demo/roles", get(roles))
            .route("/admin/realms/demo/users", post(create_user))
            .route(
                "/admin/realms/demo/users/:id/role-mappings/realm",
                post(map_roles),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    fn client(&self) -> KeycloakClient {
        KeycloakClient::new(
            KeycloakConfig::new(&self.base_url, REALM, "gateway").with_admin("admin", "admin"),
        )
        .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn is_admin(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer admin-token")
}

async fn admin_token(Form(form): Form<Vec<(String, String)>>) -> Response {
    let client_id = form.iter().find(|(k, _)| k == "client_id").map(|(_, v)| v.as_str());
    if client_id != Some("admin-cli") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(json!({ "access_token": ADMIN_TOKEN, "expires_in": 60 })).into_response()
}

async fn user_token(Form(form): Form<Vec<(String, String)>>) -> Response {
    let password = form.iter().find(|(k, _)| k == "password").map(|(_, v)| v.as_str());
    if password == Some("secret") {
        Json(json!({
            "access_token": "at",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "refresh_token": "rt",
            "token_type": "Bearer",
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid user credentials" })),
        )
            .into_response()
    }
}

async fn roles(headers: HeaderMap) -> Response {
    if !is_admin(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([
        { "id": "r-user", "name": "user", "composite": false },
        { "id": "r-admin", "name": "admin", "description": null },
        { "id": "r-default", "name": "default-roles-demo", "description": "${role_default-roles}" },
    ]))
    .into_response()
}

async fn create_user(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !is_admin(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let id = Uuid::new_v4();
    state.lock().unwrap().created.push(body);
    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("http://kc/admin/realms/demo/users/{id}"))],
    )
        .into_response()
}

async fn map_roles(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.lock().unwrap().mappings.push((id, body));
    StatusCode::NO_CONTENT
}

fn account(roles: &[&str]) -> NewAccount {
    NewAccount {
        user_name: "alice".to_string(),
        first_name: "Alice".to_string(),
        last_name: "A".to_string(),
        email: "a@x.com".to_string(),
        password: "pw".to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

#[tokio::test]
async fn create_user_reads_uid_from_location_and_maps_roles() {
    let server = TestServer::spawn().await;
    let kc = server.client();

    let uid: IdpUid = kc.create_user(&account(&["user"])).await.unwrap();

    let state = server.state.lock().unwrap();
    assert_eq!(state.created.len(), 1);
    assert_eq!(state.created[0]["username"], "alice");
    assert_eq!(state.created[0]["credentials"][0]["value"], "pw");
    assert_eq!(state.mappings.len(), 1);
    assert_eq!(state.mappings[0].0, uid.to_string());
    assert_eq!(state.mappings[0].1[0]["id"], "r-user");
}

#[tokio::test]
async fn unknown_role_is_rejected_before_account_creation() {
    let server = TestServer::spawn().await;
    let kc = server.client();

    let err = kc.create_user(&account(&["systemAdmin"])).await.unwrap_err();

    assert_eq!(err, IdpError::UnknownRole("systemAdmin".to_string()));
    assert!(server.state.lock().unwrap().created.is_empty());
}

#[tokio::test]
async fn failed_login_surfaces_provider_status_and_body() {
    let server = TestServer::spawn().await;
    let kc = server.client();

    let tokens = kc.login("alice", "secret").await.unwrap();
    assert_eq!(tokens.refresh_token, "rt");

    match kc.login("alice", "wrong").await {
        Err(IdpError::Status { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn realm_roles_keep_descriptions() {
    let server = TestServer::spawn().await;
    let roles = server.client().realm_roles().await.unwrap();

    assert_eq!(roles.len(), 3);
    assert!(!roles[2].is_custom());
}

#[tokio::test]
async fn admin_calls_need_admin_credentials() {
    let server = TestServer::spawn().await;
    let kc = KeycloakClient::new(KeycloakConfig::new(&server.base_url, REALM, "gateway")).unwrap();

    assert_eq!(kc.realm_roles().await, Err(IdpError::AdminCredentialsMissing));
}
