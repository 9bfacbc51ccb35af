//! User administration endpoints. Caller identity comes from the headers
//! the gateway attaches; requests without them are internal calls.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use warden_core::{IdpUid, UserId};

use crate::app::dto::{Created, Data, Message};
use crate::app::errors::{bad_request, failure, manager_error_to_response};
use crate::identity::{Caller, OptionalCaller};
use crate::manager::{CreateUserInput, UpdateUserInput, UserManager};

fn parse_id<T: FromStr>(raw: &str, message: &str) -> Result<T, Response> {
    raw.parse::<T>()
        .map_err(|_| failure(StatusCode::BAD_REQUEST, message))
}

pub async fn create(
    Extension(manager): Extension<Arc<UserManager>>,
    OptionalCaller(caller): OptionalCaller,
    payload: Result<Json<CreateUserInput>, JsonRejection>,
) -> Response {
    let Json(input) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection),
    };

    match manager.create_user(caller.as_ref(), input).await {
        Ok(user_id) => Json(Created {
            status: "success",
            user_id,
            message: "User created successfully",
        })
        .into_response(),
        Err(e) => manager_error_to_response(e),
    }
}

pub async fn update(
    Extension(manager): Extension<Arc<UserManager>>,
    Caller(caller): Caller,
    payload: Result<Json<UpdateUserInput>, JsonRejection>,
) -> Response {
    let Json(input) = match payload {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection),
    };

    match manager.update_user(&caller, input).await {
        Ok(outcome) => Json(Message::success(outcome.message())).into_response(),
        Err(e) => manager_error_to_response(e),
    }
}

pub async fn delete(
    Extension(manager): Extension<Arc<UserManager>>,
    OptionalCaller(caller): OptionalCaller,
    Path(user_id): Path<String>,
) -> Response {
    let user_id: UserId = match parse_id(&user_id, "Invalid user id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match manager.delete_user(caller.as_ref(), user_id).await {
        Ok(()) => Json(Message::success("User deleted successfully")).into_response(),
        Err(e) => manager_error_to_response(e),
    }
}

pub async fn get_self(
    Extension(manager): Extension<Arc<UserManager>>,
    OptionalCaller(caller): OptionalCaller,
) -> Response {
    match manager.get_user(caller.as_ref(), None).await {
        Ok(user) => Json(Data::success(user)).into_response(),
        Err(e) => manager_error_to_response(e),
    }
}

pub async fn get_by_id(
    Extension(manager): Extension<Arc<UserManager>>,
    OptionalCaller(caller): OptionalCaller,
    Path(user_id): Path<String>,
) -> Response {
    let user_id: UserId = match parse_id(&user_id, "Invalid user id") {
        Ok(id) => id,
        Err(response) => return response,
    };

    match manager.get_user(caller.as_ref(), Some(user_id)).await {
        Ok(user) => Json(Data::success(user)).into_response(),
        Err(e) => manager_error_to_response(e),
    }
}

pub async fn get_by_idp_uid(
    Extension(manager): Extension<Arc<UserManager>>,
    OptionalCaller(caller): OptionalCaller,
    Path(uid): Path<String>,
) -> Response {
    let uid: IdpUid = match parse_id(&uid, "Invalid keycloak uid") {
        Ok(uid) => uid,
        Err(response) => return response,
    };

    match manager.get_user_by_idp_uid(caller.as_ref(), uid).await {
        Ok(user) => Json(Data::success(user)).into_response(),
        Err(e) => manager_error_to_response(e),
    }
}

pub async fn roles(
    Extension(manager): Extension<Arc<UserManager>>,
    OptionalCaller(caller): OptionalCaller,
) -> Response {
    match manager.get_roles(caller.as_ref()).await {
        Ok(roles) => Json(Data::success(roles)).into_response(),
        Err(e) => manager_error_to_response(e),
    }
}
