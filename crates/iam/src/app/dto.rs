use serde::Serialize;

use warden_core::UserId;

#[derive(Debug, Serialize)]
pub struct Failure {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub status: &'static str,
    pub message: &'static str,
}

impl Message {
    pub fn success(message: &'static str) -> Self {
        Self {
            status: "success",
            message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub status: &'static str,
    pub user_id: UserId,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> Data<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            data,
        }
    }
}
