//! Response helpers. Rows and lists are returned bare; acknowledgements carry a message.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::OK, Json(data))
}

pub fn success_many<T: Serialize>(data: Vec<T>) -> (StatusCode, Json<Vec<T>>) {
    (StatusCode::OK, Json(data))
}

pub fn message(text: impl Into<String>) -> (StatusCode, Json<MessageBody>) {
    (
        StatusCode::OK,
        Json(MessageBody {
            message: text.into(),
        }),
    )
}

/// `{"message": "<Label> deleted"}`.
pub fn deleted(label: &str) -> (StatusCode, Json<MessageBody>) {
    message(format!("{} deleted", label))
}
