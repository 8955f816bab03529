//! Registration and login.

use crate::error::AppError;
use crate::response::message;
use crate::service::{NewUser, UserStore};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Self-service sign-up always creates a plain `user`.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let mut new = NewUser::from_json(body)?;
    new.role = None;
    UserStore::create(&state.pool, &state.model, &new).await?;
    Ok(message("User created"))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let req: LoginRequest =
        serde_json::from_value(body).map_err(|e| AppError::Validation(e.to_string()))?;
    let (id, role) = UserStore::authenticate(&state.pool, &req.email, &req.password)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;
    let access_token = state.keys.issue(id, &role)?;
    tracing::info!(user_id = id, "login");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}
