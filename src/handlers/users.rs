//! User management. Reading needs any token; writes and listing need an admin.

use crate::error::AppError;
use crate::extractors::{AdminUser, CurrentUser};
use crate::handlers::person::Page;
use crate::response::{deleted, success_many, success_one};
use crate::service::{NewUser, UserStore, UserUpdate};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

fn parse_user_id(id_str: &str) -> Result<i32, AppError> {
    id_str
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest("invalid id".into()))
}

fn not_found() -> AppError {
    AppError::NotFound("User not found".into())
}

pub async fn me(
    CurrentUser(claims): CurrentUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = UserStore::get(&state.pool, claims.user_id()?)
        .await?
        .ok_or_else(not_found)?;
    Ok(success_one(user))
}

pub async fn list(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    let users = UserStore::list(&state.pool, page.limit, page.offset).await?;
    Ok(success_many(users))
}

pub async fn create(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let new = NewUser::from_json(body)?;
    let user = UserStore::create(&state.pool, &state.model, &new).await?;
    Ok(success_one(user))
}

pub async fn read(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = UserStore::get(&state.pool, parse_user_id(&id_str)?)
        .await?
        .ok_or_else(not_found)?;
    Ok(success_one(user))
}

pub async fn update(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_user_id(&id_str)?;
    let update = UserUpdate::from_json(body)?;
    let user = UserStore::update(&state.pool, &state.model, id, &update)
        .await?
        .ok_or_else(not_found)?;
    Ok(success_one(user))
}

pub async fn delete(
    AdminUser(claims): AdminUser,
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_user_id(&id_str)?;
    if claims.user_id()? == id {
        return Err(AppError::BadRequest("Admins cannot delete their own account".into()));
    }
    if !UserStore::delete(&state.pool, id).await? {
        return Err(not_found());
    }
    Ok(deleted("User"))
}
