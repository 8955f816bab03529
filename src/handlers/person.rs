//! Person aggregate handlers under `/v1/person`.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::extractors::CurrentUser;
use crate::response::{deleted, success_many, success_one};
use crate::service::{PersonPayload, PersonService};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

const LABEL: &str = "Person";

#[derive(Debug, Deserialize)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

fn person_entity(state: &AppState) -> Result<&ResolvedEntity, AppError> {
    state
        .model
        .entity_by_path("person")
        .ok_or_else(|| AppError::Internal("catalog has no person entity".into()))
}

fn parse_person_id(id_str: &str) -> Result<i32, AppError> {
    id_str
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest("invalid id".into()))
}

fn not_found() -> AppError {
    AppError::NotFound(format!("{} not found", LABEL))
}

pub async fn list(
    _user: CurrentUser,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, AppError> {
    let rows = PersonService::list(&state.pool, page.limit, page.offset).await?;
    Ok(success_many(rows))
}

pub async fn create(
    _user: CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let payload = PersonPayload::from_json(person_entity(&state)?, body)?;
    let row = PersonService::create(&state.pool, &state.model, &payload).await?;
    Ok(success_one(row))
}

pub async fn read(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_person_id(&id_str)?;
    let row = PersonService::read(&state.pool, id).await?.ok_or_else(not_found)?;
    Ok(success_one(row))
}

pub async fn update(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_person_id(&id_str)?;
    let payload = PersonPayload::from_json(person_entity(&state)?, body)?;
    let row = PersonService::update(&state.pool, &state.model, id, &payload)
        .await?
        .ok_or_else(not_found)?;
    Ok(success_one(row))
}

pub async fn delete(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_person_id(&id_str)?;
    if !PersonService::delete(&state.pool, &state.model, id).await? {
        return Err(not_found());
    }
    Ok(deleted(LABEL))
}
