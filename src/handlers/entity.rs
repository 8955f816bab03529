//! Catalog entity CRUD handlers: create, read, update, delete, list and scoped list.

use crate::config::{ColumnInfo, ColumnKind, Operation, ResolvedEntity};
use crate::error::AppError;
use crate::extractors::CurrentUser;
use crate::response::{deleted, success_many, success_one};
use crate::service::{CrudService, RequestValidator};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

fn entity<'a>(state: &'a AppState, path_segment: &str, op: Operation) -> Result<&'a ResolvedEntity, AppError> {
    let entity = state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("Unknown resource '{}'", path_segment)))?;
    if !entity.allows(op) {
        return Err(AppError::BadRequest(format!("{} not allowed", op.as_str())));
    }
    Ok(entity)
}

pub(crate) fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest("invalid id".into()))
}

pub(crate) fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Query-string text to a JSON value of the column's type.
fn query_value(col: &ColumnInfo, s: &str) -> Result<Value, AppError> {
    let bad = |what: &str| AppError::BadRequest(format!("{} must be {}", col.name, what));
    Ok(match col.kind {
        ColumnKind::Integer | ColumnKind::BigInt => Value::from(s.parse::<i64>().map_err(|_| bad("an integer"))?),
        ColumnKind::Float | ColumnKind::Numeric => {
            let n = s.parse::<f64>().map_err(|_| bad("a number"))?;
            serde_json::Number::from_f64(n).map(Value::Number).ok_or_else(|| bad("a number"))?
        }
        ColumnKind::Bool => match s.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(bad("a boolean")),
        },
        ColumnKind::Date => {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| bad("a date (YYYY-MM-DD)"))?;
            Value::String(s.to_string())
        }
        _ => Value::String(s.to_string()),
    })
}

/// Splits `limit` / `offset` from column filters. Unknown keys are ignored.
fn list_params(
    entity: &ResolvedEntity,
    params: HashMap<String, String>,
) -> Result<(Vec<(String, Value)>, Option<u32>, Option<u32>), AppError> {
    let mut limit = None;
    let mut offset = None;
    let mut filters = Vec::new();
    for (k, v) in params {
        match k.as_str() {
            "limit" => limit = Some(v.parse().map_err(|_| AppError::BadRequest("invalid limit".into()))?),
            "offset" => offset = Some(v.parse().map_err(|_| AppError::BadRequest("invalid offset".into()))?),
            _ => {
                if let Some((_, col)) = entity.locate(&k) {
                    filters.push((k.clone(), query_value(col, &v)?));
                }
            }
        }
    }
    filters.sort_by(|a, b| a.0.cmp(&b.0));
    Ok((filters, limit, offset))
}

pub async fn list(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, Operation::Read)?;
    let (filters, limit, offset) = list_params(entity, params)?;
    let rows = CrudService::list(&state.pool, entity, &filters, None, limit, offset).await?;
    Ok(success_many(rows))
}

/// `GET /v1/<resource>/<scope>/<value>`: list filtered by the scope's column.
pub async fn list_scoped(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path((path_segment, scope, value)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, Operation::Read)?;
    let scope = entity
        .scope(&scope)
        .ok_or_else(|| AppError::NotFound(format!("Unknown scope '{}' for {}", scope, path_segment)))?;
    let value = query_value(&scope.column, &value)?;
    let (filters, limit, offset) = list_params(entity, params)?;
    let rows = CrudService::list(&state.pool, entity, &filters, Some((scope, value)), limit, offset).await?;
    Ok(success_many(rows))
}

pub async fn create(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, Operation::Create)?;
    let body = body_to_map(body)?;
    RequestValidator::validate(&body, &entity.validation)?;
    let row = CrudService::create(&state.pool, &state.model, entity, &body).await?;
    Ok(success_one(row))
}

pub async fn read(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, Operation::Read)?;
    let id = Value::from(parse_id(&id_str)?);
    let row = CrudService::read(&state.pool, entity, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", entity.label)))?;
    Ok(success_one(row))
}

pub async fn update(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, Operation::Update)?;
    let id = Value::from(parse_id(&id_str)?);
    let body = body_to_map(body)?;
    RequestValidator::validate_partial(&body, &entity.validation)?;
    let row = CrudService::update(&state.pool, &state.model, entity, &id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", entity.label)))?;
    Ok(success_one(row))
}

pub async fn delete(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, Operation::Delete)?;
    let id = Value::from(parse_id(&id_str)?);
    if !CrudService::delete(&state.pool, &state.model, entity, &id).await? {
        return Err(AppError::NotFound(format!("{} not found", entity.label)));
    }
    Ok(deleted(&entity.label))
}
