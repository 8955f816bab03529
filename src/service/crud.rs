//! Generic CRUD execution against PostgreSQL.
//!
//! Writes touching a supertype chain run in one transaction; dropping the transaction on an
//! error path rolls every table back.

use crate::config::{ResolvedEntity, ResolvedModel, ResolvedScope};
use crate::error::AppError;
use crate::service::constraint::{translate, DbAction};
use crate::service::rows::row_to_json;
use crate::sql::{bind_all, delete_row, exists, insert_row, select_by_id, select_list, update_row, QueryBuf};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

pub struct CrudService;

impl CrudService {
    /// List rows with optional exact-match filters, optional scope, limit (max 1000) and offset.
    pub async fn list(
        pool: &PgPool,
        entity: &ResolvedEntity,
        filters: &[(String, Value)],
        scope: Option<(&ResolvedScope, Value)>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, AppError> {
        let q = select_list(entity, filters, scope, limit, offset);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(&q.sql, &q.params).fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Fetch one entity by id. Returns JSON object or None.
    pub async fn read(pool: &PgPool, entity: &ResolvedEntity, id: &Value) -> Result<Option<Value>, AppError> {
        let q = select_by_id(entity, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(&q.sql, &q.params).fetch_optional(pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    /// Insert the root row, then every subtype row under the generated id. Returns the created entity.
    pub async fn create(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        body: &HashMap<String, Value>,
    ) -> Result<Value, AppError> {
        let body = with_defaults(entity, body);
        let root = entity.root();
        let mut tx = pool.begin().await?;

        let q = insert_row(root, None, &body);
        let row = fetch_one_tx(&mut tx, &q)
            .await
            .map_err(|e| translate(model, e, DbAction::Write))?;
        let id = row_to_json(&row)
            .get(&root.pk)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("insert into {} returned no key", root.name)))?;

        for table in entity.tables.iter().skip(1) {
            let q = insert_row(table, Some(&id), &body);
            execute_tx(&mut tx, &q)
                .await
                .map_err(|e| translate(model, e, DbAction::Write))?;
        }

        let q = select_by_id(entity, &id);
        let created = fetch_optional_tx(&mut tx, &q)
            .await?
            .map(|r| row_to_json(&r))
            .ok_or_else(|| AppError::Internal(format!("{} {} vanished after insert", entity.label, id)))?;
        tx.commit().await?;
        tracing::info!(entity = %entity.path_segment, id = %id, "created");
        Ok(created)
    }

    /// COALESCE update of every chain table owning a body column. None when the id is not this entity.
    pub async fn update(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: &Value,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let mut tx = pool.begin().await?;
        if fetch_optional_tx(&mut tx, &exists(entity, id)).await?.is_none() {
            return Ok(None);
        }
        for table in &entity.tables {
            if let Some(q) = update_row(table, id, body) {
                execute_tx(&mut tx, &q)
                    .await
                    .map_err(|e| translate(model, e, DbAction::Write))?;
            }
        }
        let updated = fetch_optional_tx(&mut tx, &select_by_id(entity, id))
            .await?
            .map(|r| row_to_json(&r));
        tx.commit().await?;
        tracing::info!(entity = %entity.path_segment, id = %id, "updated");
        Ok(updated)
    }

    /// Delete leaf to root. Returns false when the id is not this entity.
    pub async fn delete(
        pool: &PgPool,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        id: &Value,
    ) -> Result<bool, AppError> {
        let mut tx = pool.begin().await?;
        if fetch_optional_tx(&mut tx, &exists(entity, id)).await?.is_none() {
            return Ok(false);
        }
        for table in entity.tables.iter().rev() {
            execute_tx(&mut tx, &delete_row(table, id))
                .await
                .map_err(|e| translate(model, e, DbAction::Delete))?;
        }
        tx.commit().await?;
        tracing::info!(entity = %entity.path_segment, id = %id, "deleted");
        Ok(true)
    }
}

/// Catalog defaults fill absent or null columns on create.
fn with_defaults(entity: &ResolvedEntity, body: &HashMap<String, Value>) -> HashMap<String, Value> {
    let mut out = body.clone();
    for (col, default) in &entity.defaults {
        let slot = out.entry(col.clone()).or_insert(Value::Null);
        if slot.is_null() {
            *slot = default.clone();
        }
    }
    out
}

async fn fetch_one_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<PgRow, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
    bind_all(&q.sql, &q.params).fetch_one(&mut *tx).await
}

async fn fetch_optional_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<Option<PgRow>, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
    bind_all(&q.sql, &q.params).fetch_optional(&mut *tx).await
}

async fn execute_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<u64, sqlx::Error> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
    Ok(bind_all(&q.sql, &q.params).execute(&mut *tx).await?.rows_affected())
}
