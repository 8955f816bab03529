//! Person aggregate: one person row plus its current names, marital status, measurements and citizenship.

use crate::config::{ResolvedEntity, ResolvedModel, ValidationRule};
use crate::error::AppError;
use crate::service::constraint::{translate, DbAction};
use crate::service::rows::row_to_json;
use crate::service::RequestValidator;
use crate::sql::person::*;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

/// Writable person fields. Every field is optional; on update an absent or null field is kept.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PersonPayload {
    pub personal_id_number: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub mothermaidenname: Option<String>,
    pub totalyearworkexperience: Option<i32>,
    pub comment: Option<String>,
    pub gender_type_id: Option<i32>,
    pub fname: Option<String>,
    pub mname: Option<String>,
    pub lname: Option<String>,
    pub nickname: Option<String>,
    pub marital_status_type_id: Option<i32>,
    pub height_val: Option<f64>,
    pub weight_val: Option<f64>,
    pub country_id: Option<i32>,
}

impl PersonPayload {
    /// Checks lengths and formats against the person columns, then decodes.
    pub fn from_json(entity: &ResolvedEntity, body: Value) -> Result<Self, AppError> {
        let map: HashMap<String, Value> = match body {
            Value::Object(m) => m.into_iter().collect(),
            _ => return Err(AppError::BadRequest("body must be a JSON object".into())),
        };
        RequestValidator::validate_partial(&map, &rules(entity))?;
        let value = Value::Object(map.into_iter().collect());
        serde_json::from_value(value).map_err(|e| AppError::Validation(e.to_string()))
    }

    fn name(&self, slot: &str) -> Option<&str> {
        match slot {
            "fname" => self.fname.as_deref(),
            "mname" => self.mname.as_deref(),
            "lname" => self.lname.as_deref(),
            "nickname" => self.nickname.as_deref(),
            _ => None,
        }
    }

    fn measure(&self, slot: &str) -> Option<f64> {
        match slot {
            "height" => self.height_val,
            "weight" => self.weight_val,
            _ => None,
        }
    }
}

/// Column rules for the person table plus the aggregate-only fields.
fn rules(entity: &ResolvedEntity) -> HashMap<String, ValidationRule> {
    let mut rules: HashMap<String, ValidationRule> = entity
        .validation
        .iter()
        .map(|(k, r)| (k.clone(), ValidationRule { required: None, ..r.clone() }))
        .collect();
    for slot in NAME_SLOTS {
        rules.insert(
            slot.to_string(),
            ValidationRule {
                format: Some("string".into()),
                max_length: Some(128),
                min_length: Some(1),
                ..ValidationRule::default()
            },
        );
    }
    for (_, field) in MEASURE_SLOTS {
        rules.insert(
            field.to_string(),
            ValidationRule {
                format: Some("number".into()),
                minimum: Some(0.0),
                ..ValidationRule::default()
            },
        );
    }
    for field in ["marital_status_type_id", "country_id"] {
        rules.insert(
            field.to_string(),
            ValidationRule {
                format: Some("integer".into()),
                ..ValidationRule::default()
            },
        );
    }
    rules
}

fn int_field(row: &Value, key: &str) -> Option<i32> {
    row.get(key)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
}

pub struct PersonService;

impl PersonService {
    pub async fn list(pool: &PgPool, limit: Option<u32>, offset: Option<u32>) -> Result<Vec<Value>, AppError> {
        let sql = select_people(false, limit, offset);
        tracing::debug!(sql = %sql, "query");
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn read(pool: &PgPool, id: i32) -> Result<Option<Value>, AppError> {
        let mut conn = pool.acquire().await?;
        fetch_person(&mut conn, id).await
    }

    pub async fn create(pool: &PgPool, model: &ResolvedModel, payload: &PersonPayload) -> Result<Value, AppError> {
        let write = |e| translate(model, e, DbAction::Write);
        let mut tx = pool.begin().await?;

        let id: i32 = sqlx::query_scalar(INSERT_PARTY).fetch_one(&mut *tx).await?;
        tracing::debug!(sql = %INSERT_PERSON, id, "query (tx)");
        sqlx::query(INSERT_PERSON)
            .bind(id)
            .bind(&payload.personal_id_number)
            .bind(payload.birthdate)
            .bind(&payload.mothermaidenname)
            .bind(payload.totalyearworkexperience)
            .bind(&payload.comment)
            .bind(payload.gender_type_id)
            .execute(&mut *tx)
            .await
            .map_err(write)?;

        for slot in NAME_SLOTS {
            if let Some(name) = payload.name(slot) {
                insert_name(&mut tx, model, id, slot, name).await?;
            }
        }
        if let Some(type_id) = payload.marital_status_type_id {
            insert_marital(&mut tx, model, id, type_id).await?;
        }
        for (slot, _) in MEASURE_SLOTS {
            if let Some(val) = payload.measure(slot) {
                insert_measure(&mut tx, model, id, slot, val).await?;
            }
        }
        if let Some(country_id) = payload.country_id {
            insert_citizenship(&mut tx, model, id, country_id).await?;
        }

        let created = fetch_person(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("person {} vanished after insert", id)))?;
        tx.commit().await?;
        tracing::info!(id, "person created");
        Ok(created)
    }

    /// Person columns are COALESCE-updated; a changed temporal value supersedes the current row.
    pub async fn update(
        pool: &PgPool,
        model: &ResolvedModel,
        id: i32,
        payload: &PersonPayload,
    ) -> Result<Option<Value>, AppError> {
        let write = |e| translate(model, e, DbAction::Write);
        let mut tx = pool.begin().await?;
        let Some(current) = fetch_person(&mut tx, id).await? else {
            return Ok(None);
        };

        tracing::debug!(sql = %UPDATE_PERSON, id, "query (tx)");
        sqlx::query(UPDATE_PERSON)
            .bind(id)
            .bind(&payload.personal_id_number)
            .bind(payload.birthdate)
            .bind(&payload.mothermaidenname)
            .bind(payload.totalyearworkexperience)
            .bind(&payload.comment)
            .bind(payload.gender_type_id)
            .execute(&mut *tx)
            .await
            .map_err(write)?;

        for slot in NAME_SLOTS {
            let Some(name) = payload.name(slot) else { continue };
            if current.get(*slot).and_then(Value::as_str) == Some(name) {
                continue;
            }
            let current_id = int_field(&current, &format!("{}_id", slot));
            match close_if_older(&mut tx, model, "personname", current_id).await? {
                Some(row_id) => correct(&mut tx, model, "personname", "name", row_id, name.to_string()).await?,
                None => insert_name(&mut tx, model, id, slot, name).await?,
            }
        }

        if let Some(type_id) = payload.marital_status_type_id {
            if int_field(&current, "marital_status_type_id") != Some(type_id) {
                let current_id = int_field(&current, "marital_status_id");
                match close_if_older(&mut tx, model, "maritalstatus", current_id).await? {
                    Some(row_id) => {
                        correct(&mut tx, model, "maritalstatus", "maritalstatustype_id", row_id, type_id).await?
                    }
                    None => insert_marital(&mut tx, model, id, type_id).await?,
                }
            }
        }

        for (slot, field) in MEASURE_SLOTS {
            let Some(val) = payload.measure(slot) else { continue };
            if current.get(*field).and_then(Value::as_f64) == Some(val) {
                continue;
            }
            let current_id = int_field(&current, &format!("{}_id", slot));
            match close_if_older(&mut tx, model, "physicalcharacteristic", current_id).await? {
                Some(row_id) => correct(&mut tx, model, "physicalcharacteristic", "val", row_id, val).await?,
                None => insert_measure(&mut tx, model, id, slot, val).await?,
            }
        }

        if let Some(country_id) = payload.country_id {
            if int_field(&current, "country_id") != Some(country_id) {
                let current_id = int_field(&current, "citizenship_id");
                match close_if_older(&mut tx, model, "citizenship", current_id).await? {
                    Some(row_id) => correct(&mut tx, model, "citizenship", "country_id", row_id, country_id).await?,
                    None => insert_citizenship(&mut tx, model, id, country_id).await?,
                }
            }
        }

        let updated = fetch_person(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!(id, "person updated");
        Ok(updated)
    }

    /// Removes the person's own temporal rows, the person and its party. Any other reference rolls back.
    pub async fn delete(pool: &PgPool, model: &ResolvedModel, id: i32) -> Result<bool, AppError> {
        let delete = |e| translate(model, e, DbAction::Delete);
        let mut tx = pool.begin().await?;
        let found: Option<i32> = sqlx::query_scalar("SELECT id FROM person WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if found.is_none() {
            return Ok(false);
        }
        for table in OWNED_TABLES {
            let sql = delete_owned(table);
            tracing::debug!(sql = %sql, id, "query (tx)");
            sqlx::query(&sql).bind(id).execute(&mut *tx).await.map_err(delete)?;
        }
        for sql in ["DELETE FROM person WHERE id = $1", "DELETE FROM party WHERE id = $1"] {
            tracing::debug!(sql = %sql, id, "query (tx)");
            sqlx::query(sql).bind(id).execute(&mut *tx).await.map_err(delete)?;
        }
        tx.commit().await?;
        tracing::info!(id, "person deleted");
        Ok(true)
    }
}

async fn fetch_person(conn: &mut PgConnection, id: i32) -> Result<Option<Value>, AppError> {
    let sql = select_people(true, None, None);
    tracing::debug!(sql = %sql, id, "query");
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(row_to_json))
}

fn not_seeded(table: &str, description: &str) -> AppError {
    AppError::Internal(format!("{} '{}' is not seeded", table, description))
}

async fn insert_name(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    id: i32,
    slot: &str,
    name: &str,
) -> Result<(), AppError> {
    tracing::debug!(sql = %INSERT_NAME, id, slot, "query (tx)");
    let done = sqlx::query(INSERT_NAME)
        .bind(id)
        .bind(name)
        .bind(slot)
        .execute(&mut *conn)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
    if done.rows_affected() == 0 {
        return Err(not_seeded("personnametype", slot));
    }
    Ok(())
}

async fn insert_measure(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    id: i32,
    slot: &str,
    val: f64,
) -> Result<(), AppError> {
    tracing::debug!(sql = %INSERT_MEASURE, id, slot, "query (tx)");
    let done = sqlx::query(INSERT_MEASURE)
        .bind(id)
        .bind(val)
        .bind(slot)
        .execute(&mut *conn)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
    if done.rows_affected() == 0 {
        return Err(not_seeded("physicalcharacteristictype", slot));
    }
    Ok(())
}

async fn insert_marital(conn: &mut PgConnection, model: &ResolvedModel, id: i32, type_id: i32) -> Result<(), AppError> {
    tracing::debug!(sql = %INSERT_MARITAL, id, "query (tx)");
    sqlx::query(INSERT_MARITAL)
        .bind(id)
        .bind(type_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
    Ok(())
}

async fn insert_citizenship(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    id: i32,
    country_id: i32,
) -> Result<(), AppError> {
    tracing::debug!(sql = %INSERT_CITIZENSHIP, id, "query (tx)");
    sqlx::query(INSERT_CITIZENSHIP)
        .bind(id)
        .bind(country_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
    Ok(())
}

/// Closes the current row if it was opened before today and returns None (a new row is due).
/// A row opened today is returned for in-place correction instead.
async fn close_if_older(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    table: &str,
    current_id: Option<i32>,
) -> Result<Option<i32>, AppError> {
    let Some(row_id) = current_id else { return Ok(None) };
    let sql = close_current(table);
    tracing::debug!(sql = %sql, row_id, "query (tx)");
    let done = sqlx::query(&sql)
        .bind(row_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
    Ok(if done.rows_affected() == 0 { Some(row_id) } else { None })
}

async fn correct<T>(
    conn: &mut PgConnection,
    model: &ResolvedModel,
    table: &str,
    column: &str,
    row_id: i32,
    value: T,
) -> Result<(), AppError>
where
    T: for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send + 'static,
{
    let sql = correct_current(table, column);
    tracing::debug!(sql = %sql, row_id, "query (tx)");
    sqlx::query(&sql)
        .bind(row_id)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_embedded, resolve};
    use serde_json::json;

    fn person_entity() -> ResolvedEntity {
        let m = resolve(&load_embedded().unwrap()).unwrap();
        m.entity_by_path("person").unwrap().clone()
    }

    #[test]
    fn payload_decodes_typed_fields() {
        let p = PersonPayload::from_json(
            &person_entity(),
            json!({"fname": "Somchai", "birthdate": "1990-04-01", "height_val": 172.5, "country_id": 1, "extra": true}),
        )
        .unwrap();
        assert_eq!(p.name("fname"), Some("Somchai"));
        assert_eq!(p.birthdate, NaiveDate::from_ymd_opt(1990, 4, 1));
        assert_eq!(p.measure("height"), Some(172.5));
        assert_eq!(p.country_id, Some(1));
    }

    #[test]
    fn payload_rejects_bad_values() {
        let entity = person_entity();
        let err = PersonPayload::from_json(&entity, json!({"fname": "x".repeat(129)})).unwrap_err();
        assert_eq!(err.to_string(), "fname must be at most 128 characters");
        let err = PersonPayload::from_json(&entity, json!({"birthdate": "01/04/1990"})).unwrap_err();
        assert!(err.to_string().starts_with("birthdate must be a date"));
        let err = PersonPayload::from_json(&entity, json!({"height_val": -1})).unwrap_err();
        assert_eq!(err.to_string(), "height_val must be at least 0");
        assert!(PersonPayload::from_json(&entity, json!([1])).is_err());
    }

    #[test]
    fn empty_payload_is_a_valid_person() {
        let p = PersonPayload::from_json(&person_entity(), json!({})).unwrap();
        assert!(p.fname.is_none() && p.country_id.is_none());
    }

    #[test]
    fn int_fields_read_json_numbers() {
        let row = json!({"citizenship_id": 12, "country_id": null});
        assert_eq!(int_field(&row, "citizenship_id"), Some(12));
        assert_eq!(int_field(&row, "country_id"), None);
    }
}
