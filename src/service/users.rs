//! User accounts: registration, credential checks and admin management.

use crate::auth::{hash_password, verify_password};
use crate::config::{ResolvedModel, ValidationRule};
use crate::error::AppError;
use crate::service::constraint::{translate, DbAction};
use crate::service::RequestValidator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

pub const ROLES: &[&str] = &["user", "admin"];

/// Public view of a user. The password hash never leaves the store.
#[derive(Clone, Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(FromRow)]
struct Credentials {
    id: i32,
    password: String,
    role: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

fn rules() -> HashMap<String, ValidationRule> {
    let text = |min: u32, max: u32| ValidationRule {
        required: Some(true),
        format: Some("string".into()),
        min_length: Some(min),
        max_length: Some(max),
        ..ValidationRule::default()
    };
    let mut rules = HashMap::new();
    rules.insert("name".to_string(), text(1, 128));
    rules.insert(
        "email".to_string(),
        ValidationRule {
            format: Some("email".into()),
            ..text(3, 255)
        },
    );
    rules.insert("password".to_string(), text(8, 128));
    rules.insert(
        "role".to_string(),
        ValidationRule {
            required: None,
            allowed: Some(ROLES.iter().map(|r| Value::from(*r)).collect()),
            ..text(1, 16)
        },
    );
    rules
}

fn body_map(body: Value) -> Result<HashMap<String, Value>, AppError> {
    match body {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn decode<T: serde::de::DeserializeOwned>(map: HashMap<String, Value>) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(map.into_iter().collect()))
        .map_err(|e| AppError::Validation(e.to_string()))
}

impl NewUser {
    pub fn from_json(body: Value) -> Result<Self, AppError> {
        let map = body_map(body)?;
        RequestValidator::validate(&map, &rules())?;
        decode(map)
    }
}

impl UserUpdate {
    pub fn from_json(body: Value) -> Result<Self, AppError> {
        let map = body_map(body)?;
        RequestValidator::validate_partial(&map, &rules())?;
        decode(map)
    }
}

pub struct UserStore;

impl UserStore {
    pub async fn create(pool: &PgPool, model: &ResolvedModel, new: &NewUser) -> Result<User, AppError> {
        let hash = hash_password(&new.password)?;
        let role = new.role.as_deref().unwrap_or("user");
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, email, password, role) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, email, role",
        )
        .bind(&new.name)
        .bind(new.email.trim())
        .bind(&hash)
        .bind(role)
        .fetch_one(pool)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
        tracing::info!(user_id = user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Id and role of the account when the password matches.
    pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<Option<(i32, String)>, AppError> {
        let found = sqlx::query_as::<_, Credentials>("SELECT id, password, role FROM users WHERE email = $1")
            .bind(email.trim())
            .fetch_optional(pool)
            .await?;
        Ok(found
            .filter(|c| verify_password(password, &c.password))
            .map(|c| (c.id, c.role)))
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Option<User>, AppError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT id, name, email, role FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?,
        )
    }

    pub async fn list(pool: &PgPool, limit: Option<u32>, offset: Option<u32>) -> Result<Vec<User>, AppError> {
        let limit = i64::from(limit.unwrap_or(crate::sql::MAX_LIMIT).min(crate::sql::MAX_LIMIT));
        let offset = i64::from(offset.unwrap_or(0));
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, name, email, role FROM users ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?)
    }

    /// Absent fields keep their value; a new password is re-hashed.
    pub async fn update(
        pool: &PgPool,
        model: &ResolvedModel,
        id: i32,
        update: &UserUpdate,
    ) -> Result<Option<User>, AppError> {
        let hash = update.password.as_deref().map(hash_password).transpose()?;
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET name = COALESCE($2, name), email = COALESCE($3, email), \
             password = COALESCE($4, password), role = COALESCE($5, role) \
             WHERE id = $1 RETURNING id, name, email, role",
        )
        .bind(id)
        .bind(&update.name)
        .bind(update.email.as_deref().map(str::trim))
        .bind(&hash)
        .bind(&update.role)
        .fetch_optional(pool)
        .await
        .map_err(|e| translate(model, e, DbAction::Write))?;
        if user.is_some() {
            tracing::info!(user_id = id, "user updated");
        }
        Ok(user)
    }

    pub async fn delete(pool: &PgPool, id: i32) -> Result<bool, AppError> {
        let done = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if done.rows_affected() > 0 {
            tracing::info!(user_id = id, "user deleted");
        }
        Ok(done.rows_affected() > 0)
    }

    /// Creates the bootstrap admin when no account has that email yet.
    pub async fn ensure_admin(pool: &PgPool, model: &ResolvedModel, email: &str, password: &str) -> Result<(), AppError> {
        let existing: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        if existing.is_some() {
            tracing::debug!(email, "bootstrap admin already present");
            return Ok(());
        }
        let admin = NewUser {
            name: "admin".into(),
            email: email.into(),
            password: password.into(),
            role: Some("admin".into()),
        };
        Self::create(pool, model, &admin).await?;
        Ok(())
    }
}
