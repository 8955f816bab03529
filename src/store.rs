//! Database bootstrap: create the target database when missing and open the pool.

use crate::error::AppError;
use crate::settings::Settings;
use crate::sql::quoted;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;

/// Connects to the server's `postgres` database and creates the target database if absent.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid database url: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

/// Returns the same url pointed at `postgres`, and the target database name. Query parameters are kept.
fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let (base_and_path, query) = match url.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (url, None),
    };
    let path_start = base_and_path
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("database url: no path".into()))?
        + 1;
    let db_name = base_and_path.get(path_start..).unwrap_or("").trim();
    let base = base_and_path.get(..path_start).unwrap_or(base_and_path);
    let admin_url = match query {
        Some(q) => format!("{}postgres?{}", base, q),
        None => format!("{}postgres", base),
    };
    Ok((admin_url, db_name.to_string()))
}

pub async fn connect_pool(settings: &Settings) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(settings.database_url())
        .await?;
    tracing::info!(max_connections = settings.max_connections, "database pool ready");
    Ok(pool)
}
