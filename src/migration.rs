//! Apply the catalog to the database: tables, indexes, foreign keys, then reference seeds.
//! Every step is idempotent so startup can run it against an existing schema.

use crate::config::types::*;
use crate::config::{validate, ColumnKind, FullConfig};
use crate::error::AppError;
use crate::sql::{bind_all, quoted, QueryBuf};
use sqlx::PgPool;

/// Validates the catalog, then creates what is missing. Errors abort startup.
pub async fn apply_migrations(pool: &PgPool, config: &FullConfig) -> Result<(), AppError> {
    validate(config)?;

    for t in &config.tables {
        let sql = create_table_sql(t);
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
    }

    for idx in &config.indexes {
        let sql = create_index_sql(idx);
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
    }

    let mut added = 0usize;
    for rel in &config.relationships {
        let present: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_constraint WHERE conname = $1")
            .bind(&rel.name)
            .fetch_optional(pool)
            .await?;
        if present.is_some() {
            continue;
        }
        let sql = foreign_key_sql(rel);
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
        added += 1;
    }

    let mut seeded = 0u64;
    for seed in &config.seeds {
        let Some(table) = config.table(&seed.table) else { continue };
        for row in &seed.rows {
            let q = seed_row(table, row);
            tracing::debug!(sql = %q.sql, params = ?q.params, "seed");
            seeded += bind_all(&q.sql, &q.params).execute(pool).await?.rows_affected();
        }
        if let Some(sql) = sync_sequence_sql(table) {
            sqlx::query(&sql).execute(pool).await?;
        }
    }

    tracing::info!(
        tables = config.tables.len(),
        indexes = config.indexes.len(),
        foreign_keys_added = added,
        rows_seeded = seeded,
        "migrations applied"
    );
    Ok(())
}

fn column_def(c: &ColumnConfig) -> String {
    let mut def = format!("{} {}", quoted(&c.name), c.type_.ddl());
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = &c.default {
        def.push_str(" DEFAULT ");
        def.push_str(d.ddl());
    }
    def
}

pub fn create_table_sql(t: &TableConfig) -> String {
    let mut defs: Vec<String> = t.columns.iter().map(column_def).collect();
    defs.push(format!("PRIMARY KEY ({})", quoted(&t.primary_key)));
    for u in &t.unique {
        let cols: Vec<String> = u.columns.iter().map(|s| quoted(s)).collect();
        defs.push(format!("CONSTRAINT {} UNIQUE ({})", quoted(&u.name), cols.join(", ")));
    }
    for ch in &t.check {
        defs.push(format!("CONSTRAINT {} CHECK ({})", quoted(&ch.name), ch.expression));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&t.name),
        defs.join(",\n  ")
    )
}

pub fn create_index_sql(idx: &IndexConfig) -> String {
    let cols: Vec<String> = idx
        .columns
        .iter()
        .map(|col| match col {
            IndexColumnEntry::Name(n) => quoted(n),
            IndexColumnEntry::Spec { name, direction } => {
                let dir = direction
                    .as_deref()
                    .map(|d| format!(" {}", d.to_uppercase()))
                    .unwrap_or_default();
                format!("{}{}", quoted(name), dir)
            }
            IndexColumnEntry::Expression { expression } => format!("({})", expression),
        })
        .collect();
    let unique = if idx.unique { "UNIQUE " } else { "" };
    let where_clause = idx
        .where_
        .as_ref()
        .map(|w| format!(" WHERE {}", w))
        .unwrap_or_default();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({}){}",
        unique,
        quoted(&idx.name),
        quoted(&idx.table),
        cols.join(", "),
        where_clause
    )
}

pub fn foreign_key_sql(rel: &RelationshipConfig) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
        quoted(&rel.from_table),
        quoted(&rel.name),
        quoted(&rel.from_column),
        quoted(&rel.to_table),
        quoted(&rel.to_column),
        rel.on_delete.as_deref().unwrap_or("RESTRICT")
    )
}

/// `INSERT .. ON CONFLICT DO NOTHING` so re-seeding never overwrites edited rows.
pub fn seed_row(table: &TableConfig, row: &serde_json::Map<String, serde_json::Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &table.columns {
        let Some(v) = row.get(&c.name) else { continue };
        let n = q.push_param(v.clone());
        cols.push(quoted(&c.name));
        placeholders.push(format!("${}::{}", n, ColumnKind::from_pg(c.type_.base_name()).cast()));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
        quoted(&table.name),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// Moves a serial sequence past explicitly seeded ids.
pub fn sync_sequence_sql(table: &TableConfig) -> Option<String> {
    let pk = table.columns.iter().find(|c| c.name == table.primary_key)?;
    if !pk.type_.base_name().eq_ignore_ascii_case("serial") {
        return None;
    }
    Some(format!(
        "SELECT setval(pg_get_serial_sequence('{t}', '{c}'), COALESCE((SELECT MAX({qc}) FROM {qt}), 1))",
        t = table.name,
        c = pk.name,
        qc = quoted(&pk.name),
        qt = quoted(&table.name)
    ))
}
