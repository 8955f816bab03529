//! Catalog validation: referential integrity and API consistency.

use crate::config::FullConfig;
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

const OPERATIONS: &[&str] = &["create", "read", "update", "delete"];

/// PostgreSQL truncates longer identifiers (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_BYTES: usize = 63;

fn identifier(kind: &'static str, name: &str) -> Result<(), ConfigError> {
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(ConfigError::Validation(format!(
            "{} name '{}' is {} bytes; PostgreSQL keeps only {}",
            kind,
            name,
            name.len(),
            MAX_IDENTIFIER_BYTES
        )));
    }
    Ok(())
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut columns_by_table: HashMap<&str, HashSet<&str>> = HashMap::new();
    for t in &config.tables {
        identifier("table", &t.name)?;
        for c in &t.columns {
            identifier("column", &c.name)?;
        }
        for u in &t.unique {
            identifier("constraint", &u.name)?;
        }
        for c in &t.check {
            identifier("constraint", &c.name)?;
        }
        let cols: HashSet<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
        if !cols.contains(t.primary_key.as_str()) {
            return Err(ConfigError::InvalidPrimaryKey {
                table: t.name.clone(),
                column: t.primary_key.clone(),
            });
        }
        for u in &t.unique {
            for c in &u.columns {
                if !cols.contains(c.as_str()) {
                    return Err(missing("column", &t.name, c));
                }
            }
        }
        if columns_by_table.insert(t.name.as_str(), cols).is_some() {
            return Err(ConfigError::DuplicateTable(t.name.clone()));
        }
    }

    let has_column = |table: &str, column: &str| {
        columns_by_table
            .get(table)
            .map(|cols| cols.contains(column))
            .unwrap_or(false)
    };

    for idx in &config.indexes {
        identifier("index", &idx.name)?;
        if !columns_by_table.contains_key(idx.table.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "table",
                id: idx.table.clone(),
            });
        }
    }

    for r in &config.relationships {
        identifier("constraint", &r.name)?;
        if !has_column(&r.from_table, &r.from_column) {
            return Err(missing("column", &r.from_table, &r.from_column));
        }
        if !has_column(&r.to_table, &r.to_column) {
            return Err(missing("column", &r.to_table, &r.to_column));
        }
    }

    let mut path_segments = HashSet::new();
    for api in &config.api_entities {
        if api.tables.is_empty() {
            return Err(ConfigError::Validation(format!(
                "api entity '{}' has no tables",
                api.path_segment
            )));
        }
        for t in &api.tables {
            if !columns_by_table.contains_key(t.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "table",
                    id: t.clone(),
                });
            }
        }
        if !path_segments.insert(api.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(api.path_segment.clone()));
        }
        for op in &api.operations {
            if !OPERATIONS.contains(&op.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "api entity '{}': unknown operation '{}'",
                    api.path_segment, op
                )));
            }
        }
        let in_chain = |column: &str| api.tables.iter().any(|t| has_column(t, column));
        for l in &api.lookups {
            if !in_chain(&l.column) {
                return Err(missing("lookup column", &api.path_segment, &l.column));
            }
            for f in &l.fields {
                if !has_column(&l.table, &f.column) {
                    return Err(missing("lookup field", &l.table, &f.column));
                }
            }
        }
        if let Some(kind) = &api.kind {
            if !in_chain(&kind.column) {
                return Err(missing("kind column", &api.path_segment, &kind.column));
            }
            for v in &kind.variants {
                if !columns_by_table.contains_key(v.table.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "table",
                        id: v.table.clone(),
                    });
                }
            }
        }
        let mut scope_segments = HashSet::new();
        for s in &api.scopes {
            if !in_chain(&s.column) {
                return Err(missing("scope column", &api.path_segment, &s.column));
            }
            if !scope_segments.insert(s.segment.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "api entity '{}': duplicate scope '{}'",
                    api.path_segment, s.segment
                )));
            }
            for o in &s.order_by {
                if !in_chain(&o.column) {
                    return Err(missing("order column", &api.path_segment, &o.column));
                }
            }
        }
        for o in &api.order_by {
            if !in_chain(&o.column) {
                return Err(missing("order column", &api.path_segment, &o.column));
            }
        }
        for col in api.defaults.keys() {
            if !in_chain(col) {
                return Err(missing("default column", &api.path_segment, col));
            }
        }
    }

    for s in &config.seeds {
        for row in &s.rows {
            for col in row.keys() {
                if !has_column(&s.table, col) {
                    return Err(missing("seed column", &s.table, col));
                }
            }
        }
    }

    Ok(())
}

fn missing(kind: &'static str, owner: &str, column: &str) -> ConfigError {
    ConfigError::MissingReference {
        kind,
        id: format!("{}.{}", owner, column),
    }
}
