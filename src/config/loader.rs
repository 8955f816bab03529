//! Load the catalog (embedded or from a directory) and resolve it into the runtime model.

use crate::config::resolved::{
    ColumnInfo, ColumnKind, ConstraintInfo, Operation, OrderTerm, ResolvedEntity, ResolvedKind, ResolvedLookup,
    ResolvedModel, ResolvedScope, ResolvedTable,
};
use crate::config::types::*;
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

const TABLES_JSON: &str = include_str!("../../catalog/tables.json");
const INDEXES_JSON: &str = include_str!("../../catalog/indexes.json");
const RELATIONSHIPS_JSON: &str = include_str!("../../catalog/relationships.json");
const API_ENTITIES_JSON: &str = include_str!("../../catalog/api_entities.json");
const SEEDS_JSON: &str = include_str!("../../catalog/seeds.json");

/// Catalog compiled into the binary.
pub fn load_embedded() -> Result<FullConfig, ConfigError> {
    Ok(FullConfig {
        tables: parse("tables.json", TABLES_JSON)?,
        indexes: parse("indexes.json", INDEXES_JSON)?,
        relationships: parse("relationships.json", RELATIONSHIPS_JSON)?,
        api_entities: parse("api_entities.json", API_ENTITIES_JSON)?,
        seeds: parse("seeds.json", SEEDS_JSON)?,
    })
}

/// Catalog read from `dir`; absent files count as empty lists except `tables.json`.
pub fn load_from_dir(dir: &Path) -> Result<FullConfig, ConfigError> {
    let read = |name: &str, required: bool| -> Result<Option<String>, ConfigError> {
        let path = dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
        }
    };
    let tables = read("tables.json", true)?.unwrap_or_default();
    Ok(FullConfig {
        tables: parse("tables.json", &tables)?,
        indexes: parse_or_empty("indexes.json", read("indexes.json", false)?)?,
        relationships: parse_or_empty("relationships.json", read("relationships.json", false)?)?,
        api_entities: parse_or_empty("api_entities.json", read("api_entities.json", false)?)?,
        seeds: parse_or_empty("seeds.json", read("seeds.json", false)?)?,
    })
}

fn parse<T>(name: &str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    serde_json::from_str(raw).map_err(|e| ConfigError::Load(format!("{}: {}", name, e)))
}

fn parse_or_empty<T>(name: &str, raw: Option<String>) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    match raw {
        Some(raw) => parse(name, &raw),
        None => Ok(Vec::new()),
    }
}

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let tables: HashMap<&str, ResolvedTable> = config
        .tables
        .iter()
        .map(|t| (t.name.as_str(), resolve_table(t)))
        .collect();

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();
    for api in &config.api_entities {
        let entity = resolve_entity(api, &tables)?;
        entity_by_path.insert(api.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_path,
        constraints: collect_constraints(config),
    })
}

fn resolve_table(t: &TableConfig) -> ResolvedTable {
    let columns = t
        .columns
        .iter()
        .map(|c| {
            let base = c.type_.base_name().to_lowercase();
            let is_pk = c.name == t.primary_key;
            ColumnInfo {
                name: c.name.clone(),
                kind: ColumnKind::from_pg(&base),
                is_pk,
                nullable: c.nullable && !is_pk,
                has_default: c.default.is_some() || base.contains("serial"),
                max_length: if matches!(base.as_str(), "varchar" | "character varying" | "char") {
                    c.type_.length()
                } else {
                    None
                },
            }
        })
        .collect();
    ResolvedTable {
        name: t.name.clone(),
        pk: t.primary_key.clone(),
        columns,
    }
}

fn owner_of(chain: &[ResolvedTable], column: &str) -> Result<usize, ConfigError> {
    chain
        .iter()
        .position(|t| t.column(column).is_some())
        .ok_or_else(|| ConfigError::MissingReference {
            kind: "column",
            id: column.to_string(),
        })
}

fn resolve_order(chain: &[ResolvedTable], order: &[OrderConfig]) -> Result<Vec<OrderTerm>, ConfigError> {
    order
        .iter()
        .map(|o| {
            Ok(OrderTerm {
                owner: owner_of(chain, &o.column)?,
                column: o.column.clone(),
                descending: o.descending,
            })
        })
        .collect()
}

fn resolve_entity(
    api: &ApiEntityConfig,
    tables: &HashMap<&str, ResolvedTable>,
) -> Result<ResolvedEntity, ConfigError> {
    let chain: Vec<ResolvedTable> = api
        .tables
        .iter()
        .map(|name| {
            tables
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "table",
                    id: name.clone(),
                })
        })
        .collect::<Result<_, _>>()?;

    let operations = api
        .operations
        .iter()
        .map(|o| o.parse::<Operation>().map_err(ConfigError::Validation))
        .collect::<Result<Vec<_>, _>>()?;

    let lookups = api
        .lookups
        .iter()
        .map(|l| {
            Ok(ResolvedLookup {
                owner: owner_of(&chain, &l.column)?,
                column: l.column.clone(),
                table: l.table.clone(),
                key: l.key.clone(),
                fields: l.fields.clone(),
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let kind = match &api.kind {
        Some(k) => Some(ResolvedKind {
            owner: owner_of(&chain, &k.column)?,
            column: k.column.clone(),
            alias: k.alias.clone(),
            variants: k.variants.clone(),
        }),
        None => None,
    };

    let scopes = api
        .scopes
        .iter()
        .map(|s| {
            let owner = owner_of(&chain, &s.column)?;
            let column = chain[owner]
                .column(&s.column)
                .cloned()
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "column",
                    id: s.column.clone(),
                })?;
            Ok(ResolvedScope {
                segment: s.segment.clone(),
                owner,
                column,
                order_by: resolve_order(&chain, &s.order_by)?,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let order_by = resolve_order(&chain, &api.order_by)?;
    let validation = derive_validation(&chain, api);

    Ok(ResolvedEntity {
        path_segment: api.path_segment.clone(),
        label: api.label.clone(),
        tables: chain,
        operations,
        lookups,
        kind,
        scopes,
        order_by,
        defaults: api.defaults.clone(),
        validation,
    })
}

/// Explicit rules merged with what the columns imply: NOT NULL without default is required,
/// `varchar(n)` bounds length, and the column kind fixes the JSON type.
fn derive_validation(chain: &[ResolvedTable], api: &ApiEntityConfig) -> HashMap<String, ValidationRule> {
    let mut rules = api.validation.clone();
    for table in chain {
        for c in table.data_columns() {
            let rule = rules.entry(c.name.clone()).or_default();
            if rule.required.is_none() && !c.nullable && !c.has_default && !api.defaults.contains_key(&c.name) {
                rule.required = Some(true);
            }
            if rule.max_length.is_none() {
                rule.max_length = c.max_length;
            }
            if rule.format.is_none() {
                rule.format = match c.kind {
                    ColumnKind::Integer | ColumnKind::BigInt => Some("integer".into()),
                    ColumnKind::Float | ColumnKind::Numeric => Some("number".into()),
                    ColumnKind::Bool => Some("boolean".into()),
                    ColumnKind::Date => Some("date".into()),
                    ColumnKind::Timestamp | ColumnKind::TimestampTz => Some("datetime".into()),
                    ColumnKind::Text => Some("string".into()),
                    ColumnKind::Json => None,
                };
            }
        }
    }
    rules
}

fn collect_constraints(config: &FullConfig) -> HashMap<String, ConstraintInfo> {
    let mut out = HashMap::new();
    for t in &config.tables {
        for u in &t.unique {
            let message = u.message.clone().unwrap_or_else(|| unique_message(&u.columns));
            out.insert(
                u.name.clone(),
                ConstraintInfo::Unique {
                    table: t.name.clone(),
                    message,
                },
            );
        }
        for ch in &t.check {
            let message = ch
                .message
                .clone()
                .unwrap_or_else(|| format!("{} violates {}", t.name, ch.name));
            out.insert(
                ch.name.clone(),
                ConstraintInfo::Check {
                    table: t.name.clone(),
                    message,
                },
            );
        }
    }
    for idx in config.indexes.iter().filter(|i| i.unique) {
        let message = idx
            .message
            .clone()
            .unwrap_or_else(|| format!("{} already exists", capitalize(&idx.table)));
        out.insert(
            idx.name.clone(),
            ConstraintInfo::Unique {
                table: idx.table.clone(),
                message,
            },
        );
    }
    for r in &config.relationships {
        out.insert(
            r.name.clone(),
            ConstraintInfo::ForeignKey {
                from_table: r.from_table.clone(),
                from_column: r.from_column.clone(),
                to_table: r.to_table.clone(),
            },
        );
    }
    out
}

/// "Description already exists" for `["description"]`.
pub fn unique_message(columns: &[String]) -> String {
    match columns {
        [single] => format!("{} already exists", capitalize(single)),
        _ => format!("{} combination already exists", columns.join(", ")),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
