//! Raw catalog types matching the JSON files under `catalog/`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableCheck {
    pub name: String,
    pub expression: String,
    /// Client-facing message when the check is violated.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UniqueConfig {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default = "default_pk")]
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub unique: Vec<UniqueConfig>,
    #[serde(default)]
    pub check: Vec<TableCheck>,
}

fn default_pk() -> String {
    "id".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn base_name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }

    /// DDL rendering, e.g. `varchar(128)`.
    pub fn ddl(&self) -> String {
        match self {
            ColumnTypeConfig::Simple(s) => s.clone(),
            ColumnTypeConfig::Parameterized { name, params } => {
                let p = params
                    .as_ref()
                    .map(|v| v.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", "))
                    .unwrap_or_default();
                if p.is_empty() {
                    name.clone()
                } else {
                    format!("{}({})", name, p)
                }
            }
        }
    }

    /// First type parameter, i.e. the length of `varchar(n)`.
    pub fn length(&self) -> Option<u32> {
        match self {
            ColumnTypeConfig::Simple(_) => None,
            ColumnTypeConfig::Parameterized { params, .. } => params.as_ref().and_then(|p| p.first().copied()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum ColumnDefaultConfig {
    Literal(String),
    Expression { expression: String },
}

impl<'de> Deserialize<'de> for ColumnDefaultConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(s) => Ok(ColumnDefaultConfig::Literal(s)),
            serde_json::Value::Number(n) => Ok(ColumnDefaultConfig::Literal(n.to_string())),
            serde_json::Value::Object(mut obj) => {
                if let Some(serde_json::Value::String(s)) = obj.remove("expression") {
                    return Ok(ColumnDefaultConfig::Expression { expression: s });
                }
                Err(serde::de::Error::custom(format!(
                    "column default must be a string, a number or {{ \"expression\": \"...\" }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            other => Err(serde::de::Error::custom(format!(
                "column default must be a string, a number or {{ \"expression\": \"...\" }}; got {}",
                other
            ))),
        }
    }
}

impl ColumnDefaultConfig {
    pub fn ddl(&self) -> &str {
        match self {
            ColumnDefaultConfig::Literal(s) => s,
            ColumnDefaultConfig::Expression { expression } => expression,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefaultConfig>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexColumnEntry {
    Name(String),
    Spec { name: String, direction: Option<String> },
    Expression { expression: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<IndexColumnEntry>,
    #[serde(default, rename = "where")]
    pub where_: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    #[serde(default = "default_pk")]
    pub to_column: String,
    #[serde(default)]
    pub on_delete: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Descriptive columns pulled from a referenced table via LEFT JOIN.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Column on the entity holding the reference.
    pub column: String,
    pub table: String,
    #[serde(default = "default_pk")]
    pub key: String,
    pub fields: Vec<LookupField>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupField {
    pub column: String,
    pub alias: String,
}

/// Computed discriminator: the label of the first variant table holding a row for `column`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KindConfig {
    pub column: String,
    #[serde(default = "default_kind_alias")]
    pub alias: String,
    pub variants: Vec<KindVariant>,
}

fn default_kind_alias() -> String {
    "type".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KindVariant {
    pub label: String,
    pub table: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderConfig {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

/// Filtered list route: `GET /v1/<path_segment>/<segment>/<value>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub segment: String,
    pub column: String,
    #[serde(default)]
    pub order_by: Vec<OrderConfig>,
}

fn default_operations() -> Vec<String> {
    ["create", "read", "update", "delete"].iter().map(|s| s.to_string()).collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEntityConfig {
    pub path_segment: String,
    /// Human label used in messages ("Country not found").
    pub label: String,
    /// Supertype chain, root first. Every table shares the root's primary key.
    pub tables: Vec<String>,
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    #[serde(default)]
    pub lookups: Vec<LookupConfig>,
    #[serde(default)]
    pub kind: Option<KindConfig>,
    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,
    #[serde(default)]
    pub order_by: Vec<OrderConfig>,
    /// Values applied on create when the body omits the column.
    #[serde(default)]
    pub defaults: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
}

/// Reference rows inserted idempotently by id at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedConfig {
    pub table: String,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// All catalog kinds in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub tables: Vec<TableConfig>,
    pub indexes: Vec<IndexConfig>,
    pub relationships: Vec<RelationshipConfig>,
    pub api_entities: Vec<ApiEntityConfig>,
    pub seeds: Vec<SeedConfig>,
}

impl FullConfig {
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }
}
