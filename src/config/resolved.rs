//! Resolved entity model: catalog validated and flattened for runtime use.

use crate::config::{KindVariant, LookupField, ValidationRule};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Runtime category of a column, derived from its PostgreSQL type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    BigInt,
    Float,
    Numeric,
    Bool,
    Text,
    Date,
    Timestamp,
    TimestampTz,
    Json,
}

impl ColumnKind {
    pub fn from_pg(type_name: &str) -> Self {
        match type_name.trim().to_lowercase().as_str() {
            "serial" | "int" | "integer" | "int4" | "smallint" | "int2" => ColumnKind::Integer,
            "bigserial" | "bigint" | "int8" => ColumnKind::BigInt,
            "double precision" | "float8" | "real" | "float4" => ColumnKind::Float,
            "numeric" | "decimal" => ColumnKind::Numeric,
            "boolean" | "bool" => ColumnKind::Bool,
            "date" => ColumnKind::Date,
            "timestamp" | "timestamp without time zone" => ColumnKind::Timestamp,
            "timestamptz" | "timestamp with time zone" => ColumnKind::TimestampTz,
            "json" | "jsonb" => ColumnKind::Json,
            _ => ColumnKind::Text,
        }
    }

    /// Type used to cast bound parameters (`$1::date`).
    pub fn cast(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::BigInt => "bigint",
            ColumnKind::Float => "double precision",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Bool => "boolean",
            ColumnKind::Text => "text",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::TimestampTz => "timestamptz",
            ColumnKind::Json => "jsonb",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub is_pk: bool,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. serial, CURRENT_DATE).
    pub has_default: bool,
    pub max_length: Option<u32>,
}

impl ColumnInfo {
    pub fn placeholder(&self, n: u32) -> String {
        format!("${}::{}", n, self.kind.cast())
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedTable {
    pub name: String,
    pub pk: String,
    pub columns: Vec<ColumnInfo>,
}

impl ResolvedTable {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Non-key columns in catalog order.
    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| !c.is_pk)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Column reference bound to the chain table that owns it (index into `ResolvedEntity::tables`).
#[derive(Clone, Debug)]
pub struct OrderTerm {
    pub owner: usize,
    pub column: String,
    pub descending: bool,
}

#[derive(Clone, Debug)]
pub struct ResolvedLookup {
    pub owner: usize,
    pub column: String,
    pub table: String,
    pub key: String,
    pub fields: Vec<LookupField>,
}

#[derive(Clone, Debug)]
pub struct ResolvedKind {
    pub owner: usize,
    pub column: String,
    pub alias: String,
    pub variants: Vec<KindVariant>,
}

#[derive(Clone, Debug)]
pub struct ResolvedScope {
    pub segment: String,
    pub owner: usize,
    pub column: ColumnInfo,
    pub order_by: Vec<OrderTerm>,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub path_segment: String,
    pub label: String,
    /// Supertype chain, root first.
    pub tables: Vec<ResolvedTable>,
    pub operations: Vec<Operation>,
    pub lookups: Vec<ResolvedLookup>,
    pub kind: Option<ResolvedKind>,
    pub scopes: Vec<ResolvedScope>,
    pub order_by: Vec<OrderTerm>,
    pub defaults: HashMap<String, Value>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedEntity {
    pub fn root(&self) -> &ResolvedTable {
        &self.tables[0]
    }

    pub fn pk_column(&self) -> Option<&ColumnInfo> {
        let root = self.root();
        root.column(&root.pk)
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    /// Finds the chain table owning `column`, searching from the root.
    pub fn locate(&self, column: &str) -> Option<(usize, &ColumnInfo)> {
        self.tables
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.column(column).map(|c| (i, c)))
    }

    pub fn scope(&self, segment: &str) -> Option<&ResolvedScope> {
        self.scopes.iter().find(|s| s.segment == segment)
    }
}

/// What a named database constraint protects; used to turn violations into client messages.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintInfo {
    Unique { table: String, message: String },
    Check { table: String, message: String },
    ForeignKey { from_table: String, from_column: String, to_table: String },
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
    pub constraints: HashMap<String, ConstraintInfo>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }

    pub fn constraint(&self, name: &str) -> Option<&ConstraintInfo> {
        self.constraints.get(name)
    }
}
