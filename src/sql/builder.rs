//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from resolved entities.
//!
//! Chain tables are aliased `t0..tN` (root first), lookup joins `l0..`, kind joins `k0..`.

use crate::config::{ColumnKind, OrderTerm, ResolvedEntity, ResolvedScope, ResolvedTable};
use serde_json::Value;
use std::collections::HashMap;

/// Hard ceiling for `?limit=`.
pub const MAX_LIMIT: u32 = 1000;

/// Quote identifier for PostgreSQL (safe: only from catalog).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a string literal (catalog labels only).
pub(crate) fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub(crate) fn new() -> Self {
        QueryBuf::default()
    }

    pub(crate) fn push_param(&mut self, v: Value) -> u32 {
        self.params.push(v);
        self.params.len() as u32
    }
}

fn chain_alias(i: usize) -> String {
    format!("t{}", i)
}

fn column_expr(alias: &str, name: &str, kind: ColumnKind) -> String {
    let q = format!("{}.{}", alias, quoted(name));
    if kind == ColumnKind::Numeric {
        format!("{}::text", q)
    } else {
        q
    }
}

/// Output columns: root key, every data column of the chain, lookup fields, kind label.
fn select_clause(entity: &ResolvedEntity) -> String {
    let root = entity.root();
    let mut parts = vec![format!("t0.{} AS {}", quoted(&root.pk), quoted(&root.pk))];
    for (i, table) in entity.tables.iter().enumerate() {
        let alias = chain_alias(i);
        for c in table.data_columns() {
            parts.push(format!("{} AS {}", column_expr(&alias, &c.name, c.kind), quoted(&c.name)));
        }
    }
    for (j, lookup) in entity.lookups.iter().enumerate() {
        for f in &lookup.fields {
            parts.push(format!("l{}.{} AS {}", j, quoted(&f.column), quoted(&f.alias)));
        }
    }
    if let Some(kind) = &entity.kind {
        let whens: Vec<String> = kind
            .variants
            .iter()
            .enumerate()
            .map(|(v, variant)| format!("WHEN k{}.\"id\" IS NOT NULL THEN {}", v, literal(&variant.label)))
            .collect();
        parts.push(format!("CASE {} END AS {}", whens.join(" "), quoted(&kind.alias)));
    }
    parts.join(", ")
}

/// Chain joined on the shared key, then lookups and kind variants as LEFT JOINs.
fn from_clause(entity: &ResolvedEntity) -> String {
    let root = entity.root();
    let mut sql = format!("{} t0", quoted(&root.name));
    for (i, table) in entity.tables.iter().enumerate().skip(1) {
        sql.push_str(&format!(
            " JOIN {} {} ON {}.{} = t0.{}",
            quoted(&table.name),
            chain_alias(i),
            chain_alias(i),
            quoted(&table.pk),
            quoted(&root.pk)
        ));
    }
    for (j, lookup) in entity.lookups.iter().enumerate() {
        sql.push_str(&format!(
            " LEFT JOIN {} l{} ON l{}.{} = {}.{}",
            quoted(&lookup.table),
            j,
            j,
            quoted(&lookup.key),
            chain_alias(lookup.owner),
            quoted(&lookup.column)
        ));
    }
    if let Some(kind) = &entity.kind {
        for (v, variant) in kind.variants.iter().enumerate() {
            sql.push_str(&format!(
                " LEFT JOIN {} k{} ON k{}.\"id\" = {}.{}",
                quoted(&variant.table),
                v,
                v,
                chain_alias(kind.owner),
                quoted(&kind.column)
            ));
        }
    }
    sql
}

fn order_clause(terms: &[OrderTerm], entity: &ResolvedEntity) -> String {
    if terms.is_empty() {
        return format!(" ORDER BY t0.{}", quoted(&entity.root().pk));
    }
    let parts: Vec<String> = terms
        .iter()
        .map(|t| {
            format!(
                "{}.{}{}",
                chain_alias(t.owner),
                quoted(&t.column),
                if t.descending { " DESC" } else { " ASC" }
            )
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

fn key_placeholder(entity: &ResolvedEntity, n: u32) -> String {
    match entity.pk_column() {
        Some(c) => c.placeholder(n),
        None => format!("${}::integer", n),
    }
}

/// SELECT one entity by root key.
pub fn select_by_id(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "SELECT {} FROM {} WHERE t0.{} = {}",
        select_clause(entity),
        from_clause(entity),
        quoted(&entity.root().pk),
        key_placeholder(entity, n)
    );
    q
}

/// `SELECT 1` over the full chain; an id owned by a sibling subtype does not match.
pub fn exists(entity: &ResolvedEntity, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    q.sql = format!(
        "SELECT 1 AS found FROM {} WHERE t0.{} = {}",
        from_clause(entity),
        quoted(&entity.root().pk),
        key_placeholder(entity, n)
    );
    q
}

/// SELECT list with exact-match filters (chain columns only), optional scope, ORDER BY, LIMIT/OFFSET.
pub fn select_list(
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    scope: Option<(&ResolvedScope, Value)>,
    limit: Option<u32>,
    offset: Option<u32>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    if let Some((scope, value)) = &scope {
        let n = q.push_param(value.clone());
        where_parts.push(format!(
            "{}.{} = {}",
            chain_alias(scope.owner),
            quoted(&scope.column.name),
            scope.column.placeholder(n)
        ));
    }
    for (col, val) in filters {
        let Some((owner, c)) = entity.locate(col) else { continue };
        let n = q.push_param(val.clone());
        where_parts.push(format!("{}.{} = {}", chain_alias(owner), quoted(col), c.placeholder(n)));
    }

    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    let order = match &scope {
        Some((s, _)) if !s.order_by.is_empty() => order_clause(&s.order_by, entity),
        _ => order_clause(&entity.order_by, entity),
    };
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n.min(MAX_LIMIT))).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_clause(entity),
        from_clause(entity),
        where_clause,
        order,
        limit_clause,
        offset_clause
    );
    q
}

/// INSERT one chain table. `id` is the root key for subtype rows; omitted for the root.
/// Columns absent from the body are left to the database default.
pub fn insert_row(table: &ResolvedTable, id: Option<&Value>, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    if let (Some(id), Some(pk)) = (id, table.column(&table.pk)) {
        let n = q.push_param(id.clone());
        cols.push(quoted(&pk.name));
        placeholders.push(pk.placeholder(n));
    }
    for c in table.data_columns() {
        let Some(v) = body.get(&c.name) else { continue };
        let n = q.push_param(v.clone());
        cols.push(quoted(&c.name));
        placeholders.push(c.placeholder(n));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", quoted(&table.name), quoted(&table.pk))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            quoted(&table.name),
            cols.join(", "),
            placeholders.join(", "),
            quoted(&table.pk)
        )
    };
    q
}

/// UPDATE one chain table by key: `col = COALESCE($n, col)` for each body column it owns.
/// None when the body touches no column of this table.
pub fn update_row(table: &ResolvedTable, id: &Value, body: &HashMap<String, Value>) -> Option<QueryBuf> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in table.data_columns() {
        let Some(v) = body.get(&c.name) else { continue };
        let n = q.push_param(v.clone());
        sets.push(format!("{} = COALESCE({}, {})", quoted(&c.name), c.placeholder(n), quoted(&c.name)));
    }
    if sets.is_empty() {
        return None;
    }
    let pk = table.column(&table.pk)?;
    let n = q.push_param(id.clone());
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quoted(&table.name),
        sets.join(", "),
        quoted(&pk.name),
        pk.placeholder(n)
    );
    Some(q)
}

/// DELETE one chain table row by key.
pub fn delete_row(table: &ResolvedTable, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone());
    let ph = table
        .column(&table.pk)
        .map(|c| c.placeholder(n))
        .unwrap_or_else(|| format!("${}::integer", n));
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quoted(&table.name), quoted(&table.pk), ph);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_embedded, resolve, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&load_embedded().unwrap()).unwrap()
    }

    fn body(v: Value) -> HashMap<String, Value> {
        v.as_object().unwrap().clone().into_iter().collect()
    }

    #[test]
    fn corporation_select_joins_whole_chain() {
        let m = model();
        let q = select_by_id(m.entity_by_path("corporation").unwrap(), &json!(5));
        assert!(q.sql.starts_with("SELECT t0.\"id\" AS \"id\", t1.\"name_en\" AS \"name_en\""));
        assert!(q.sql.contains("FROM \"party\" t0 JOIN \"organization\" t1 ON t1.\"id\" = t0.\"id\""));
        assert!(q.sql.contains("JOIN \"corporation\" t3 ON t3.\"id\" = t0.\"id\""));
        assert!(q.sql.ends_with("WHERE t0.\"id\" = $1::integer"));
        assert_eq!(q.params, vec![json!(5)]);
    }

    #[test]
    fn party_role_select_labels_party_kind() {
        let m = model();
        let q = select_list(m.entity_by_path("partyrole").unwrap(), &[], None, None, None);
        assert!(q.sql.contains(
            "CASE WHEN k0.\"id\" IS NOT NULL THEN 'person' WHEN k1.\"id\" IS NOT NULL THEN 'organization' END AS \"type\""
        ));
        assert!(q.sql.contains("LEFT JOIN \"role_type\" l2 ON l2.\"id\" = t0.\"role_type_id\""));
        assert!(q.sql.contains("l2.\"description\" AS \"role_type_description\""));
        assert!(q.sql.ends_with("ORDER BY t0.\"id\""));
    }

    #[test]
    fn scoped_list_filters_and_orders() {
        let m = model();
        let entity = m.entity_by_path("partyrole").unwrap();
        let scope = entity.scope("bypartyid").unwrap();
        let q = select_list(entity, &[], Some((scope, json!(9))), Some(5000), Some(10));
        assert!(q.sql.contains("WHERE t0.\"party_id\" = $1::integer"));
        assert!(q.sql.contains("ORDER BY t0.\"fromdate\" DESC, t0.\"id\" DESC"));
        assert!(q.sql.ends_with("LIMIT 1000 OFFSET 10"));
    }

    #[test]
    fn unknown_filters_are_ignored() {
        let m = model();
        let entity = m.entity_by_path("country").unwrap();
        let filters = vec![("isocode".to_string(), json!("TH")), ("nope".to_string(), json!(1))];
        let q = select_list(entity, &filters, None, None, None);
        assert!(q.sql.contains("WHERE t0.\"isocode\" = $1::text"));
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn root_insert_without_columns_uses_defaults() {
        let m = model();
        let party = &m.entity_by_path("corporation").unwrap().tables[0];
        let q = insert_row(party, None, &body(json!({"name_en": "Acme"})));
        assert_eq!(q.sql, "INSERT INTO \"party\" DEFAULT VALUES RETURNING \"id\"");
        assert!(q.params.is_empty());
    }

    #[test]
    fn subtype_insert_carries_root_key() {
        let m = model();
        let org = &m.entity_by_path("corporation").unwrap().tables[1];
        let q = insert_row(org, Some(&json!(3)), &body(json!({"name_en": "Acme", "name_th": null})));
        assert_eq!(
            q.sql,
            "INSERT INTO \"organization\" (\"id\", \"name_en\", \"name_th\") VALUES ($1::integer, $2::text, $3::text) RETURNING \"id\""
        );
    }

    #[test]
    fn update_coalesces_and_skips_foreign_tables() {
        let m = model();
        let corp = m.entity_by_path("corporation").unwrap();
        let b = body(json!({"federal_tax_id_number": "0105"}));
        assert!(update_row(&corp.tables[1], &json!(3), &b).is_none());
        let q = update_row(&corp.tables[2], &json!(3), &b).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"legal_organization\" SET \"federal_tax_id_number\" = COALESCE($1::text, \"federal_tax_id_number\") WHERE \"id\" = $2::integer"
        );
        assert_eq!(q.params, vec![json!("0105"), json!(3)]);
    }

    #[test]
    fn delete_targets_single_table() {
        let m = model();
        let country = m.entity_by_path("country").unwrap();
        let q = delete_row(country.root(), &json!(1));
        assert_eq!(q.sql, "DELETE FROM \"country\" WHERE \"id\" = $1::integer");
    }

    #[test]
    fn literals_escape_quotes() {
        assert_eq!(literal("o'brien"), "'o''brien'");
        assert_eq!(quoted("a\"b"), "\"a\"\"b\"");
    }
}
