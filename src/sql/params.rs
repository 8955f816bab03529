//! Convert serde_json::Value to types that sqlx can bind.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgArguments, PgTypeInfo, Postgres};
use sqlx::query::Query;
use sqlx::Database;

/// A value that can be bound to a PostgreSQL query. Converts from serde_json::Value.
///
/// Every variant goes over the wire as TEXT and every placeholder is cast to its column
/// type (`$1::double precision`), so the server parses the value. Prepared statements are
/// cached per SQL text; a fixed parameter type keeps that cache valid whatever JSON type
/// the client sends for a column.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Json(Value),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => PgBindValue::Number(n.to_string()),
            Value::String(s) => PgBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }

    /// Text form the server casts to the column type. None for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            PgBindValue::Null => None,
            PgBindValue::Bool(b) => Some(b.to_string()),
            PgBindValue::Number(n) | PgBindValue::String(n) => Some(n.clone()),
            PgBindValue::Json(v) => Some(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self.as_text() {
            None => Ok(IsNull::Yes),
            Some(text) => <&str as Encode<Postgres>>::encode_by_ref(&text.as_str(), buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(PgTypeInfo::with_name("TEXT"))
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// Bind every param of a built statement in order.
pub fn bind_all<'q>(sql: &'q str, params: &[Value]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |q, p| q.bind(PgBindValue::from_json(p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_keep_their_json_text() {
        assert_eq!(PgBindValue::from_json(&json!(7)).as_text().as_deref(), Some("7"));
        assert_eq!(PgBindValue::from_json(&json!(172.5)).as_text().as_deref(), Some("172.5"));
        assert_eq!(PgBindValue::from_json(&json!(-3)).as_text().as_deref(), Some("-3"));
    }

    #[test]
    fn scalars_and_documents_render_as_postgres_input() {
        assert_eq!(PgBindValue::from_json(&json!(true)).as_text().as_deref(), Some("true"));
        assert_eq!(PgBindValue::from_json(&json!("2024-01-31")).as_text().as_deref(), Some("2024-01-31"));
        assert_eq!(PgBindValue::from_json(&json!({"a": 1})).as_text().as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(PgBindValue::from_json(&Value::Null).as_text(), None);
    }

    #[test]
    fn wire_type_is_the_same_for_every_value() {
        let name = |v: &Value| PgBindValue::from_json(v).produces().map(|t| t.to_string());
        let expected = Some("TEXT".to_string());
        for v in [json!(170), json!(172.5), Value::Null, json!(false), json!("x"), json!([1])] {
            assert_eq!(name(&v), expected, "{v}");
        }
    }
}
