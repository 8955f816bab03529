//! PgRow to JSON, driven by the column's reported type.

use serde_json::{Map, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

pub fn row_to_json(row: &PgRow) -> Value {
    let mut map = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, i, col.type_info().name()));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "INT2" => row.try_get::<Option<i16>, _>(i).map(|v| v.map(Value::from)),
        "INT4" => row.try_get::<Option<i32>, _>(i).map(|v| v.map(Value::from)),
        "INT8" => row.try_get::<Option<i64>, _>(i).map(|v| v.map(Value::from)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(i)
            .map(|v| v.and_then(|n| Number::from_f64(n as f64)).map(Value::Number)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(i)
            .map(|v| v.and_then(Number::from_f64).map(Value::Number)),
        "BOOL" => row.try_get::<Option<bool>, _>(i).map(|v| v.map(Value::Bool)),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(i)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(i)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)
            .map(|v| v.map(|d| Value::String(d.to_rfc3339()))),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i),
        _ => row.try_get::<Option<String>, _>(i).map(|v| v.map(Value::String)),
    };
    match decoded {
        Ok(v) => v.unwrap_or(Value::Null),
        Err(e) => {
            tracing::warn!(column = i, type_name, error = %e, "undecodable column");
            Value::Null
        }
    }
}
