//! SQL type classification and cell value conversion.

use super::Dialect;
use serde_json::{json, Number, Value};

/// Coarse value class of a SQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Time,
    Uuid,
    Json,
    Text,
}

/// Classify a raw SQL type such as `VARCHAR(255)` or `TINYINT(1)`.
pub fn classify(sql_type: &str, dialect: Dialect) -> TypeClass {
    let lower = sql_type.to_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();

    if base.ends_with("[]") {
        return TypeClass::Json;
    }
    if dialect == Dialect::MySQL && lower.starts_with("tinyint(1)") {
        return TypeClass::Boolean;
    }

    match base {
        "int" | "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "serial2" | "serial4" | "serial8" | "bigserial"
        | "smallserial" | "year" => TypeClass::Integer,
        "real" | "float" | "float4" | "float8" | "double" | "double precision" | "decimal"
        | "numeric" | "money" => TypeClass::Decimal,
        "bool" | "boolean" | "bit" => TypeClass::Boolean,
        "timestamp" | "timestamptz" | "datetime" | "datetime2" | "timestamp with time zone"
        | "timestamp without time zone" => TypeClass::Timestamp,
        "date" => TypeClass::Date,
        "time" | "timetz" => TypeClass::Time,
        "uuid" | "uniqueidentifier" => TypeClass::Uuid,
        "json" | "jsonb" => TypeClass::Json,
        _ => TypeClass::Text,
    }
}

/// Deterministic sample value for row `row` of `column`.
pub fn sample_value(class: TypeClass, column: &str, row: usize) -> Value {
    let n = row + 1;
    match class {
        TypeClass::Integer => json!(n),
        TypeClass::Decimal => json!(n as f64 * 10.5),
        TypeClass::Boolean => json!(row % 2 == 0),
        TypeClass::Timestamp => json!(format!("2024-01-{:02}T{:02}:00:00Z", row % 28 + 1, row % 24)),
        TypeClass::Date => json!(format!("2024-01-{:02}", row % 28 + 1)),
        TypeClass::Time => json!(format!("{:02}:{:02}:00", row % 24, row % 60)),
        TypeClass::Uuid => json!(format!("00000000-0000-4000-8000-{:012}", n)),
        TypeClass::Json => json!({ "seq": n }),
        TypeClass::Text => json!(format!("{} {}", column, n)),
    }
}

/// Number literal as JSON, integer when it fits.
pub fn number_value(literal: &str) -> Value {
    if let Ok(i) = literal.parse::<i64>() {
        return Value::Number(i.into());
    }
    literal
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(literal.to_string()))
}

/// Adjust a parsed literal to the column's class: 0/1 flags become
/// booleans and JSON columns hold parsed JSON when the text is valid.
pub fn coerce(class: TypeClass, value: Value) -> Value {
    match (class, value) {
        (TypeClass::Boolean, Value::Number(n)) if n.as_i64().is_some_and(|i| i == 0 || i == 1) => {
            Value::Bool(n.as_i64() == Some(1))
        }
        (TypeClass::Json, Value::String(s)) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        (_, value) => value,
    }
}
