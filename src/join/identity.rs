//! Row identity and structural deduplication.

use crate::model::Row;
use serde_json::Value;
use std::collections::HashSet;

/// Identity of a row within its owning table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    /// Position in the table's row sequence.
    Index(usize),
    /// Compact JSON of the row, for rows not stored in the table.
    Structural(String),
}

impl RowKey {
    /// Positional key when `index` points at `row` in `rows`, else a
    /// positional lookup by value, else the structural key.
    pub fn locate(rows: &[Row], index: Option<usize>, row: &Row) -> Self {
        if let Some(i) = index {
            if rows.get(i).is_some_and(|stored| stored == row) {
                return Self::Index(i);
            }
        }
        match rows.iter().position(|stored| stored == row) {
            Some(i) => Self::Index(i),
            None => Self::Structural(row_key(row)),
        }
    }
}

/// Visited-set entry. The same row may recur at a different depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitKey {
    pub table: usize,
    pub row: RowKey,
    pub depth: u32,
}

pub fn structural_key(value: &Value) -> String {
    value.to_string()
}

pub fn row_key(row: &Row) -> String {
    // Map's Display is not available; go through serde
    serde_json::to_string(row).unwrap_or_default()
}

/// Remove structurally equal entries, keeping first occurrences in order.
pub fn dedup_values(values: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::with_capacity(values.len());
    values
        .into_iter()
        .filter(|v| seen.insert(structural_key(v)))
        .collect()
}

/// Join-key comparison. Integers compare exactly, a float against any number
/// compares as f64. Arrays and objects never match since they carry no
/// scalar identity.
pub fn join_values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            x.as_f64().zip(y.as_f64()).is_some_and(|(x, y)| x == y)
        }
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_locate_prefers_index() {
        let rows = vec![row(json!({"id": 1})), row(json!({"id": 1}))];
        assert_eq!(RowKey::locate(&rows, Some(1), &rows[1]), RowKey::Index(1));
        assert_eq!(RowKey::locate(&rows, None, &rows[1]), RowKey::Index(0));
    }

    #[test]
    fn test_locate_falls_back_to_structural() {
        let rows = vec![row(json!({"id": 1}))];
        let synthetic = row(json!({"id": 2}));
        assert_eq!(
            RowKey::locate(&rows, Some(0), &synthetic),
            RowKey::Structural(r#"{"id":2}"#.to_string())
        );
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let values = vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 1}), json!(3)];
        assert_eq!(dedup_values(values), vec![json!({"a": 1}), json!({"a": 2}), json!(3)]);
    }

    #[test]
    fn test_join_values_match() {
        assert!(join_values_match(&json!(10), &json!(10.0)));
        assert!(join_values_match(&json!("x"), &json!("x")));
        assert!(join_values_match(&json!(null), &json!(null)));
        assert!(!join_values_match(&json!("10"), &json!(10)));
        assert!(!join_values_match(&json!([1]), &json!([1])));
    }

    #[test]
    fn test_large_integer_keys_compare_exactly() {
        let a = json!(9_007_199_254_740_993_u64);
        let b = json!(9_007_199_254_740_992_u64);
        assert!(!join_values_match(&a, &b));
        assert!(join_values_match(&a, &json!(9_007_199_254_740_993_u64)));
        assert!(!join_values_match(&json!(i64::MIN), &json!(u64::MAX)));
    }
}
