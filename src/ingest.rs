//! JSON and JSON Lines ingestion into tables.

use crate::model::{Row, Table};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid JSON on line {line}: {source}")]
    Line {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Expected a JSON array of objects")]
    NotAnArray,
    #[error("Record {0} is not an object")]
    NotAnObject(usize),
}

/// Table from a JSON array of objects. A single object is one row.
pub fn table_from_json(id: &str, name: &str, text: &str) -> Result<Table, IngestError> {
    let records = match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => return Err(IngestError::NotAnArray),
    };
    let rows = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| match record {
            Value::Object(row) => Ok(row),
            _ => Err(IngestError::NotAnObject(i)),
        })
        .collect::<Result<Vec<Row>, _>>()?;
    Ok(build_table(id, name, rows))
}

/// Table from newline-delimited JSON objects; blank lines are ignored.
pub fn table_from_jsonl(id: &str, name: &str, text: &str) -> Result<Table, IngestError> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(row)) => rows.push(row),
            Ok(_) => return Err(IngestError::NotAnObject(i + 1)),
            Err(source) => return Err(IngestError::Line { line: i + 1, source }),
        }
    }
    Ok(build_table(id, name, rows))
}

/// Columns are the union of row keys in first-seen order.
fn build_table(id: &str, name: &str, rows: Vec<Row>) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    log::debug!("Ingested table {} with {} rows, {} columns", id, rows.len(), columns.len());
    Table::new(id, name, columns).with_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_array() {
        let table = table_from_json("t", "Things", r#"[{"id": 1, "a": "x"}, {"id": 2, "b": true}]"#).unwrap();

        assert_eq!(table.columns, vec!["id", "a", "b"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1]["b"], json!(true));
        assert_eq!(table.name, "Things");
    }

    #[test]
    fn test_json_single_object() {
        let table = table_from_json("t", "t", r#"{"id": 1}"#).unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_json_rejects_scalars() {
        assert!(matches!(table_from_json("t", "t", "[1, 2]"), Err(IngestError::NotAnObject(0))));
        assert!(matches!(table_from_json("t", "t", "42"), Err(IngestError::NotAnArray)));
    }

    #[test]
    fn test_jsonl() {
        let text = "{\"id\": 1}\n\n{\"id\": 2, \"tags\": [\"a\"]}\n";
        let table = table_from_jsonl("t", "t", text).unwrap();

        assert_eq!(table.columns, vec!["id", "tags"]);
        assert_eq!(table.rows[1]["tags"], json!(["a"]));
    }

    #[test]
    fn test_jsonl_reports_line() {
        let err = table_from_jsonl("t", "t", "{\"id\": 1}\n{oops").unwrap_err();
        assert!(matches!(err, IngestError::Line { line: 2, .. }));
    }
}
