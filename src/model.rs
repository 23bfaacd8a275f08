use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record. Keys are column names; the table's column list is
/// advisory, so rows may carry missing or extra keys.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    /// Display name, also the key the table is embedded under.
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Eligible as the starting point of a standalone document.
    #[serde(default)]
    pub root: bool,
}

impl Table {
    pub fn new(id: impl Into<String>, name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            columns,
            rows: Vec::new(),
            root: false,
        }
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    #[default]
    OneToMany,
    OneToOne,
}

/// Normalized join between two tables on a single column pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub source_table_id: String,
    pub target_table_id: String,
    pub source_column: String,
    pub target_column: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Child-side projection applied to each embedded object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_columns: Option<Vec<String>>,
    /// Recursion bound for self edges and edges back to the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_property_name: Option<String>,
}

impl Relationship {
    pub fn new(
        source_table_id: impl Into<String>,
        source_column: impl Into<String>,
        target_table_id: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            source_table_id: source_table_id.into(),
            target_table_id: target_table_id.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
            cardinality: Cardinality::OneToMany,
            included_columns: None,
            max_depth: None,
            output_property_name: None,
        }
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn included_columns(mut self, columns: Vec<String>) -> Self {
        self.included_columns = Some(columns);
        self
    }

    pub fn output_property_name(mut self, name: impl Into<String>) -> Self {
        self.output_property_name = Some(name.into());
        self
    }

    pub fn is_self_referencing(&self) -> bool {
        self.source_table_id == self.target_table_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSplit {
    pub table_id: String,
    pub column: String,
    pub delimiter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotGroup {
    pub column_prefix: String,
    pub output_property_name: String,
}

/// Collapses suffix-numbered columns (`Item1`, `Item2`, ...) into one array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePivot {
    pub table_id: String,
    pub array_name: String,
    pub groups: Vec<PivotGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_serde_defaults() {
        let rel: Relationship = serde_json::from_str(
            r#"{"sourceTableId":"A","targetTableId":"B","sourceColumn":"b_id","targetColumn":"id"}"#,
        )
        .unwrap();
        assert_eq!(rel.cardinality, Cardinality::OneToMany);
        assert_eq!(rel.max_depth, None);
        assert!(!rel.is_self_referencing());
    }

    #[test]
    fn test_cardinality_wire_names() {
        let json = serde_json::to_string(&Cardinality::OneToOne).unwrap();
        assert_eq!(json, "\"one-to-one\"");
        let parsed: Cardinality = serde_json::from_str("\"one-to-many\"").unwrap();
        assert_eq!(parsed, Cardinality::OneToMany);
        assert!(serde_json::from_str::<Cardinality>("\"many\"").is_err());
    }

    #[test]
    fn test_table_root_defaults_false() {
        let table: Table =
            serde_json::from_str(r#"{"id":"t","name":"T","columns":["id"]}"#).unwrap();
        assert!(!table.root);
        assert!(table.rows.is_empty());
        assert!(table.has_column("id"));
    }
}
