//! Conversion of canvas edge records into engine relationships.

use crate::model::{Cardinality, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-edge settings a user can attach to a drawn connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
}

impl EdgeOverride {
    /// Fields set on `other` win.
    fn merged(&self, other: Option<&EdgeOverride>) -> EdgeOverride {
        let Some(other) = other else {
            return self.clone();
        };
        EdgeOverride {
            cardinality: other.cardinality.or(self.cardinality),
            included_columns: other
                .included_columns
                .clone()
                .or_else(|| self.included_columns.clone()),
            max_depth: other.max_depth.or(self.max_depth),
            property_name: other
                .property_name
                .clone()
                .or_else(|| self.property_name.clone()),
        }
    }
}

/// A connection between two column handles as drawn on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
    #[serde(flatten)]
    pub inline: EdgeOverride,
}

impl EdgeRecord {
    pub fn new(source: &str, source_handle: &str, target: &str, target_handle: &str) -> Self {
        Self {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            source_handle: Some(source_handle.to_string()),
            target_handle: Some(target_handle.to_string()),
            inline: EdgeOverride::default(),
        }
    }

    /// Key used to look up overrides: the explicit id, else the endpoints.
    pub fn key(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!(
                "{}.{}->{}.{}",
                self.source,
                self.source_handle.as_deref().unwrap_or(""),
                self.target,
                self.target_handle.as_deref().unwrap_or("")
            ),
        }
    }

    pub fn to_relationship(&self, overrides: Option<&EdgeOverride>) -> Option<Relationship> {
        let source_column = non_empty(self.source_handle.as_deref())?;
        let target_column = non_empty(self.target_handle.as_deref())?;
        if self.source.is_empty() || self.target.is_empty() {
            return None;
        }

        let settings = self.inline.merged(overrides);
        Some(Relationship {
            source_table_id: self.source.clone(),
            target_table_id: self.target.clone(),
            source_column: source_column.to_string(),
            target_column: target_column.to_string(),
            cardinality: settings.cardinality.unwrap_or_default(),
            included_columns: settings.included_columns,
            max_depth: settings.max_depth,
            output_property_name: settings.property_name.filter(|n| !n.is_empty()),
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Normalize edges, dropping any that lack a join column on either side.
pub fn normalize_edges(
    edges: &[EdgeRecord],
    overrides: &HashMap<String, EdgeOverride>,
) -> Vec<Relationship> {
    edges
        .iter()
        .filter_map(|edge| {
            let rel = edge.to_relationship(overrides.get(&edge.key()));
            if rel.is_none() {
                log::debug!("Dropping edge {} without join columns", edge.key());
            }
            rel
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic_edge() {
        let edges = vec![EdgeRecord::new("A", "b_id", "B", "id")];
        let rels = normalize_edges(&edges, &HashMap::new());

        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0], Relationship::new("A", "b_id", "B", "id"));
    }

    #[test]
    fn test_drops_edges_without_handles() {
        let mut missing = EdgeRecord::new("A", "b_id", "B", "id");
        missing.target_handle = None;
        let mut empty = EdgeRecord::new("A", "", "B", "id");
        empty.id = Some("e2".into());

        let rels = normalize_edges(&[missing, empty], &HashMap::new());
        assert!(rels.is_empty());
    }

    #[test]
    fn test_override_wins_over_inline() {
        let mut edge = EdgeRecord::new("E", "manager_id", "E", "id");
        edge.id = Some("e1".into());
        edge.inline.max_depth = Some(1);
        edge.inline.property_name = Some("Reports".into());

        let mut overrides = HashMap::new();
        overrides.insert(
            "e1".to_string(),
            EdgeOverride {
                cardinality: Some(Cardinality::OneToOne),
                max_depth: Some(3),
                ..Default::default()
            },
        );

        let rels = normalize_edges(&[edge], &overrides);
        assert_eq!(rels[0].cardinality, Cardinality::OneToOne);
        assert_eq!(rels[0].max_depth, Some(3));
        assert_eq!(rels[0].output_property_name, Some("Reports".into()));
    }

    #[test]
    fn test_deserialize_canvas_edge() {
        let edge: EdgeRecord = serde_json::from_str(
            r#"{"source":"A","target":"B","sourceHandle":"b_id","targetHandle":"id",
                "cardinality":"one-to-one","includedColumns":["val"]}"#,
        )
        .unwrap();
        let rel = edge.to_relationship(None).unwrap();

        assert_eq!(rel.cardinality, Cardinality::OneToOne);
        assert_eq!(rel.included_columns, Some(vec!["val".to_string()]));
        assert_eq!(edge.key(), "A.b_id->B.id");
    }
}
