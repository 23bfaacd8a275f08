//! Saved project state: tables, canvas edges and transform rules.

use crate::join::BuildOptions;
use crate::model::{ColumnSplit, Relationship, Table, TablePivot};
use crate::normalize::{normalize_edges, EdgeOverride, EdgeRecord};
use crate::sql::SqlSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Failed to read project {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to write project {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid project file: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Table already exists: {0}")]
    DuplicateTable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    /// Edge key -> user settings, see [`EdgeRecord::key`].
    #[serde(default)]
    pub edge_overrides: HashMap<String, EdgeOverride>,
    #[serde(default)]
    pub splits: Vec<ColumnSplit>,
    #[serde(default)]
    pub pivots: Vec<TablePivot>,
    #[serde(default)]
    pub columns_filter: HashMap<String, Vec<String>>,
}

impl Project {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ProjectError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ProjectError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| ProjectError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Project seeded from an imported schema; each foreign key becomes an edge.
    pub fn from_schema(schema: SqlSchema) -> Self {
        let edges = schema
            .relationships
            .iter()
            .map(|rel| {
                EdgeRecord::new(
                    &rel.source_table_id,
                    &rel.source_column,
                    &rel.target_table_id,
                    &rel.target_column,
                )
            })
            .collect();
        Self {
            tables: schema.tables,
            edges,
            ..Default::default()
        }
    }

    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn add_table(&mut self, table: Table) -> Result<(), ProjectError> {
        if self.table(&table.id).is_some() {
            return Err(ProjectError::DuplicateTable(table.id));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Remove a table along with every edge and rule that refers to it.
    pub fn remove_table(&mut self, id: &str) -> Option<Table> {
        let pos = self.tables.iter().position(|t| t.id == id)?;
        let removed = self.tables.remove(pos);

        let (kept, dropped): (Vec<EdgeRecord>, Vec<EdgeRecord>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| e.source != id && e.target != id);
        for edge in &dropped {
            self.edge_overrides.remove(&edge.key());
        }
        self.edges = kept;
        self.splits.retain(|s| s.table_id != id);
        self.pivots.retain(|p| p.table_id != id);
        self.columns_filter.remove(id);

        log::debug!("Removed table {} and {} dependent edges", id, dropped.len());
        Some(removed)
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        normalize_edges(&self.edges, &self.edge_overrides)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            columns_filter: self.columns_filter.clone(),
            splits: self.splits.clone(),
            pivots: self.pivots.clone(),
            strict: false,
        }
    }
}
