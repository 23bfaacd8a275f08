//! Recursive document builder.

use crate::model::{Cardinality, ColumnSplit, Relationship, Row, Table, TablePivot};
use crate::transform::{apply_pivot_layouts, apply_split, PivotLayout};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::identity::{dedup_values, join_values_match, RowKey, VisitKey};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Row {index} out of range for table {table} ({len} rows)")]
    RowOutOfRange {
        table: String,
        index: usize,
        len: usize,
    },
    #[error("Relationship references unknown table: {0}")]
    UnknownTable(String),
    #[error("Relationship references unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },
}

impl BuildError {
    /// Lead table or lead row could not be resolved.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound(_) | Self::RowOutOfRange { .. })
    }
}

/// Per-build transform rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Table id -> columns to keep. Missing or empty keeps every column.
    #[serde(default)]
    pub columns_filter: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub splits: Vec<ColumnSplit>,
    #[serde(default)]
    pub pivots: Vec<TablePivot>,
    /// Reject relationships naming unknown tables or columns instead of
    /// skipping them.
    #[serde(default)]
    pub strict: bool,
}

/// How one relationship is walked from a given table.
struct JoinStep<'a> {
    rel: &'a Relationship,
    child: usize,
    local: &'a str,
    remote: &'a str,
    child_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Row(String),
    Element {
        array: String,
        index: usize,
        name: String,
    },
}

/// Mutable state owned by a single build.
#[derive(Default)]
struct BuildState {
    visited: HashSet<VisitKey>,
}

/// Immutable join context, reusable across any number of builds.
pub struct DocumentBuilder<'a> {
    tables: &'a [Table],
    relationships: Vec<&'a Relationship>,
    options: &'a BuildOptions,
    index: HashMap<&'a str, usize>,
    /// Relationship positions touching each table, in declaration order.
    edges: Vec<Vec<usize>>,
    layouts: Vec<Vec<PivotLayout<'a>>>,
    /// Property names joins may produce inside each table's objects.
    nested_names: Vec<HashSet<String>>,
    problems: Vec<BuildError>,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(
        tables: &'a [Table],
        relationships: &'a [Relationship],
        options: &'a BuildOptions,
    ) -> Self {
        let index: HashMap<&str, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();

        let mut problems = Vec::new();
        let relationships: Vec<&Relationship> = relationships
            .iter()
            .filter(|rel| {
                if rel.source_column.is_empty() || rel.target_column.is_empty() {
                    log::debug!(
                        "Skipping relationship {} -> {} without join columns",
                        rel.source_table_id,
                        rel.target_table_id
                    );
                    return false;
                }
                let mut usable = true;
                for (table_id, column) in [
                    (&rel.source_table_id, &rel.source_column),
                    (&rel.target_table_id, &rel.target_column),
                ] {
                    match index.get(table_id.as_str()) {
                        None => {
                            log::debug!("Skipping relationship with unknown table {}", table_id);
                            problems.push(BuildError::UnknownTable(table_id.clone()));
                            usable = false;
                        }
                        Some(&t) if !tables[t].has_column(column) => {
                            problems.push(BuildError::UnknownColumn {
                                table: table_id.clone(),
                                column: column.clone(),
                            });
                        }
                        Some(_) => {}
                    }
                }
                usable
            })
            .collect();

        let mut edges = vec![Vec::new(); tables.len()];
        let mut nested_names = vec![HashSet::new(); tables.len()];
        for (pos, rel) in relationships.iter().enumerate() {
            let source = index[rel.source_table_id.as_str()];
            let target = index[rel.target_table_id.as_str()];
            edges[source].push(pos);
            nested_names[source].insert(property_name(rel, &tables[target]));
            if target != source {
                edges[target].push(pos);
                nested_names[target].insert(property_name(rel, &tables[source]));
            }
        }

        let layouts = tables
            .iter()
            .map(|t| {
                options
                    .pivots
                    .iter()
                    .filter(|p| p.table_id == t.id)
                    .map(|p| PivotLayout::new(p, &t.columns))
                    .collect()
            })
            .collect();

        Self {
            tables,
            relationships,
            options,
            index,
            edges,
            layouts,
            nested_names,
            problems,
        }
    }

    pub fn tables(&self) -> &'a [Table] {
        self.tables
    }

    /// Relationship problems found at construction. Only fatal in strict mode.
    pub fn problems(&self) -> &[BuildError] {
        &self.problems
    }

    /// Build `{ <lead table name>: <nested lead row> }`.
    pub fn build_document(&self, lead_table_id: &str, lead_row_index: usize) -> Result<Value, BuildError> {
        self.check_strict()?;
        let lead = self.table_index(lead_table_id)?;
        let table = &self.tables[lead];
        let row = table.rows.get(lead_row_index).ok_or_else(|| BuildError::RowOutOfRange {
            table: table.id.clone(),
            index: lead_row_index,
            len: table.rows.len(),
        })?;
        Ok(self.wrap(lead, Some(lead_row_index), row))
    }

    /// Build a document for a row that need not be stored in the table.
    pub fn build_for_row(&self, table_id: &str, row: &Row) -> Result<Value, BuildError> {
        self.check_strict()?;
        let lead = self.table_index(table_id)?;
        Ok(self.wrap(lead, None, row))
    }

    fn check_strict(&self) -> Result<(), BuildError> {
        match self.problems.first() {
            Some(problem) if self.options.strict => Err(problem.clone()),
            _ => Ok(()),
        }
    }

    fn table_index(&self, table_id: &str) -> Result<usize, BuildError> {
        self.index
            .get(table_id)
            .copied()
            .ok_or_else(|| BuildError::TableNotFound(table_id.to_string()))
    }

    fn wrap(&self, lead: usize, row_index: Option<usize>, row: &Row) -> Value {
        let mut state = BuildState::default();
        let body = self.build_nested(&mut state, lead, row_index, row, None, 0);
        let mut doc = Map::new();
        doc.insert(self.tables[lead].name.clone(), Value::Object(body));
        Value::Object(doc)
    }

    fn build_nested(
        &self,
        state: &mut BuildState,
        table: usize,
        row_index: Option<usize>,
        row: &Row,
        parent: Option<usize>,
        depth: u32,
    ) -> Row {
        let key = VisitKey {
            table,
            row: RowKey::locate(&self.tables[table].rows, row_index, row),
            depth,
        };
        let mut projected = self.project(table, row);
        if !state.visited.insert(key) {
            return projected;
        }

        let mut embedded = HashSet::new();
        for &pos in &self.edges[table] {
            let Some(step) = self.resolve(self.relationships[pos], table, parent, depth) else {
                continue;
            };
            let name = property_name(step.rel, &self.tables[step.child]);

            match self.pivot_for_column(table, step.local) {
                Some((layout, group)) => {
                    self.join_pivot_elements(state, &mut projected, &mut embedded, table, row, &step, &name, layout, group);
                }
                None => {
                    let Some(value) = row.get(step.local) else {
                        continue;
                    };
                    let children = self.matching_children(state, table, &step, value);
                    if children.is_empty() {
                        continue;
                    }
                    let merge = !embedded.insert(Slot::Row(name.clone()));
                    attach(&mut projected, name, step.rel.cardinality, children, merge);
                }
            }
        }

        projected
    }

    /// Column filter, then split and pivot.
    fn project(&self, table: usize, row: &Row) -> Row {
        let table_id = self.tables[table].id.as_str();
        let filtered = match self.options.columns_filter.get(table_id) {
            Some(keep) if !keep.is_empty() => row
                .iter()
                .filter(|(k, _)| keep.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => row.clone(),
        };
        let split = apply_split(&filtered, &self.options.splits, table_id);
        apply_pivot_layouts(&split, &self.layouts[table])
    }

    fn column_visible(&self, table: usize, row: &Row, column: &str) -> bool {
        if !row.contains_key(column) {
            return false;
        }
        match self.options.columns_filter.get(&self.tables[table].id) {
            Some(keep) if !keep.is_empty() => keep.iter().any(|c| c == column),
            _ => true,
        }
    }

    fn resolve(
        &self,
        rel: &'a Relationship,
        table: usize,
        parent: Option<usize>,
        depth: u32,
    ) -> Option<JoinStep<'a>> {
        // Self edges walk from the referenced row to the rows pointing at it
        let (child_id, local, remote) = if rel.target_table_id == self.tables[table].id {
            (&rel.source_table_id, &rel.target_column, &rel.source_column)
        } else {
            (&rel.target_table_id, &rel.source_column, &rel.target_column)
        };
        let child = self.index[child_id.as_str()];

        let recursive = child == table || parent == Some(child);
        let child_depth = if recursive {
            match rel.max_depth {
                Some(max) if max > 0 && depth < max => depth + 1,
                _ => return None,
            }
        } else {
            0
        };

        Some(JoinStep {
            rel,
            child,
            local,
            remote,
            child_depth,
        })
    }

    fn pivot_for_column(&self, table: usize, column: &str) -> Option<(&PivotLayout<'a>, usize)> {
        self.layouts[table]
            .iter()
            .find_map(|layout| layout.locate(column).map(|(group, _)| (layout, group)))
    }

    /// Join each pivot element on its own source column value.
    #[allow(clippy::too_many_arguments)]
    fn join_pivot_elements(
        &self,
        state: &mut BuildState,
        projected: &mut Row,
        embedded: &mut HashSet<Slot>,
        table: usize,
        row: &Row,
        step: &JoinStep<'a>,
        name: &str,
        layout: &PivotLayout<'a>,
        group: usize,
    ) {
        let array = layout.pivot.array_name.as_str();
        let indices = layout.indices_where(|col| self.column_visible(table, row, col));
        let Some(Value::Array(items)) = projected.get_mut(array) else {
            return;
        };

        for (position, (item, index)) in items.iter_mut().zip(indices).enumerate() {
            let Some(value) = layout.column_at(group, index).and_then(|col| row.get(col)) else {
                continue;
            };
            let Value::Object(item) = item else {
                continue;
            };
            let children = self.matching_children(state, table, step, value);
            if children.is_empty() {
                continue;
            }
            let merge = !embedded.insert(Slot::Element {
                array: array.to_string(),
                index: position,
                name: name.to_string(),
            });
            attach(item, name.to_string(), step.rel.cardinality, children, merge);
        }
    }

    /// Build every child row whose remote column equals `value`, deduplicated.
    fn matching_children(
        &self,
        state: &mut BuildState,
        table: usize,
        step: &JoinStep<'a>,
        value: &Value,
    ) -> Vec<Value> {
        let mut children = Vec::new();
        for (i, child_row) in self.tables[step.child].rows.iter().enumerate() {
            if !child_row
                .get(step.remote)
                .is_some_and(|remote| join_values_match(remote, value))
            {
                continue;
            }
            let built = self.build_nested(state, step.child, Some(i), child_row, Some(table), step.child_depth);
            children.push(Value::Object(self.filter_included(step, built)));
        }
        dedup_values(children)
    }

    /// Keep declared columns plus anything a join nested into the child.
    fn filter_included(&self, step: &JoinStep<'a>, built: Row) -> Row {
        let Some(included) = &step.rel.included_columns else {
            return built;
        };
        let nested = &self.nested_names[step.child];
        built
            .into_iter()
            .filter(|(k, _)| included.contains(k) || nested.contains(k))
            .collect()
    }
}

fn property_name(rel: &Relationship, other: &Table) -> String {
    rel.output_property_name
        .clone()
        .unwrap_or_else(|| other.name.clone())
}

/// Attach join results under `name`. `merge` is set when an earlier
/// relationship already attached under the same name.
fn attach(target: &mut Row, name: String, cardinality: Cardinality, children: Vec<Value>, merge: bool) {
    match cardinality {
        Cardinality::OneToOne => {
            if merge {
                return;
            }
            if let Some(first) = children.into_iter().next() {
                target.insert(name, first);
            }
        }
        Cardinality::OneToMany => {
            let mut merged = Vec::new();
            if merge {
                match target.get_mut(&name).map(Value::take) {
                    Some(Value::Array(existing)) => merged = existing,
                    Some(Value::Null) | None => {}
                    Some(other) => merged.push(other),
                }
            }
            merged.extend(children);
            target.insert(name, Value::Array(dedup_values(merged)));
        }
    }
}
