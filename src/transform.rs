//! Per-row column transforms: string splitting and pivoting of repeated columns.

use crate::model::{ColumnSplit, Row, TablePivot};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Split delimited string cells into arrays of trimmed pieces. An empty
/// delimiter yields one piece per character.
pub fn apply_split(row: &Row, splits: &[ColumnSplit], table_id: &str) -> Row {
    let mut out = row.clone();
    for split in splits.iter().filter(|s| s.table_id == table_id) {
        if let Some(Value::String(s)) = out.get(&split.column) {
            let raw: Vec<&str> = if split.delimiter.is_empty() {
                s.char_indices().map(|(i, c)| &s[i..i + c.len_utf8()]).collect()
            } else {
                s.split(split.delimiter.as_str()).collect()
            };
            let pieces: Vec<Value> = raw
                .into_iter()
                .map(|piece| Value::String(piece.trim().to_string()))
                .collect();
            out.insert(split.column.clone(), Value::Array(pieces));
        }
    }
    out
}

/// Collapse suffix-indexed column groups into arrays of small objects.
pub fn apply_pivot(row: &Row, pivots: &[TablePivot], table_id: &str, all_columns: &[String]) -> Row {
    let layouts: Vec<PivotLayout> = pivots
        .iter()
        .filter(|p| p.table_id == table_id)
        .map(|p| PivotLayout::new(p, all_columns))
        .collect();
    apply_pivot_layouts(row, &layouts)
}

/// Pivot with layouts computed ahead of time, applied in order.
pub fn apply_pivot_layouts(row: &Row, layouts: &[PivotLayout]) -> Row {
    let mut out = row.clone();
    for layout in layouts {
        let items: Vec<Value> = layout
            .element_indices(&out)
            .into_iter()
            .map(|index| Value::Object(layout.element(&out, index)))
            .collect();

        for column in layout.consumed_columns() {
            out.shift_remove(column);
        }
        out.insert(layout.pivot.array_name.clone(), Value::Array(items));
    }
    out
}

/// Split first, then pivot.
pub fn apply_transforms(
    row: &Row,
    splits: &[ColumnSplit],
    pivots: &[TablePivot],
    table_id: &str,
    all_columns: &[String],
) -> Row {
    apply_pivot(&apply_split(row, splits, table_id), pivots, table_id, all_columns)
}

/// Column matching for one pivot against a table's declared columns.
#[derive(Debug, Clone)]
pub struct PivotLayout<'a> {
    pub pivot: &'a TablePivot,
    /// Union of indices across all groups, sorted.
    pub indices: Vec<String>,
    /// Per group: index -> source column.
    columns: Vec<HashMap<String, String>>,
}

impl<'a> PivotLayout<'a> {
    pub fn new(pivot: &'a TablePivot, all_columns: &[String]) -> Self {
        let mut union = BTreeSet::new();
        let columns: Vec<HashMap<String, String>> = pivot
            .groups
            .iter()
            .map(|group| {
                all_columns
                    .iter()
                    .filter_map(|col| {
                        // A column named exactly like the prefix has the empty index
                        let index = col.strip_prefix(group.column_prefix.as_str())?;
                        union.insert(index.to_string());
                        Some((index.to_string(), col.clone()))
                    })
                    .collect()
            })
            .collect();

        let mut indices: Vec<String> = union.into_iter().collect();
        sort_indices(&mut indices);

        Self {
            pivot,
            indices,
            columns,
        }
    }

    /// Source column of `group` at `index`, if the group has one.
    pub fn column_at(&self, group: usize, index: &str) -> Option<&str> {
        self.columns.get(group)?.get(index).map(|c| c.as_str())
    }

    /// Group owning `column`, along with the column's index.
    pub fn locate(&self, column: &str) -> Option<(usize, &str)> {
        self.columns.iter().enumerate().find_map(|(group, map)| {
            map.iter()
                .find(|(_, col)| col.as_str() == column)
                .map(|(index, _)| (group, index.as_str()))
        })
    }

    pub fn consumed_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .flat_map(|map| map.values().map(|c| c.as_str()))
    }

    /// Indices that yield an array element for this row, in element order.
    pub fn element_indices(&self, row: &Row) -> Vec<&str> {
        self.indices_where(|col| row.contains_key(col))
    }

    /// Indices where at least one group column satisfies `present`.
    pub fn indices_where(&self, present: impl Fn(&str) -> bool) -> Vec<&str> {
        self.indices
            .iter()
            .filter(|index| {
                (0..self.columns.len())
                    .any(|group| self.column_at(group, index).is_some_and(&present))
            })
            .map(|index| index.as_str())
            .collect()
    }

    fn element(&self, row: &Row, index: &str) -> Map<String, Value> {
        let mut item = Map::new();
        for (group_idx, group) in self.pivot.groups.iter().enumerate() {
            if let Some(value) = self.column_at(group_idx, index).and_then(|col| row.get(col)) {
                item.insert(group.output_property_name.clone(), value.clone());
            }
        }
        item
    }
}

/// Numeric order when every index is a number, otherwise lexicographic.
fn sort_indices(indices: &mut [String]) {
    if indices.iter().all(|i| i.parse::<f64>().is_ok()) {
        indices.sort_by(|a, b| {
            let x: f64 = a.parse().unwrap_or_default();
            let y: f64 = b.parse().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        });
    } else {
        indices.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PivotGroup;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn item_fact_pivot(table_id: &str) -> TablePivot {
        TablePivot {
            table_id: table_id.into(),
            array_name: "Items".into(),
            groups: vec![
                PivotGroup {
                    column_prefix: "Item".into(),
                    output_property_name: "Item".into(),
                },
                PivotGroup {
                    column_prefix: "Fact".into(),
                    output_property_name: "Fact".into(),
                },
            ],
        }
    }

    #[test]
    fn test_split_trims_pieces() {
        let splits = vec![ColumnSplit {
            table_id: "t".into(),
            column: "colors".into(),
            delimiter: ",".into(),
        }];
        let input = row(json!({"colors": "red, green, blue", "n": 3}));
        let out = apply_split(&input, &splits, "t");

        assert_eq!(out["colors"], json!(["red", "green", "blue"]));
        assert_eq!(out["n"], json!(3));
        // input untouched
        assert_eq!(input["colors"], json!("red, green, blue"));
    }

    #[test]
    fn test_split_empty_delimiter_per_character() {
        let splits = vec![ColumnSplit {
            table_id: "t".into(),
            column: "v".into(),
            delimiter: String::new(),
        }];
        let out = apply_split(&row(json!({"v": "ab\u{e9}"})), &splits, "t");
        assert_eq!(out["v"], json!(["a", "b", "\u{e9}"]));

        let empty = apply_split(&row(json!({"v": ""})), &splits, "t");
        assert_eq!(empty["v"], json!([]));
    }

    #[test]
    fn test_split_passes_non_strings() {
        let splits = vec![ColumnSplit {
            table_id: "t".into(),
            column: "v".into(),
            delimiter: ";".into(),
        }];
        for value in [json!(42), json!(null), json!(["a;b"])] {
            let out = apply_split(&row(json!({ "v": value.clone() })), &splits, "t");
            assert_eq!(out["v"], value);
        }
    }

    #[test]
    fn test_split_scoped_by_table() {
        let splits = vec![ColumnSplit {
            table_id: "other".into(),
            column: "tags".into(),
            delimiter: ",".into(),
        }];
        let out = apply_split(&row(json!({"tags": "a,b"})), &splits, "t");
        assert_eq!(out["tags"], json!("a,b"));
    }

    #[test]
    fn test_pivot_grouping() {
        let columns = cols(&["Id", "Item1", "Fact1", "Item2", "Fact2"]);
        let input = row(json!({"Id": 1, "Item1": 10, "Fact1": "Yes", "Item2": 12, "Fact2": "No"}));
        let out = apply_pivot(&input, &[item_fact_pivot("t")], "t", &columns);

        assert_eq!(
            Value::Object(out),
            json!({"Id": 1, "Items": [{"Item": 10, "Fact": "Yes"}, {"Item": 12, "Fact": "No"}]})
        );
    }

    #[test]
    fn test_pivot_numeric_order() {
        let columns = cols(&["Item10", "Item2", "Item1"]);
        let input = row(json!({"Item10": "c", "Item2": "b", "Item1": "a"}));
        let out = apply_pivot(&input, &[item_fact_pivot("t")], "t", &columns);

        assert_eq!(out["Items"], json!([{"Item": "a"}, {"Item": "b"}, {"Item": "c"}]));
    }

    #[test]
    fn test_pivot_lexicographic_when_mixed() {
        let columns = cols(&["ItemB", "Item2", "ItemA"]);
        let pivot = item_fact_pivot("t");
        let layout = PivotLayout::new(&pivot, &columns);
        assert_eq!(layout.indices, vec!["2", "A", "B"]);
    }

    #[test]
    fn test_pivot_skips_sparse_indices() {
        let columns = cols(&["Id", "Item1", "Fact1", "Item2", "Fact2"]);
        let input = row(json!({"Id": 1, "Item1": 10, "Fact2": "No"}));
        let out = apply_pivot(&input, &[item_fact_pivot("t")], "t", &columns);
        assert_eq!(out["Items"], json!([{"Item": 10}, {"Fact": "No"}]));

        let empty = apply_pivot(&row(json!({"Id": 2})), &[item_fact_pivot("t")], "t", &columns);
        assert_eq!(Value::Object(empty), json!({"Id": 2, "Items": []}));
    }

    #[test]
    fn test_pivot_consumes_bare_prefix_column() {
        let columns = cols(&["Item", "Item1"]);
        let input = row(json!({"Item": 5, "Item1": 10}));
        let out = apply_pivot(&input, &[item_fact_pivot("t")], "t", &columns);

        // "" does not parse as a number, so indices sort lexicographically
        assert_eq!(Value::Object(out), json!({"Items": [{"Item": 5}, {"Item": 10}]}));
    }

    #[test]
    fn test_multiple_pivots_apply_in_order() {
        let columns = cols(&["Id", "Item1", "Item2", "Tag1", "Tag2"]);
        let tags = TablePivot {
            table_id: "t".into(),
            array_name: "Tags".into(),
            groups: vec![PivotGroup {
                column_prefix: "Tag".into(),
                output_property_name: "Tag".into(),
            }],
        };
        let input = row(json!({"Id": 1, "Item1": 10, "Item2": 12, "Tag1": "x", "Tag2": "y"}));
        let out = apply_pivot(&input, &[item_fact_pivot("t"), tags], "t", &columns);

        assert_eq!(
            Value::Object(out.clone()),
            json!({
                "Id": 1,
                "Items": [{"Item": 10}, {"Item": 12}],
                "Tags": [{"Tag": "x"}, {"Tag": "y"}]
            })
        );
        let keys: Vec<&str> = out.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Id", "Items", "Tags"]);
    }

    #[test]
    fn test_pivot_scoped_by_table() {
        let columns = cols(&["Item1"]);
        let input = row(json!({"Item1": 10}));
        let out = apply_pivot(&input, &[item_fact_pivot("other")], "t", &columns);
        assert_eq!(out, input);
    }

    #[test]
    fn test_transforms_split_before_pivot() {
        let columns = cols(&["Item1", "Item2"]);
        let splits = vec![ColumnSplit {
            table_id: "t".into(),
            column: "Item1".into(),
            delimiter: "|".into(),
        }];
        let input = row(json!({"Item1": "a | b", "Item2": "c"}));
        let out = apply_transforms(&input, &splits, &[item_fact_pivot("t")], "t", &columns);
        assert_eq!(out["Items"], json!([{"Item": ["a", "b"]}, {"Item": "c"}]));
    }

    #[test]
    fn test_layout_locate() {
        let columns = cols(&["Id", "Item1", "Fact1", "Item2"]);
        let pivot = item_fact_pivot("t");
        let layout = PivotLayout::new(&pivot, &columns);

        assert_eq!(layout.locate("Fact1"), Some((1, "1")));
        assert_eq!(layout.locate("Id"), None);
        assert_eq!(layout.column_at(0, "2"), Some("Item2"));
        assert_eq!(layout.column_at(1, "2"), None);
    }
}
