//! Bulk export: one JSON file per row of each document-root table.

use crate::join::DocumentBuilder;
use crate::model::Table;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unknown root table: {0}")]
    UnknownTable(String),
    #[error("No document-root tables to export")]
    NoRootTables,
    #[error("Failed to create {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to start export workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub out_dir: PathBuf,
    /// Tables to export; empty means every table flagged as a root.
    pub root_tables: Vec<String>,
    pub pretty: bool,
    /// Worker count; `None` uses one per core.
    pub threads: Option<usize>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("export"),
            root_tables: Vec::new(),
            pretty: true,
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub written: usize,
    pub failed: usize,
    /// Rows not attempted because the export was cancelled.
    pub skipped: usize,
}

enum Outcome {
    Written,
    Failed,
    Skipped,
}

/// Export every row of the root tables. Row failures are logged and counted;
/// `cancel` is checked before each document.
pub fn export_documents(
    builder: &DocumentBuilder,
    config: &ExportConfig,
    cancel: &AtomicBool,
) -> Result<ExportReport, ExportError> {
    let roots = resolve_roots(builder.tables(), &config.root_tables)?;

    let mut jobs: Vec<(&Table, usize, PathBuf)> = Vec::new();
    for table in roots {
        let dir = config.out_dir.join(file_stem(&table.name));
        fs::create_dir_all(&dir).map_err(|source| ExportError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;
        jobs.extend((0..table.rows.len()).map(|i| (table, i, dir.clone())));
    }
    log::info!("Exporting {} documents to {}", jobs.len(), config.out_dir.display());

    let mut pool = ThreadPoolBuilder::new();
    if let Some(threads) = config.threads {
        pool = pool.num_threads(threads);
    }
    let pool = pool.build()?;

    let outcomes: Vec<Outcome> = pool.install(|| {
        jobs.par_iter()
            .map(|(table, index, dir)| {
                if cancel.load(Ordering::Relaxed) {
                    return Outcome::Skipped;
                }
                export_one(builder, table, *index, dir, config.pretty)
            })
            .collect()
    });

    let mut report = ExportReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Written => report.written += 1,
            Outcome::Failed => report.failed += 1,
            Outcome::Skipped => report.skipped += 1,
        }
    }
    log::info!(
        "Export finished: {} written, {} failed, {} skipped",
        report.written,
        report.failed,
        report.skipped
    );
    Ok(report)
}

fn resolve_roots<'a>(tables: &'a [Table], requested: &[String]) -> Result<Vec<&'a Table>, ExportError> {
    let roots: Vec<&Table> = if requested.is_empty() {
        tables.iter().filter(|t| t.root).collect()
    } else {
        requested
            .iter()
            .map(|id| {
                tables
                    .iter()
                    .find(|t| &t.id == id)
                    .ok_or_else(|| ExportError::UnknownTable(id.clone()))
            })
            .collect::<Result<_, _>>()?
    };
    if roots.is_empty() {
        return Err(ExportError::NoRootTables);
    }
    Ok(roots)
}

fn export_one(builder: &DocumentBuilder, table: &Table, index: usize, dir: &Path, pretty: bool) -> Outcome {
    let doc = match builder.build_document(&table.id, index) {
        Ok(doc) => doc,
        Err(e) if e.is_not_found() => {
            log::warn!("Skipping {} row {}: {}", table.id, index, e);
            return Outcome::Failed;
        }
        Err(e) => {
            log::error!("Cannot build {} row {}: {}", table.id, index, e);
            return Outcome::Failed;
        }
    };
    let text = if pretty {
        serde_json::to_string_pretty(&doc)
    } else {
        serde_json::to_string(&doc)
    };
    let path = dir.join(format!("{}.json", index));
    let written = text
        .map_err(|e| e.to_string())
        .and_then(|text| fs::write(&path, text).map_err(|e| e.to_string()));
    match written {
        Ok(()) => Outcome::Written,
        Err(e) => {
            log::warn!("Failed to write {}: {}", path.display(), e);
            Outcome::Failed
        }
    }
}

/// Table display names may hold characters that are not valid in paths.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "table".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::BuildOptions;
    use crate::model::Relationship;
    use serde_json::{json, Value};

    fn tables() -> Vec<Table> {
        let rows = |v: Value| -> Vec<_> {
            v.as_array()
                .unwrap()
                .iter()
                .map(|r| r.as_object().unwrap().clone())
                .collect()
        };
        let mut customers = Table::new("c", "Customer List", vec!["id".into()])
            .with_rows(rows(json!([{"id": 1}, {"id": 2}])));
        customers.root = true;
        let orders = Table::new("o", "orders", vec!["id".into(), "cid".into()])
            .with_rows(rows(json!([{"id": 7, "cid": 2}])));
        vec![customers, orders]
    }

    #[test]
    fn test_exports_root_tables() {
        let dir = tempfile::tempdir().unwrap();
        let tables = tables();
        let rels = vec![Relationship::new("o", "cid", "c", "id")];
        let options = BuildOptions::default();
        let builder = DocumentBuilder::new(&tables, &rels, &options);
        let config = ExportConfig {
            out_dir: dir.path().to_path_buf(),
            pretty: false,
            threads: Some(2),
            ..Default::default()
        };

        let report = export_documents(&builder, &config, &AtomicBool::new(false)).unwrap();
        assert_eq!(report, ExportReport { written: 2, failed: 0, skipped: 0 });

        let text = fs::read_to_string(dir.path().join("Customer_List").join("1.json")).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc, json!({"Customer List": {"id": 2, "orders": [{"id": 7, "cid": 2}]}}));
        assert!(!dir.path().join("orders").exists());
    }

    #[test]
    fn test_explicit_roots_and_unknown_table() {
        let dir = tempfile::tempdir().unwrap();
        let tables = tables();
        let options = BuildOptions::default();
        let builder = DocumentBuilder::new(&tables, &[], &options);
        let mut config = ExportConfig {
            out_dir: dir.path().to_path_buf(),
            root_tables: vec!["o".into()],
            ..Default::default()
        };

        let report = export_documents(&builder, &config, &AtomicBool::new(false)).unwrap();
        assert_eq!(report.written, 1);
        assert!(dir.path().join("orders").join("0.json").exists());

        config.root_tables = vec!["missing".into()];
        let err = export_documents(&builder, &config, &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, ExportError::UnknownTable(id) if id == "missing"));
    }

    #[test]
    fn test_cancelled_export_skips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let tables = tables();
        let options = BuildOptions::default();
        let builder = DocumentBuilder::new(&tables, &[], &options);
        let config = ExportConfig {
            out_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let report = export_documents(&builder, &config, &AtomicBool::new(true)).unwrap();
        assert_eq!(report, ExportReport { written: 0, failed: 0, skipped: 2 });
    }

    #[test]
    fn test_strict_failures_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let tables = tables();
        let rels = vec![Relationship::new("o", "cid", "ghost", "id")];
        let options = BuildOptions {
            strict: true,
            ..Default::default()
        };
        let builder = DocumentBuilder::new(&tables, &rels, &options);
        let config = ExportConfig {
            out_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let report = export_documents(&builder, &config, &AtomicBool::new(false)).unwrap();
        assert_eq!(report, ExportReport { written: 0, failed: 2, skipped: 0 });
        assert!(!dir.path().join("Customer_List").join("0.json").exists());
    }

    #[test]
    fn test_no_roots() {
        let tables = vec![Table::new("t", "t", vec![])];
        let options = BuildOptions::default();
        let builder = DocumentBuilder::new(&tables, &[], &options);
        let err = export_documents(&builder, &ExportConfig::default(), &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, ExportError::NoRootTables));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Order Items/2024"), "Order_Items_2024");
        assert_eq!(file_stem(".."), "table");
    }
}
