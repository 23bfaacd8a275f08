pub mod export;
pub mod ingest;
pub mod join;
pub mod model;
pub mod normalize;
pub mod project;
pub mod sql;
pub mod transform;

use wasm_bindgen::prelude::*;

use join::DocumentBuilder;
use project::Project;
use sql::{parse_sql, Dialect};

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Build the document for one lead row of a serialized project.
#[wasm_bindgen(js_name = "buildDocument")]
pub fn build_document(
    project_json: &str,
    lead_table_id: &str,
    lead_row_index: usize,
    pretty: Option<bool>,
) -> Result<String, String> {
    let project = Project::from_json(project_json).map_err(|e| e.to_string())?;
    let relationships = project.relationships();
    let options = project.build_options();
    let doc = DocumentBuilder::new(&project.tables, &relationships, &options)
        .build_document(lead_table_id, lead_row_index)
        .map_err(|e| e.to_string())?;

    let text = if pretty.unwrap_or(false) {
        serde_json::to_string_pretty(&doc)
    } else {
        serde_json::to_string(&doc)
    };
    text.map_err(|e| e.to_string())
}

/// Turn a SQL dump into a serialized project, generating rows for empty tables.
#[wasm_bindgen(js_name = "importSql")]
pub fn import_sql(
    source: &str,
    dialect: Option<String>,
    sample_rows: Option<usize>,
) -> Result<String, String> {
    let dialect = dialect
        .as_deref()
        .and_then(Dialect::from_str)
        .unwrap_or_default();
    let schema = parse_sql(source, dialect)
        .map_err(|e| e.to_string())?
        .with_sample_rows(sample_rows.unwrap_or(0));
    serde_json::to_string(&Project::from_schema(schema)).map_err(|e| e.to_string())
}
