//! Document join engine: builds one nested JSON document per lead row.

mod engine;
mod identity;

pub use engine::{BuildError, BuildOptions, DocumentBuilder};
pub use identity::{dedup_values, join_values_match, structural_key, RowKey};
