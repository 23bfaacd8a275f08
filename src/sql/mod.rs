//! SQL schema dump import: tables, foreign-key relationships and rows.

mod dialect;
mod lexer;
mod parser;
mod types;

pub use dialect::Dialect;
pub use parser::{parse_sql, SqlColumn, SqlParseError, SqlSchema};
pub use types::TypeClass;
