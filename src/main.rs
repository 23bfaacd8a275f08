use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docjoin::export::{export_documents, ExportConfig};
use docjoin::ingest::{table_from_json, table_from_jsonl};
use docjoin::join::DocumentBuilder;
use docjoin::project::Project;
use docjoin::sql::{parse_sql, Dialect};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

/// docjoin - Build nested JSON documents from related tables
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the document for a single lead row
    Build {
        /// Project file
        project: PathBuf,

        /// Lead table id
        #[arg(short, long)]
        table: String,

        /// Lead row index
        #[arg(short, long, default_value_t = 0)]
        row: usize,

        /// Pretty-print the document
        #[arg(long)]
        pretty: bool,

        /// Fail on relationships that reference unknown tables or columns
        #[arg(long)]
        strict: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write one document per row of every root table
    Export {
        /// Project file
        project: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "export")]
        out: PathBuf,

        /// Root tables to export (default: tables flagged as roots)
        #[arg(long = "root")]
        roots: Vec<String>,

        /// Worker threads (default: one per core)
        #[arg(long)]
        threads: Option<usize>,

        /// Write compact JSON
        #[arg(long)]
        compact: bool,

        /// Fail on relationships that reference unknown tables or columns
        #[arg(long)]
        strict: bool,
    },

    /// Create a project from a SQL dump
    ImportSql {
        /// SQL dump file
        dump: PathBuf,

        /// Dialect: auto, generic, postgres, mysql
        #[arg(short, long, default_value = "auto")]
        dialect: String,

        /// Rows to generate for tables the dump leaves empty
        #[arg(long, default_value_t = 0)]
        sample_rows: usize,

        /// Project file to write
        #[arg(short, long, default_value = "project.json")]
        output: PathBuf,
    },

    /// Add a JSON or JSON Lines file to a project as a new table
    ImportJson {
        /// Project file; created when missing
        project: PathBuf,

        /// JSON file holding an array of objects
        file: PathBuf,

        /// Table id (default: file stem)
        #[arg(long)]
        id: Option<String>,

        /// Table display name (default: table id)
        #[arg(long)]
        name: Option<String>,

        /// Read the file as JSON Lines
        #[arg(long)]
        jsonl: bool,

        /// Mark the table as a document root
        #[arg(long)]
        root: bool,
    },
}

fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Build { project, table, row, pretty, strict, output } => {
            build(&project, &table, row, pretty, strict, output.as_deref())
        }
        Command::Export { project, out, roots, threads, compact, strict } => {
            let config = ExportConfig {
                out_dir: out,
                root_tables: roots,
                pretty: !compact,
                threads,
            };
            export(&project, &config, strict)
        }
        Command::ImportSql { dump, dialect, sample_rows, output } => {
            import_sql(&dump, &dialect, sample_rows, &output)
        }
        Command::ImportJson { project, file, id, name, jsonl, root } => {
            import_json(&project, &file, id, name, jsonl, root)
        }
    }
}

fn build(path: &Path, table: &str, row: usize, pretty: bool, strict: bool, output: Option<&Path>) -> Result<()> {
    let project = Project::load(path)?;
    let relationships = project.relationships();
    let mut options = project.build_options();
    options.strict = strict;

    let doc = DocumentBuilder::new(&project.tables, &relationships, &options).build_document(table, row)?;
    let text = if pretty {
        serde_json::to_string_pretty(&doc)?
    } else {
        serde_json::to_string(&doc)?
    };

    match output {
        Some(out) => fs::write(out, text).with_context(|| format!("Failed to write {}", out.display()))?,
        None => println!("{}", text),
    }
    Ok(())
}

fn export(path: &Path, config: &ExportConfig, strict: bool) -> Result<()> {
    let project = Project::load(path)?;
    let relationships = project.relationships();
    let mut options = project.build_options();
    options.strict = strict;

    let builder = DocumentBuilder::new(&project.tables, &relationships, &options);
    let report = export_documents(&builder, config, &AtomicBool::new(false))?;
    if report.failed > 0 {
        bail!("{} of {} documents failed", report.failed, report.failed + report.written);
    }
    Ok(())
}

fn import_sql(dump: &Path, dialect: &str, sample_rows: usize, output: &Path) -> Result<()> {
    let dialect = Dialect::from_str(dialect).with_context(|| format!("Unknown dialect: {}", dialect))?;
    let source = fs::read_to_string(dump).with_context(|| format!("Failed to read {}", dump.display()))?;

    let schema = parse_sql(&source, dialect)?.with_sample_rows(sample_rows);
    log::info!(
        "Imported {} tables and {} relationships from {}",
        schema.tables.len(),
        schema.relationships.len(),
        dump.display()
    );
    Project::from_schema(schema).save(output)?;
    Ok(())
}

fn import_json(
    path: &Path,
    file: &Path,
    id: Option<String>,
    name: Option<String>,
    jsonl: bool,
    root: bool,
) -> Result<()> {
    let mut project = if path.exists() { Project::load(path)? } else { Project::default() };

    let id = match id {
        Some(id) => id,
        None => file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("Cannot derive a table id from {}", file.display()))?,
    };
    let name = name.unwrap_or_else(|| id.clone());
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let mut table = if jsonl {
        table_from_jsonl(&id, &name, &text)?
    } else {
        table_from_json(&id, &name, &text)?
    };
    table.root = root;
    log::info!("Added table {} with {} rows", table.id, table.rows.len());

    project.add_table(table)?;
    project.save(path)?;
    Ok(())
}
