//! soql CLI - compile SOQL queries to PostgreSQL
//!
//! Usage:
//!   soql compile <query> --schema <objects.toml> [--config <soql.toml>] [--resolve] [--format sql|json]
//!   soql validate <query> --schema <objects.toml>
//!   soql objects --schema <objects.toml>
//!
//! Examples:
//!   soql compile "SELECT Name FROM Account WHERE CreatedDate = TODAY" --schema objects.toml --resolve
//!   soql validate "SELECT Nmae FROM Account" --schema objects.toml

use clap::{Parser, Subcommand, ValueEnum};
use soql::metadata::MetadataProvider;
use soql::{CompiledQuery, Engine, QueryContext, Settings, StaticMetadata};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "soql")]
#[command(about = "Compile SOQL queries to parameterized PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to soql.toml (defaults to $SOQL_CONFIG, then ./soql.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Object metadata file (.toml or .json); overrides [metadata] path
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query to SQL
    Compile {
        /// SOQL query text
        query: String,

        /// Resolve relative date literals against the current time
        #[arg(short, long)]
        resolve: bool,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        format: OutputFormat,
    },

    /// Validate a query without generating SQL
    Validate {
        /// SOQL query text
        query: String,
    },

    /// List the objects in the metadata file
    Objects,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// SQL followed by the parameter list
    Sql,
    /// SQL, params and columns as JSON
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_ref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let metadata = match load_metadata(cli.schema.as_ref(), &settings) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error loading metadata: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Compile {
            query,
            resolve,
            format,
        } => with_engine(&settings, metadata, |engine| cmd_compile(engine, &query, resolve, format)),
        Commands::Validate { query } => {
            with_engine(&settings, metadata, |engine| cmd_validate(engine, &query))
        }
        Commands::Objects => cmd_objects(metadata.as_ref()),
    }
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings, String> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .map_err(|e| e.to_string())
}

fn load_metadata(schema: Option<&PathBuf>, settings: &Settings) -> Result<Arc<StaticMetadata>, String> {
    let path = match schema {
        Some(path) => path.clone(),
        None => settings
            .metadata
            .resolved_path()
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no --schema given and no [metadata] path configured".to_string())?,
    };
    StaticMetadata::load(&path)
        .map(Arc::new)
        .map_err(|e| format!("'{}': {}", path.display(), e))
}

fn with_engine(
    settings: &Settings,
    metadata: Arc<StaticMetadata>,
    run: impl FnOnce(&Engine) -> ExitCode,
) -> ExitCode {
    match Engine::from_settings(settings, metadata) {
        Ok(engine) => run(&engine),
        Err(e) => {
            eprintln!("Invalid settings: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_compile(engine: &Engine, query: &str, resolve: bool, format: OutputFormat) -> ExitCode {
    let ctx = QueryContext::new();
    let result = if resolve {
        engine.prepare_and_resolve(&ctx, query)
    } else {
        engine.prepare(&ctx, query).map(|c| (*c).clone())
    };

    match result {
        Ok(compiled) => {
            match format {
                OutputFormat::Sql => print_sql(&compiled),
                OutputFormat::Json => print_json(&compiled),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error [{}]: {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}

fn print_sql(compiled: &CompiledQuery) {
    println!("{}", compiled.sql);
    if !compiled.params.is_empty() {
        println!();
        for (i, param) in compiled.params.iter().enumerate() {
            println!("-- ${} = {}", i + 1, param);
        }
    }
}

fn print_json(compiled: &CompiledQuery) {
    let value = serde_json::json!({
        "sql": compiled.sql,
        "params": compiled.params,
        "columns": compiled.columns,
        "unresolved": compiled.has_unresolved(),
    });
    match serde_json::to_string_pretty(&value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error encoding JSON: {}", e),
    }
}

fn cmd_validate(engine: &Engine, query: &str) -> ExitCode {
    let report = engine.validate(&QueryContext::new(), query);
    println!("{}", report.to_json());
    if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn cmd_objects(metadata: &dyn MetadataProvider) -> ExitCode {
    let names = metadata.list_objects();
    if names.is_empty() {
        println!("No objects defined.");
        return ExitCode::SUCCESS;
    }

    for name in names {
        let Some(object) = metadata.get_object(&name) else {
            continue;
        };
        println!(
            "{} ({} fields, {} lookups, {} child relationships) -> {}",
            object.name,
            object.fields.len(),
            object.lookups.len(),
            object.relationships.len(),
            object.table
        );
    }
    ExitCode::SUCCESS
}
