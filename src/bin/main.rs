//! Mangrove CLI - Compile logical queries to aggregation pipelines
//!
//! Usage:
//!   mangrove compile <query.json> --metadata <meta.json>
//!   mangrove native <pipeline.json> --collection <name>
//!
//! Examples:
//!   mangrove compile examples/orders_by_day.json --metadata examples/meta.json
//!   mangrove native raw_pipeline.json --collection orders

use clap::{Parser, Subcommand};
use mangrove::compile::{compile, compile_native, CompileOptions, CompileOutput};
use mangrove::metadata::StaticMetadata;
use mangrove::model::Query;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mangrove")]
#[command(about = "Compile structured tabular queries into MongoDB aggregation pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a structured query against field metadata
    Compile {
        /// Path to the query JSON file
        query: PathBuf,

        /// Path to the metadata JSON file (tables and fields)
        #[arg(short, long)]
        metadata: PathBuf,
    },

    /// Decode a native pipeline (shell constructor syntax allowed)
    Native {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,

        /// Collection the pipeline targets
        #[arg(short, long)]
        collection: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Compile { query, metadata } => run_compile(&query, &metadata),
        Commands::Native {
            pipeline,
            collection,
        } => run_native(&pipeline, &collection),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_compile(query_path: &PathBuf, metadata_path: &PathBuf) -> Result<(), String> {
    let metadata_text = fs::read_to_string(metadata_path)
        .map_err(|e| format!("reading {}: {e}", metadata_path.display()))?;
    let metadata: StaticMetadata = serde_json::from_str(&metadata_text)
        .map_err(|e| format!("parsing {}: {e}", metadata_path.display()))?;

    let query_text = fs::read_to_string(query_path)
        .map_err(|e| format!("reading {}: {e}", query_path.display()))?;
    let query: Query = serde_json::from_str(&query_text)
        .map_err(|e| format!("parsing {}: {e}", query_path.display()))?;

    let output = compile(&query, &metadata, CompileOptions::default())
        .map_err(|e| format!("[{}] {e}", e.code()))?;
    print_output(&output)
}

fn run_native(pipeline_path: &PathBuf, collection: &str) -> Result<(), String> {
    let text = fs::read_to_string(pipeline_path)
        .map_err(|e| format!("reading {}: {e}", pipeline_path.display()))?;
    let output =
        compile_native(&text, collection).map_err(|e| format!("[{}] {e}", e.code()))?;
    print_output(&output)
}

fn print_output(output: &CompileOutput) -> Result<(), String> {
    let rendered = serde_json::json!({
        "collection": output.collection,
        "projections": output.projections,
        "pipeline": output.pipeline,
    });
    let pretty =
        serde_json::to_string_pretty(&rendered).map_err(|e| format!("rendering output: {e}"))?;
    println!("{pretty}");
    Ok(())
}
