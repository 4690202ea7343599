//! # Lexspace CLI (`lex`)
//!
//! Loads a JSON Lines corpus of legal source records into an in-memory
//! store and runs tiered searches over it. All output on stdout is JSON;
//! logs go to stderr (`RUST_LOG`, default `lexspace=info`).
//!
//! ## Usage
//!
//! ```bash
//! lex [--config ./lexspace.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lex chunk <file>` | Print the chunk spans of a text file |
//! | `lex validate <corpus>` | Compose every record and report failures |
//! | `lex search <corpus> "<query>"` | Ingest a corpus and run one tiered query |
//!
//! ## Examples
//!
//! ```bash
//! # Broad document-level search
//! lex search corpus.jsonl "premises liability" --tier discovery
//!
//! # Filtered exploration, boosting a practice area
//! lex search corpus.jsonl "non-compete" --tier exploration \
//!     --filter jurisdiction=texas --filter document_type=regulation \
//!     --category practice_area=employment
//!
//! # Passage-level search with citation provenance
//! lex search corpus.jsonl "duty to mitigate" --tier deep_dive --limit 5
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lexspace::config::{load_config, Config};
use lexspace::embedding::create_encoder;
use lexspace::ingest::{ingest_records, load_corpus, IngestFailure};
use lexspace::schema::build_catalog;
use lexspace::search::{parse_key_f64, parse_key_list, run_search, ErrorPayload, SearchRequest};
use lexspace_core::chunk::{chunk_spans, context_window};
use lexspace_core::filter::Filter;
use lexspace_core::query::{QueryComposer, Tier};
use lexspace_core::store::memory::InMemoryStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Lexspace: tiered multi-space retrieval over legal documents.
#[derive(Parser)]
#[command(name = "lex", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply without it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a text file into overlapping chunks and print their spans.
    Chunk {
        /// UTF-8 text file.
        file: PathBuf,

        /// Overrides `chunking.chunk_size`.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overrides `chunking.overlap`.
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Compose every corpus record without storing anything.
    ///
    /// Exits non-zero when any record fails validation.
    Validate {
        /// JSON Lines corpus, one source record per line.
        corpus: PathBuf,
    },

    /// Ingest a corpus and run one tiered query against it.
    Search {
        /// JSON Lines corpus, one source record per line.
        corpus: PathBuf,

        /// Search text.
        query: String,

        /// `discovery`, `exploration` or `deep_dive`.
        #[arg(long, default_value = "exploration", value_parser = parse_tier)]
        tier: Tier,

        /// Hard filter: `field=value`, `field=a,b`, `field>=n` or `field<=n`.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<Filter>,

        /// Space weight override: `space=weight`. `0` removes the space.
        #[arg(long = "weight", value_parser = parse_key_f64)]
        weights: Vec<(String, f64)>,

        /// Categories to match in a categorical space: `space=a,b`.
        #[arg(long = "category", value_parser = parse_key_list)]
        categories: Vec<(String, Vec<String>)>,

        /// Target value for a number space in `similar` mode: `space=value`.
        #[arg(long = "target", value_parser = parse_key_f64)]
        targets: Vec<(String, f64)>,

        /// Maximum number of results. Defaults to the tier's limit.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn parse_tier(s: &str) -> Result<Tier, String> {
    s.parse().map_err(|e: lexspace_core::Error| e.to_string())
}

fn parse_filter(s: &str) -> Result<Filter, String> {
    s.parse().map_err(|e: lexspace_core::Error| e.to_string())
}

#[derive(Serialize)]
struct SpanOutput<'a> {
    index: usize,
    start: usize,
    end: usize,
    text: &'a str,
    context_before: String,
    context_after: String,
}

#[derive(Serialize)]
struct ValidateOutput {
    records: usize,
    valid: usize,
    chunks: usize,
    failures: Vec<IngestFailure>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lexspace=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let payload = ErrorPayload::from_error(&err);
            match serde_json::to_string_pretty(&payload) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Chunk {
            file,
            chunk_size,
            overlap,
        } => {
            chunk_file(&config, &file, chunk_size, overlap)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { corpus } => validate_corpus(&config, &corpus),
        Commands::Search {
            corpus,
            query,
            tier,
            filters,
            weights,
            categories,
            targets,
            limit,
        } => {
            let request = SearchRequest {
                tier,
                query,
                filters,
                weights,
                categories,
                targets,
                limit,
            };
            search_corpus(&config, &corpus, request).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn chunk_file(
    config: &Config,
    file: &Path,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut chunking = config.chunking.clone();
    if let Some(size) = chunk_size {
        chunking.chunk_size = size;
    }
    if let Some(overlap) = overlap {
        chunking.overlap = overlap;
    }
    let chunking = chunking.to_core()?;

    let spans: Vec<SpanOutput> = chunk_spans(&text, &chunking)
        .into_iter()
        .enumerate()
        .map(|(index, span)| {
            let (context_before, context_after) =
                context_window(&text, span, chunking.context_chars());
            SpanOutput {
                index,
                start: span.start,
                end: span.end,
                text: &text[span.start..span.end],
                context_before,
                context_after,
            }
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&spans)?);
    Ok(())
}

fn validate_corpus(config: &Config, corpus: &Path) -> Result<ExitCode> {
    let catalog = build_catalog(config, create_encoder(&config.embedding)?)?;
    let records = load_corpus(corpus)?;

    let mut output = ValidateOutput {
        records: records.len(),
        valid: 0,
        chunks: 0,
        failures: Vec::new(),
    };
    for entry in &records {
        match catalog.composer().compose(&entry.record) {
            Ok((_, chunks)) => {
                output.valid += 1;
                output.chunks += chunks.len();
            }
            Err(err) => output.failures.push(IngestFailure {
                line: entry.line,
                document_id: entry.record.id.clone(),
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(if output.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn search_corpus(config: &Config, corpus: &Path, request: SearchRequest) -> Result<()> {
    let catalog = Arc::new(build_catalog(config, create_encoder(&config.embedding)?)?);
    let composer = QueryComposer::new(config.retrieval.tier_defaults())?;
    let ranker = config.retrieval.ranker();
    let store = InMemoryStore::new();

    let records = load_corpus(corpus)?;
    ingest_records(Arc::clone(&catalog), &store, records, config.ingest.workers).await?;

    let response = run_search(&catalog, &store, &composer, &ranker, request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
