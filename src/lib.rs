//! # Lexspace
//!
//! Multi-space retrieval over legal documents. The engine itself lives in
//! `lexspace-core`; this crate wires it to a concrete legal schema, a TOML
//! configuration file, a text-encoder choice, and a JSON Lines corpus.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`schema`] | Legal spaces and the `documents` / `chunks` indexes |
//! | [`embedding`] | Text-encoder selection (`hashing`, `local`) |
//! | [`ingest`] | Corpus loading, parallel staging, per-document commits |
//! | [`search`] | Tiered search and JSON result/error shaping |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lexspace::config::Config;
//! use lexspace::embedding::create_encoder;
//! use lexspace::ingest::{ingest_records, load_corpus};
//! use lexspace::schema::build_catalog;
//! use lexspace::search::{run_search, SearchRequest};
//! use lexspace_core::query::{QueryComposer, Tier};
//! use lexspace_core::store::memory::InMemoryStore;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::default();
//! let catalog = Arc::new(build_catalog(&config, create_encoder(&config.embedding)?)?);
//! let store = InMemoryStore::new();
//! let records = load_corpus("corpus.jsonl".as_ref())?;
//! ingest_records(catalog.clone(), &store, records, config.ingest.workers).await?;
//!
//! let composer = QueryComposer::new(config.retrieval.tier_defaults())?;
//! let ranker = config.retrieval.ranker();
//! let request = SearchRequest::new(Tier::Exploration, "non-compete enforceability");
//! let response = run_search(&catalog, &store, &composer, &ranker, request).await?;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod ingest;
pub mod schema;
pub mod search;
