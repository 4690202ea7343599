//! # Lexspace Core
//!
//! Runtime-agnostic retrieval engine for legal documents: data models,
//! passage chunking, embedding spaces, index definitions, tiered query
//! composition, weighted multi-space ranking, the vector-store abstraction
//! and staged ingestion.
//!
//! This crate contains no tokio, filesystem I/O or model downloads. Text
//! embedding is reached through the [`embedding::TextEncoder`] trait and
//! storage through [`store::VectorStore`]; the application crate supplies
//! both.
//!
//! # Pipeline
//!
//! ```text
//! SourceRecord ─▶ EntityComposer ─▶ Document + Chunks ─▶ Index::encode ─▶ VectorStore
//!                                                                           ▲
//! search text + Tier ─▶ QueryComposer ─▶ QueryDescriptor ─▶ Ranker ─────────┘
//! ```

pub mod chunk;
pub mod compose;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod index;
pub mod ingest;
pub mod models;
pub mod query;
pub mod search;
pub mod space;
pub mod store;

pub use error::{Error, Result};
