//! # tokenlens-core
//!
//! Core library for tokenlens - an ingestion and enrichment pipeline for
//! AI assistant conversation logs.
//!
//! This library provides:
//! - A canonical conversation model (messages and typed content parts)
//! - Format adapters that normalize provider wire formats into it
//! - Enrichment passes: token accounting, segmentation, componentization
//! - A batch orchestrator with per-file isolation and live progress
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Parse:** A registry of format adapters claims and transforms raw
//!   JSON payloads into validated [`Conversation`] values
//! - **Enrich:** Pure passes attach token counts, split oversized parts,
//!   and label parts with components
//! - **Report:** Each file ends as a [`pipeline::FileOutcome`] carrying
//!   the enriched conversation and its component report
//!
//! ## Example
//!
//! ```rust,ignore
//! use tokenlens_core::{BpeTokenizer, Config, Pipeline, SourcePayload};
//!
//! let config = Config::load()?;
//! let tokenizer = Box::new(BpeTokenizer::new()?);
//! let generator = tokenlens_core::llm::create_generator(config.llm.as_ref().unwrap())?;
//!
//! let pipeline = Pipeline::new(tokenizer, generator, config.pipeline);
//! let summary = pipeline
//!     .process_batch(vec![SourcePayload::new("session.json", raw_text)])
//!     .await;
//! println!("{} processed, {} failed", summary.processed, summary.failed);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{FormatAdapter, ParserRegistry};
pub use llm::{TextGenerator, TextStream};
pub use pipeline::{BatchSummary, FileOutcome, FileStatus, Pipeline, PipelineStep, SourcePayload};
pub use tokenizer::{BpeTokenizer, Tokenizer};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod tokenizer;
pub mod types;
