//! Enrichment pipeline over canonical conversations
//!
//! This module owns the per-file state machine that takes an uploaded
//! payload from raw text to an enriched conversation with a component
//! report.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     ┌──────────────────────────────────────────┐
//! │ SourcePayload  │ ──► │ Pipeline                                 │
//! │ (uploaded text)│     │  parse ─► count ─► segment ─► count ─►   │
//! └────────────────┘     │                        componentize      │
//!                        └──────────────────────────────────────────┘
//!                              │                       │
//!                              ▼                       ▼
//!                        ┌───────────┐          ┌──────────────┐
//!                        │ Tokenizer │          │ TextGenerator│
//!                        │ (BPE)     │          │ (collaborator)│
//!                        └───────────┘          └──────────────┘
//! ```
//!
//! Files move `pending → processing(step) → success | failed`. Within a
//! batch, files run one at a time in submission order, and one file's
//! failure never touches the others. Token accounting runs twice: once
//! after parsing and again after segmentation, because splitting clears
//! the affected counts.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tokenlens_core::pipeline::{Pipeline, SourcePayload};
//!
//! let pipeline = Pipeline::new(tokenizer, generator, config.pipeline);
//! let summary = pipeline
//!     .process_batch(vec![SourcePayload::new("session.json", raw_text)])
//!     .await;
//! println!("{} processed, {} failed", summary.processed, summary.failed);
//! ```

pub mod component;
pub mod count;
mod prompts;
pub mod segment;

pub use component::{componentize, componentize_with_instructions};
pub use count::{count_tokens, count_tokens_chunked};
pub use segment::segment_oversized;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingest::ParserRegistry;
use crate::llm::TextGenerator;
use crate::tokenizer::Tokenizer;
use crate::types::{ComponentReport, Conversation};

// ============================================
// File lifecycle
// ============================================

/// The pass currently holding a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStep {
    Parse,
    CountTokens,
    Segment,
    Componentize,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Parse => "parse",
            PipelineStep::CountTokens => "count-tokens",
            PipelineStep::Segment => "segment",
            PipelineStep::Componentize => "componentize",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of one uploaded file.
///
/// Outcomes only ever carry the two terminal states; `Pending` and
/// `Processing` exist for consumers mirroring live progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing(PipelineStep),
    Success,
    Failed,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Processing(step) => write!(f, "processing:{}", step),
            FileStatus::Success => write!(f, "success"),
            FileStatus::Failed => write!(f, "failed"),
        }
    }
}

// ============================================
// Inputs and outcomes
// ============================================

/// One uploaded file: raw text plus a display name.
#[derive(Debug, Clone)]
pub struct SourcePayload {
    /// Batch-unique id, echoed through the progress callbacks
    pub id: String,
    /// Display name, usually the uploaded filename
    pub name: String,
    /// Raw file content, expected to be JSON
    pub text: String,
}

impl SourcePayload {
    /// Wrap uploaded text under a fresh v4 uuid.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            text: text.into(),
        }
    }

    /// Wrap uploaded text under a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Terminal result for one file.
///
/// `conversation` and `components` are only present on success; `error`
/// holds the verbatim failure text otherwise. `component_error` records
/// an aborted componentization on an otherwise successful file.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub id: String,
    pub name: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Counters and outcomes for a whole batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Files that reached `success`
    pub processed: usize,
    /// Files that reached `failed`
    pub failed: usize,
    /// Per-file outcomes, in submission order
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome.status {
            FileStatus::Success => self.processed += 1,
            _ => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

// ============================================
// Orchestrator
// ============================================

/// Drives uploaded files through parse and enrichment.
///
/// The pipeline owns its format registry, tokenizer, and collaborator
/// handle; the passes themselves stay free functions so they can be run
/// individually.
pub struct Pipeline {
    registry: ParserRegistry,
    tokenizer: Box<dyn Tokenizer>,
    generator: Box<dyn TextGenerator>,
    options: PipelineConfig,
}

impl Pipeline {
    /// Pipeline with the default format adapters.
    pub fn new(
        tokenizer: Box<dyn Tokenizer>,
        generator: Box<dyn TextGenerator>,
        options: PipelineConfig,
    ) -> Self {
        Self {
            registry: ParserRegistry::new(),
            tokenizer,
            generator,
            options,
        }
    }

    /// Pipeline over a caller-assembled registry.
    pub fn with_registry(
        registry: ParserRegistry,
        tokenizer: Box<dyn Tokenizer>,
        generator: Box<dyn TextGenerator>,
        options: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            tokenizer,
            generator,
            options,
        }
    }

    /// Process a batch without progress reporting.
    pub async fn process_batch(&self, files: Vec<SourcePayload>) -> BatchSummary {
        self.process_batch_with_progress(files, |_, _| {}, |_| {})
            .await
    }

    /// Process a batch, reporting progress through two callbacks.
    ///
    /// `on_step` fires with `(file id, step)` on every step transition;
    /// `on_done` fires once per file with its terminal outcome. Files are
    /// processed sequentially in submission order, and a failure in one
    /// file never aborts the rest of the batch.
    ///
    /// ## Example
    ///
    /// ```rust,ignore
    /// let summary = pipeline
    ///     .process_batch_with_progress(
    ///         files,
    ///         |id, step| println!("{id}: {step}"),
    ///         |outcome| println!("{}: {}", outcome.name, outcome.status),
    ///     )
    ///     .await;
    /// ```
    pub async fn process_batch_with_progress<S, D>(
        &self,
        files: Vec<SourcePayload>,
        mut on_step: S,
        mut on_done: D,
    ) -> BatchSummary
    where
        S: FnMut(&str, PipelineStep),
        D: FnMut(&FileOutcome),
    {
        let mut summary = BatchSummary::default();
        for file in &files {
            let outcome = self.process_file(file, &mut on_step).await;
            on_done(&outcome);
            summary.record(outcome);
        }
        summary
    }

    /// Run one file to a terminal state. Fatal errors are caught here and
    /// turned into a `failed` outcome with the error text verbatim.
    async fn process_file<S>(&self, file: &SourcePayload, on_step: &mut S) -> FileOutcome
    where
        S: FnMut(&str, PipelineStep),
    {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(file_id = %file.id, name = %file.name, "processing file");

        match self.run_passes(file, on_step).await {
            Ok((conversation, components, component_error)) => {
                let duration_ms = start.elapsed().as_millis() as i64;
                info!(
                    file_id = %file.id,
                    duration_ms = duration_ms,
                    tokens = conversation.total_token_count(),
                    "file processed"
                );
                FileOutcome {
                    id: file.id.clone(),
                    name: file.name.clone(),
                    status: FileStatus::Success,
                    conversation: Some(conversation),
                    components,
                    component_error,
                    error: None,
                    started_at,
                    duration_ms,
                }
            }
            Err(err) => {
                let duration_ms = start.elapsed().as_millis() as i64;
                warn!(file_id = %file.id, error = %err, "file failed");
                FileOutcome {
                    id: file.id.clone(),
                    name: file.name.clone(),
                    status: FileStatus::Failed,
                    conversation: None,
                    components: None,
                    component_error: None,
                    error: Some(err.to_string()),
                    started_at,
                    duration_ms,
                }
            }
        }
    }

    /// The pass sequence for one file. Returns the enriched conversation
    /// plus the component report (or the identify-step marker when
    /// componentization aborted).
    async fn run_passes<S>(
        &self,
        file: &SourcePayload,
        on_step: &mut S,
    ) -> Result<(Conversation, Option<ComponentReport>, Option<String>)>
    where
        S: FnMut(&str, PipelineStep),
    {
        on_step(&file.id, PipelineStep::Parse);
        let raw: serde_json::Value = serde_json::from_str(&file.text)?;
        let conversation = self.registry.parse(&raw)?;

        on_step(&file.id, PipelineStep::CountTokens);
        let conversation = count::count_tokens_chunked(
            conversation,
            self.tokenizer.as_ref(),
            self.options.count_chunk_size,
        )
        .await;

        on_step(&file.id, PipelineStep::Segment);
        let conversation = segment::segment_oversized(
            conversation,
            self.generator.as_ref(),
            self.options.large_part_ratio,
        )
        .await;
        // Splitting clears the affected counts; restore them before
        // aggregation reads token_count.
        let conversation = count::count_tokens_chunked(
            conversation,
            self.tokenizer.as_ref(),
            self.options.count_chunk_size,
        )
        .await;

        on_step(&file.id, PipelineStep::Componentize);
        let (components, component_error) =
            match component::componentize(&conversation, self.generator.as_ref()).await {
                Ok(report) => (Some(report), None),
                Err(err) => {
                    warn!(file_id = %file.id, error = %err, "componentization aborted");
                    (None, Some(err.to_string()))
                }
            };

        Ok((conversation, components, component_error))
    }
}
