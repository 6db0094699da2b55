//! # edgequake-any2json
//!
//! Extract a structured JSON object from any document (PDF, images, text,
//! spreadsheets, Word files) using a multimodal LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! inputs (paths / URLs)
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Classify  extension, then magic bytes → category
//!  ├─ 3. Convert   xlsx / docx / (fallback) text → PDF, on the blocking pool
//!  ├─ 4. Encode    PDF / image attachment, inlined text, or rendered pages
//!  ├─ 5. Extract   one LLM call per attempt (gemini / openai / anthropic / …)
//!  ├─ 6. Validate  reply must parse as a JSON object; re-ask with the error
//!  └─ 7. Output    one entry per input, in input order, plus batch stats
//! ```
//!
//! Every file runs in its own failure boundary: an unsupported type, a
//! missing converter or a model that never returns valid JSON produces a
//! [`FileResult::Error`] for that file and nothing else.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_any2json::{extract_batch, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let config = ExtractionConfig::builder().concurrency(4).build()?;
//!     let batch = extract_batch(&["invoice.pdf", "ledger.xlsx", "notes.txt"], &config).await?;
//!     for entry in batch.iter() {
//!         match entry.result.json() {
//!             Some(json) => println!("{}: {}", entry.input, json),
//!             None => eprintln!("{}: {:?}", entry.input, entry.result.error_kind()),
//!         }
//!     }
//!     eprintln!("{}/{} succeeded", batch.stats.succeeded, batch.stats.total_files);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `any2json` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `excel` | on      | Spreadsheet → PDF conversion via calamine |
//! | `word`  | on      | `.docx` → PDF conversion via docx-rs |
//!
//! Without `excel` or `word`, those files fail with `ConverterUnavailable`
//! unless the text fallback is enabled.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    extract_batch, extract_batch_sync, extract_file, resolve_provider, BatchCoordinator,
};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PdfDelivery};
pub use error::{Any2JsonError, ConversionError, ErrorKind, FileError, Stage};
pub use output::{BatchEntry, BatchResult, BatchStats, FileMetadata, FileResult};
pub use pipeline::classify::{FileCategory, InputFile};
pub use pipeline::encode::Payload;
pub use pipeline::llm::{ExtractionClient, ExtractionRequest, ServiceError, ServiceHints};
pub use pipeline::orchestrate::ConversionPath;
pub use pipeline::registry::{
    capabilities, Capabilities, ConversionDetails, ConvertedPdf, Converter, ConverterRegistry,
};
pub use pipeline::validate::{AttemptOutcome, ExtractionAttempt};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, EntryStream};
