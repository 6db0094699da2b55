//! Result types returned by batch extraction.

use crate::error::{ErrorKind, FileError, Stage};
use crate::pipeline::classify::FileCategory;
use crate::pipeline::orchestrate::ConversionPath;
use crate::pipeline::registry::ConversionDetails;
use crate::pipeline::validate::ExtractionAttempt;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

/// Outcome for one input.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileResult {
    Success {
        /// Always a JSON object.
        json: Value,
        metadata: FileMetadata,
    },
    Error {
        kind: ErrorKind,
        stage: Stage,
        /// Category, when classification got that far.
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<FileCategory>,
        message: String,
        #[serde(skip)]
        error: Option<FileError>,
    },
}

impl FileResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FileResult::Success { .. })
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            FileResult::Success { json, .. } => Some(json),
            FileResult::Error { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            FileResult::Success { .. } => None,
            FileResult::Error { kind, .. } => Some(*kind),
        }
    }

    pub(crate) fn failed(error: FileError, stage: Stage, category: Option<FileCategory>) -> Self {
        FileResult::Error {
            kind: error.kind(),
            stage,
            category,
            message: error.to_string(),
            error: Some(error),
        }
    }
}

/// What happened to a file on its way to a JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub source_name: String,
    pub category: FileCategory,
    pub mime: String,
    pub size_bytes: u64,
    pub conversion: ConversionPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_details: Option<ConversionDetails>,
    pub attempts: Vec<ExtractionAttempt>,
    pub convert_ms: u64,
    pub extract_ms: u64,
    pub total_ms: u64,
    /// Where the JSON was persisted, if an output dir was configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

/// One input and its result.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    /// The input exactly as supplied.
    pub input: String,
    #[serde(flatten)]
    pub result: FileResult,
}

/// One entry per input, in input order. Duplicated inputs yield duplicated
/// entries, so `entries.len()` always equals the input count.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry for `input`.
    pub fn get(&self, input: &str) -> Option<&FileResult> {
        self.entries
            .iter()
            .find(|e| e.input == input)
            .map(|e| &e.result)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    pub fn successes(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.result.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| !e.result.is_success())
    }
}

/// Aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub converted: usize,
    pub extraction_calls: usize,
    pub total_ms: u64,
}

impl BatchStats {
    pub(crate) fn tally(entries: &[BatchEntry], total_ms: u64) -> Self {
        let mut stats = BatchStats {
            total_files: entries.len(),
            total_ms,
            ..Default::default()
        };
        for entry in entries {
            match &entry.result {
                FileResult::Success { metadata, .. } => {
                    stats.succeeded += 1;
                    stats.extraction_calls += metadata.attempts.len();
                    if metadata.conversion != ConversionPath::Direct {
                        stats.converted += 1;
                    }
                }
                FileResult::Error { kind, .. } => {
                    stats.failed += 1;
                    if *kind == ErrorKind::Cancelled {
                        stats.cancelled += 1;
                    }
                }
            }
        }
        stats
    }
}
