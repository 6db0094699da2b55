//! Error types for the edgequake-any2json library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Any2JsonError`] is **fatal**: the batch cannot run at all (provider not
//!   configured, output directory unwritable, invalid configuration).
//!   Returned as `Err(Any2JsonError)` from the top-level `extract*` functions.
//!
//! * [`FileError`] is **non-fatal**: a single input failed (unsupported type,
//!   converter missing, malformed LLM output) while every other input is
//!   unaffected. Stored inside [`crate::output::FileResult::Error`] so callers
//!   can inspect partial success rather than losing the whole batch.
//!
//! Converter-level failures use the narrower [`ConversionError`]; the
//! orchestrator lifts them into [`FileError`] at its boundary.

use crate::pipeline::classify::FileCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-any2json library.
#[derive(Debug, Error)]
pub enum Any2JsonError {
    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Capability errors ────────────────────────────────────────────────
    /// Page rasterisation was requested but no pdfium library could be bound.
    #[error(
        "PDF rasterisation requested but the pdfium library is not available.\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide,\n\
or use native PDF delivery (the default)."
    )]
    RasteriserUnavailable,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The temp root could not be created.
    #[error("Failed to prepare temp directory '{path}': {source}")]
    ScratchUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write into the output directory.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The classifier found no route for the file.
    UnsupportedType,
    /// The file needs a converter that is not installed.
    ConverterUnavailable,
    /// The input could not be read.
    SourceUnreadable,
    /// The converter rejected or crashed on the input.
    ConversionEngineError,
    /// The extraction service failed (transport, auth, quota, timeout).
    ServiceError,
    /// Every extraction attempt returned something other than a JSON object.
    InvalidJsonOutput,
    /// The batch was cancelled before this file was scheduled.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::UnsupportedType => "UnsupportedType",
            ErrorKind::ConverterUnavailable => "ConverterUnavailable",
            ErrorKind::SourceUnreadable => "SourceUnreadable",
            ErrorKind::ConversionEngineError => "ConversionEngineError",
            ErrorKind::ServiceError => "ServiceError",
            ErrorKind::InvalidJsonOutput => "InvalidJsonOutput",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Pipeline stage at which a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Schedule,
    Classify,
    Convert,
    Extract,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Schedule => "schedule",
            Stage::Classify => "classify",
            Stage::Convert => "convert",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for a single input file.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum FileError {
    #[error("no extraction route for '{extension}' files")]
    UnsupportedType { extension: String },

    #[error("the {converter} converter is not available in this build")]
    ConverterUnavailable { converter: String },

    #[error("cannot read '{path}': {detail}")]
    SourceUnreadable { path: PathBuf, detail: String },

    #[error("{converter} conversion failed: {detail}")]
    ConversionEngine { converter: String, detail: String },

    #[error("extraction service error: {detail}")]
    Service { detail: String },

    #[error("no valid JSON object after {attempts} attempts: {last_error}")]
    InvalidJsonOutput {
        attempts: u32,
        last_error: String,
        /// Last raw response, kept for diagnostics.
        last_raw: String,
    },

    #[error("batch cancelled before this file was processed")]
    Cancelled,
}

impl FileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            FileError::ConverterUnavailable { .. } => ErrorKind::ConverterUnavailable,
            FileError::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            FileError::ConversionEngine { .. } => ErrorKind::ConversionEngineError,
            FileError::Service { .. } => ErrorKind::ServiceError,
            FileError::InvalidJsonOutput { .. } => ErrorKind::InvalidJsonOutput,
            FileError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Failure reported by a single converter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// The input file could not be opened or read.
    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    /// The underlying library rejected or crashed on the input.
    #[error("conversion engine error: {0}")]
    Engine(String),

    /// No converter is registered for the category.
    #[error("converter unavailable for {0}")]
    Unavailable(FileCategory),
}

impl ConversionError {
    /// Lift into the per-file error, naming the converter that failed.
    pub fn into_file_error(self, converter: &str, path: &std::path::Path) -> FileError {
        match self {
            ConversionError::SourceUnreadable(detail) => FileError::SourceUnreadable {
                path: path.to_path_buf(),
                detail,
            },
            ConversionError::Engine(detail) => FileError::ConversionEngine {
                converter: converter.to_string(),
                detail,
            },
            ConversionError::Unavailable(category) => FileError::ConverterUnavailable {
                converter: category.converter_label().to_string(),
            },
        }
    }
}

impl From<std::io::Error> for ConversionError {
    fn from(e: std::io::Error) -> Self {
        ConversionError::Engine(format!("I/O error: {e}"))
    }
}
