//! Converter registry and the process-wide capability probe.
//!
//! Which converters exist is decided once per process: spreadsheet and Word
//! support are cargo features, and PDF rasterisation depends on whether a
//! pdfium shared library can be bound. [`capabilities`] runs that probe on
//! first use and caches it for the lifetime of the process; registries are
//! then built from the cached answer, never by re-probing per file.

use crate::error::ConversionError;
use crate::pipeline::classify::FileCategory;
use crate::pipeline::text::TextConverter;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A converted PDF and what the converter learned along the way.
#[derive(Debug, Clone)]
pub struct ConvertedPdf {
    pub path: PathBuf,
    pub details: ConversionDetails,
}

/// Converter-specific facts recorded in the file metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionDetails {
    pub pages: usize,
    /// Free-form facts, e.g. `sheets=3`, `tables=2`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<(String, String)>,
}

impl ConversionDetails {
    pub fn fact(mut self, key: &str, value: impl ToString) -> Self {
        self.facts.push((key.to_string(), value.to_string()));
        self
    }
}

/// Turns one input format into a PDF.
///
/// Implementations are blocking; the orchestrator runs them on the blocking
/// thread pool.
pub trait Converter: Send + Sync {
    /// Short name used in logs and metadata (`excel`, `word`, `text`).
    fn name(&self) -> &'static str;

    /// Convert `input`, writing the PDF somewhere inside `out_dir`.
    fn convert(&self, input: &Path, out_dir: &Path) -> Result<ConvertedPdf, ConversionError>;
}

/// What this process can do, probed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub excel: bool,
    pub word: bool,
    /// A pdfium library could be bound for page rasterisation.
    pub rasteriser: bool,
}

impl Capabilities {
    fn probe() -> Self {
        let caps = Self {
            excel: cfg!(feature = "excel"),
            word: cfg!(feature = "word"),
            rasteriser: crate::pipeline::render::probe_pdfium(),
        };
        info!(
            "Capabilities: excel={} word={} rasteriser={}",
            caps.excel, caps.word, caps.rasteriser
        );
        caps
    }
}

static CAPABILITIES: Lazy<Capabilities> = Lazy::new(Capabilities::probe);

/// The cached capability probe.
pub fn capabilities() -> Capabilities {
    *CAPABILITIES
}

/// Converters keyed by the category they handle, plus an optional fallback.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<FileCategory, Arc<dyn Converter>>,
    fallback: Option<Arc<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .converters
            .iter()
            .map(|(c, conv)| format!("{c}={}", conv.name()))
            .collect();
        names.sort();
        f.debug_struct("ConverterRegistry")
            .field("converters", &names)
            .field("fallback", &self.fallback.as_ref().map(|c| c.name()))
            .finish()
    }
}

impl ConverterRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from the cached capability probe.
    pub fn detect(text_fallback: bool, excel_sheets: Option<Vec<String>>) -> Self {
        let caps = capabilities();
        let mut registry = Self::empty();

        #[cfg(feature = "excel")]
        if caps.excel {
            let conv = crate::pipeline::excel::ExcelConverter::new(excel_sheets);
            registry = registry.with_converter(FileCategory::ConvertExcel, Arc::new(conv));
        }
        #[cfg(not(feature = "excel"))]
        let _ = excel_sheets;

        #[cfg(feature = "word")]
        if caps.word {
            registry = registry.with_converter(
                FileCategory::ConvertWord,
                Arc::new(crate::pipeline::word::WordConverter),
            );
        }

        if text_fallback {
            registry = registry.with_fallback(Arc::new(TextConverter));
        }

        debug!("Converter registry: {:?} (caps {:?})", registry, caps);
        registry
    }

    pub fn with_converter(mut self, category: FileCategory, converter: Arc<dyn Converter>) -> Self {
        self.converters.insert(category, converter);
        self
    }

    pub fn with_fallback(mut self, converter: Arc<dyn Converter>) -> Self {
        self.fallback = Some(converter);
        self
    }

    /// Drop the converter for `category`, as if its backend were missing.
    pub fn without(mut self, category: FileCategory) -> Self {
        self.converters.remove(&category);
        self
    }

    /// The primary converter for `category`.
    pub fn primary(&self, category: FileCategory) -> Option<Arc<dyn Converter>> {
        self.converters.get(&category).cloned()
    }

    /// The text fallback, if enabled.
    pub fn fallback(&self) -> Option<Arc<dyn Converter>> {
        self.fallback.clone()
    }

    pub fn is_available(&self, category: FileCategory) -> bool {
        self.converters.contains_key(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Converter for Named {
        fn name(&self) -> &'static str {
            self.0
        }
        fn convert(&self, _: &Path, _: &Path) -> Result<ConvertedPdf, ConversionError> {
            Err(ConversionError::Engine("unused".into()))
        }
    }

    #[test]
    fn lookup_and_removal() {
        let reg = ConverterRegistry::empty()
            .with_converter(FileCategory::ConvertExcel, Arc::new(Named("excel")))
            .with_fallback(Arc::new(Named("text")));

        assert!(reg.is_available(FileCategory::ConvertExcel));
        assert!(!reg.is_available(FileCategory::ConvertWord));
        assert_eq!(reg.primary(FileCategory::ConvertExcel).unwrap().name(), "excel");
        assert_eq!(reg.fallback().unwrap().name(), "text");

        let reg = reg.without(FileCategory::ConvertExcel);
        assert!(reg.primary(FileCategory::ConvertExcel).is_none());
    }

    #[test]
    fn probe_is_cached() {
        let a = capabilities();
        let b = capabilities();
        assert_eq!(a, b);
        assert_eq!(a.excel, cfg!(feature = "excel"));
        assert_eq!(a.word, cfg!(feature = "word"));
    }

    #[test]
    fn detect_honours_fallback_flag() {
        assert!(ConverterRegistry::detect(false, None).fallback().is_none());
        assert_eq!(
            ConverterRegistry::detect(true, None).fallback().unwrap().name(),
            "text"
        );
    }

    #[test]
    fn details_facts() {
        let d = ConversionDetails {
            pages: 2,
            ..Default::default()
        }
        .fact("sheets", 3);
        assert_eq!(d.facts, vec![("sheets".to_string(), "3".to_string())]);
    }
}
