//! Configuration for batch extraction.
//!
//! Every knob lives in [`ExtractionConfig`], built through
//! [`ExtractionConfigBuilder`]. The config is passed explicitly to the batch
//! coordinator; nothing in the library reads global mutable settings.

use crate::error::Any2JsonError;
use crate::progress::BatchProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an extraction batch.
///
/// # Example
/// ```rust
/// use edgequake_any2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .concurrency(8)
///     .max_retries(1)
///     .text_fallback(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Files processed at once. Default: 4.
    pub concurrency: usize,

    /// Model name, used with `provider_name`.
    pub model: Option<String>,

    /// Provider name (`gemini`, `openai`, `anthropic`, …).
    pub provider_name: Option<String>,

    /// Pre-built provider; takes priority over every other provider setting.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction wants the same document to yield the same object, so this
    /// stays close to 0.
    pub temperature: f32,

    /// Output token ceiling per call. Default: 8192.
    pub max_tokens: usize,

    /// Corrective follow-ups after malformed output. Default: 2.
    pub max_retries: u32,

    /// Extra output tokens reserved for model reasoning. Default: none.
    pub reasoning_budget: Option<usize>,

    /// Extraction instructions replacing the built-in prompt.
    pub prompt: Option<String>,

    /// Route files whose converter is missing through text extraction.
    /// Default: false.
    pub text_fallback: bool,

    /// Worksheets to render from spreadsheets, by name. Default: all.
    pub excel_sheets: Option<Vec<String>>,

    /// How PDFs reach the service. Default: [`PdfDelivery::Native`].
    pub pdf_delivery: PdfDelivery,

    /// Page cap when rasterising. Default: 50.
    pub max_pages: usize,

    /// Longest rendered edge in pixels when rasterising. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Root for intermediate artifacts. Default: `$TMPDIR/any2json`.
    pub temp_root: Option<PathBuf>,

    /// Where `{name}.json` results are written. Default: not persisted.
    pub output_dir: Option<PathBuf>,

    /// Per-call service timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Timeout for downloading URL inputs. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-file progress events.
    pub progress_callback: Option<Arc<dyn BatchProgressCallback>>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 2,
            reasoning_budget: None,
            prompt: None,
            text_fallback: false,
            excel_sheets: None,
            pdf_delivery: PdfDelivery::default(),
            max_pages: 50,
            max_rendered_pixels: 2000,
            temp_root: None,
            output_dir: None,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("reasoning_budget", &self.reasoning_budget)
            .field("text_fallback", &self.text_fallback)
            .field("excel_sheets", &self.excel_sheets)
            .field("pdf_delivery", &self.pdf_delivery)
            .field("temp_root", &self.temp_root)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn reasoning_budget(mut self, tokens: usize) -> Self {
        self.config.reasoning_budget = Some(tokens);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn text_fallback(mut self, v: bool) -> Self {
        self.config.text_fallback = v;
        self
    }

    pub fn excel_sheets(mut self, sheets: Vec<String>) -> Self {
        self.config.excel_sheets = Some(sheets);
        self
    }

    pub fn pdf_delivery(mut self, delivery: PdfDelivery) -> Self {
        self.config.pdf_delivery = delivery;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Any2JsonError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Any2JsonError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Any2JsonError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Any2JsonError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if matches!(&c.excel_sheets, Some(s) if s.is_empty()) {
            return Err(Any2JsonError::InvalidConfig(
                "excel_sheets must name at least one sheet".into(),
            ));
        }
        Ok(self.config)
    }
}

/// How PDF content reaches the extraction service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfDelivery {
    /// Attach the PDF itself. (default)
    #[default]
    Native,
    /// Render pages to PNG first, for providers that only take images.
    Rasterise,
}

impl std::str::FromStr for PdfDelivery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "pdf" => Ok(PdfDelivery::Native),
            "rasterise" | "rasterize" | "images" => Ok(PdfDelivery::Rasterise),
            other => Err(format!("unknown PDF delivery '{other}' (native | rasterise)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.temperature, 0.1);
        assert!(!c.text_fallback);
        assert_eq!(c.pdf_delivery, PdfDelivery::Native);
    }

    #[test]
    fn builder_clamps() {
        let c = ExtractionConfig::builder()
            .concurrency(0)
            .temperature(9.0)
            .max_rendered_pixels(5)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_rendered_pixels, 100);
    }

    #[test]
    fn builder_rejects_nonsense() {
        assert!(ExtractionConfig::builder().max_tokens(0).build().is_err());
        assert!(ExtractionConfig::builder()
            .excel_sheets(Vec::new())
            .build()
            .is_err());
    }

    #[test]
    fn pdf_delivery_parses() {
        assert_eq!("Rasterize".parse::<PdfDelivery>(), Ok(PdfDelivery::Rasterise));
        assert_eq!("native".parse::<PdfDelivery>(), Ok(PdfDelivery::Native));
        assert!("fax".parse::<PdfDelivery>().is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", ExtractionConfig::default());
        assert!(s.contains("provider: None"));
    }
}
