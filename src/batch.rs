//! Batch coordination: many inputs, one independent pipeline each.
//!
//! Every input runs classify → prepare → encode → extract → validate inside
//! its own failure boundary; whatever goes wrong becomes that input's
//! `FileResult::Error` and nothing else is affected. Only conditions that make
//! the whole batch meaningless (no provider, no scratch root, unwritable
//! output directory) surface as [`Any2JsonError`].

use crate::config::{ExtractionConfig, PdfDelivery};
use crate::error::{Any2JsonError, ErrorKind, FileError, Stage};
use crate::output::{BatchEntry, BatchResult, BatchStats, FileMetadata, FileResult};
use crate::pipeline::classify::InputFile;
use crate::pipeline::encode::{encode_file, EncodeOptions};
use crate::pipeline::input::resolve_input;
use crate::pipeline::llm::{ExtractionClient, LlmExtractionClient, ServiceHints};
use crate::pipeline::orchestrate::{prepare, ConversionResult};
use crate::pipeline::registry::{capabilities, ConverterRegistry};
use crate::pipeline::scratch::ScratchSpace;
use crate::pipeline::validate::{extract_validated, RetryPolicy};
use crate::prompts::system_prompt;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs extraction batches against one resolved provider.
///
/// Cheap to clone; clones share the client, registry and scratch root.
#[derive(Clone)]
pub struct BatchCoordinator {
    config: ExtractionConfig,
    client: Arc<dyn ExtractionClient>,
    registry: ConverterRegistry,
    scratch: ScratchSpace,
    prompt: Arc<str>,
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("scratch", &self.scratch)
            .finish()
    }
}

impl BatchCoordinator {
    /// Resolve the provider and converters from `config`.
    pub fn new(config: ExtractionConfig) -> Result<Self, Any2JsonError> {
        let provider = resolve_provider(&config)?;
        let client = Arc::new(LlmExtractionClient::new(provider, config.api_timeout_secs));
        let registry =
            ConverterRegistry::detect(config.text_fallback, config.excel_sheets.clone());
        Self::with_parts(config, client, registry)
    }

    /// Assemble a coordinator from an explicit client and registry.
    pub fn with_parts(
        config: ExtractionConfig,
        client: Arc<dyn ExtractionClient>,
        registry: ConverterRegistry,
    ) -> Result<Self, Any2JsonError> {
        if config.pdf_delivery == PdfDelivery::Rasterise && !capabilities().rasteriser {
            return Err(Any2JsonError::RasteriserUnavailable);
        }

        let scratch = ScratchSpace::new(config.temp_root.as_deref()).map_err(|source| {
            Any2JsonError::ScratchUnavailable {
                path: config
                    .temp_root
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("any2json")),
                source,
            }
        })?;

        if let Some(dir) = &config.output_dir {
            ensure_writable(dir)?;
        }

        let prompt: Arc<str> = system_prompt(config.prompt.as_deref()).into();
        debug!("Batch coordinator ready: {:?}", registry);

        Ok(Self {
            config,
            client,
            registry,
            scratch,
            prompt,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Process every input; one entry per input, in input order.
    pub async fn run<S: AsRef<str>>(&self, inputs: &[S]) -> Result<BatchResult, Any2JsonError> {
        let never = AtomicBool::new(false);
        self.run_with_cancel(inputs, &never).await
    }

    /// Like [`run`](Self::run), but stops scheduling new files once `cancel`
    /// is raised. Files already in flight finish; the rest get a `Cancelled`
    /// entry.
    pub async fn run_with_cancel<S: AsRef<str>>(
        &self,
        inputs: &[S],
        cancel: &AtomicBool,
    ) -> Result<BatchResult, Any2JsonError> {
        let start = Instant::now();
        let total = inputs.len();
        info!(
            "Starting batch of {} files (concurrency {})",
            total, self.config.concurrency
        );
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let mut indexed: Vec<(usize, BatchEntry)> =
            stream::iter(inputs.iter().enumerate().map(|(index, input)| {
                let input = input.as_ref().to_string();
                async move {
                    let result = if cancel.load(Ordering::SeqCst) {
                        self.report_cancelled(index, &input)
                    } else {
                        self.process_file(index, &input).await
                    };
                    (index, BatchEntry { input, result })
                }
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);
        let mut entries: Vec<BatchEntry> = indexed.into_iter().map(|(_, e)| e).collect();

        if let Some(dir) = &self.config.output_dir {
            persist(dir, &mut entries).await?;
        }

        let stats = BatchStats::tally(&entries, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {}/{} succeeded, {} failed ({} cancelled), {}ms",
            stats.succeeded, stats.total_files, stats.failed, stats.cancelled, stats.total_ms
        );
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_complete(total, stats.succeeded);
        }

        Ok(BatchResult { entries, stats })
    }

    fn report_cancelled(&self, index: usize, input: &str) -> FileResult {
        let result = FileResult::failed(FileError::Cancelled, Stage::Schedule, None);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_file_error(index, input, &FileError::Cancelled.to_string());
        }
        result
    }

    /// Run one input's pipeline, reporting progress.
    pub(crate) async fn process_file(&self, index: usize, input: &str) -> FileResult {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_file_start(index, input);
        }
        let result = self.pipeline(input).await;
        match &result {
            FileResult::Success { json, .. } => {
                info!("{}: extracted", input);
                if let Some(cb) = &self.config.progress_callback {
                    let len = serde_json::to_string(json).map(|s| s.len()).unwrap_or(0);
                    cb.on_file_complete(index, input, len);
                }
            }
            FileResult::Error {
                kind, stage, message, ..
            } => {
                warn!("{}: {} at {} stage: {}", input, kind, stage, message);
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_file_error(index, input, message);
                }
            }
        }
        result
    }

    async fn pipeline(&self, input: &str) -> FileResult {
        let start = Instant::now();

        let resolved =
            match resolve_input(input, &self.scratch, self.config.download_timeout_secs).await {
                Ok(r) => r,
                Err(e) => return FileResult::failed(e, Stage::Classify, None),
            };

        let file = match InputFile::inspect(resolved.path()) {
            Ok(f) => f,
            Err(e) => {
                resolved.release();
                return FileResult::failed(e, Stage::Classify, None);
            }
        };

        let artifact = match prepare(&file, &self.registry, &self.scratch).await {
            ConversionResult::Ready(a) => a,
            ConversionResult::Failed(e) => {
                resolved.release();
                let stage = stage_for(e.kind());
                return FileResult::failed(e, stage, Some(file.category));
            }
        };
        let convert_ms = start.elapsed().as_millis() as u64;

        let extract_start = Instant::now();
        let opts = EncodeOptions {
            pdf_delivery: self.config.pdf_delivery,
            max_pages: self.config.max_pages,
            max_rendered_pixels: self.config.max_rendered_pixels,
        };
        let payload = match encode_file(&artifact.path, &artifact.mime, &file.file_name(), opts)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                artifact.release();
                resolved.release();
                let stage = stage_for(e.kind());
                return FileResult::failed(e, stage, Some(file.category));
            }
        };
        debug!("{}: payload ~{} bytes", input, payload.size_hint());

        let hints = ServiceHints {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            reasoning_budget: self.config.reasoning_budget,
            ..ServiceHints::default()
        };
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
        };
        let validated =
            extract_validated(self.client.as_ref(), &payload, &self.prompt, hints, policy).await;
        let extract_ms = extract_start.elapsed().as_millis() as u64;

        let conversion = artifact.route.clone();
        let conversion_details = artifact.details.clone();
        artifact.release();
        resolved.release();

        match validated.outcome {
            Ok(json) => FileResult::Success {
                json: json.into_value(),
                metadata: FileMetadata {
                    source_name: file.file_name(),
                    category: file.category,
                    mime: file.mime.clone(),
                    size_bytes: file.size_bytes,
                    conversion,
                    conversion_details,
                    attempts: validated.attempts,
                    convert_ms,
                    extract_ms,
                    total_ms: start.elapsed().as_millis() as u64,
                    output_path: None,
                },
            },
            Err(e) => {
                let stage = stage_for(e.kind());
                FileResult::failed(e, stage, Some(file.category))
            }
        }
    }
}

fn stage_for(kind: ErrorKind) -> Stage {
    match kind {
        ErrorKind::UnsupportedType | ErrorKind::SourceUnreadable => Stage::Classify,
        ErrorKind::ConverterUnavailable | ErrorKind::ConversionEngineError => Stage::Convert,
        ErrorKind::ServiceError => Stage::Extract,
        ErrorKind::InvalidJsonOutput => Stage::Validate,
        ErrorKind::Cancelled => Stage::Schedule,
    }
}

// ── Provider resolution ─────────────────────────────────────────────────

fn default_model(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some("gemini-2.5-flash"),
        "openai" => Some("gpt-4.1-mini"),
        "anthropic" => Some("claude-sonnet-4-5"),
        _ => None,
    }
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Any2JsonError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        Any2JsonError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is;
/// 2. `config.provider_name` with `config.model` (or the provider's default);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. Gemini when `GEMINI_API_KEY` is set, since it reads PDFs natively;
/// 5. whatever `ProviderFactory::from_env` detects.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, Any2JsonError> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(name) = &config.provider_name {
        let model = match (config.model.as_deref(), default_model(name)) {
            (Some(m), _) => m,
            (None, Some(m)) => m,
            (None, None) => {
                return Err(Any2JsonError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: "No default model for this provider; set a model explicitly.".into(),
                })
            }
        };
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config
            .model
            .as_deref()
            .or(default_model("gemini"))
            .unwrap_or("gemini-2.5-flash");
        return create_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Any2JsonError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

// ── Persistence ─────────────────────────────────────────────────────────

fn ensure_writable(dir: &Path) -> Result<(), Any2JsonError> {
    let fail = |source| Any2JsonError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(fail)?;
    tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    Ok(())
}

/// `{name}.json`, then `{name}-2.json`, `{name}-3.json`, … for repeats.
fn output_name(source_name: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = format!("{source_name}.json");
    let mut n = 1;
    while !taken.insert(candidate.clone()) {
        n += 1;
        candidate = format!("{source_name}-{n}.json");
    }
    candidate
}

async fn persist(dir: &Path, entries: &mut [BatchEntry]) -> Result<(), Any2JsonError> {
    let mut taken = HashSet::new();
    for entry in entries.iter_mut() {
        let FileResult::Success { json, metadata } = &mut entry.result else {
            continue;
        };
        let path = dir.join(output_name(&metadata.source_name, &mut taken));
        let body = serde_json::to_string_pretty(json)
            .map_err(|e| Any2JsonError::Internal(format!("serialise {}: {e}", entry.input)))?;
        write_atomic(&path, body.as_bytes()).await?;
        debug!("Wrote {}", path.display());
        metadata.output_path = Some(path);
    }
    Ok(())
}

/// Write via a temp file and rename, so readers never see partial JSON.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Any2JsonError> {
    let fail = |source| Any2JsonError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp, path).await.map_err(fail)?;
    Ok(())
}

// ── Convenience entry points ────────────────────────────────────────────

/// Extract every input with a coordinator built from `config`.
pub async fn extract_batch<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<BatchResult, Any2JsonError> {
    BatchCoordinator::new(config.clone())?.run(inputs).await
}

/// Extract a single input.
pub async fn extract_file(
    input: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<FileResult, Any2JsonError> {
    let mut batch = extract_batch(&[input.as_ref()], config).await?;
    batch
        .entries
        .pop()
        .map(|e| e.result)
        .ok_or_else(|| Any2JsonError::Internal("empty batch result".into()))
}

/// Synchronous wrapper around [`extract_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_batch_sync<S: AsRef<str>>(
    inputs: &[S],
    config: &ExtractionConfig,
) -> Result<BatchResult, Any2JsonError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Any2JsonError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_batch(inputs, config))
}
