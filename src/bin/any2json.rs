//! CLI binary for edgequake-any2json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_any2json::{
    capabilities, BatchCoordinator, BatchProgressCallback, BatchResult, ExtractionConfig,
    FileResult, PdfDelivery, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per finished file. Files finish out
/// of order, so start times are keyed by input index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_files} files…"))
        ));
    }

    fn on_file_start(&self, index: usize, input: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(short_name(input));
    }

    fn on_file_complete(&self, index: usize, input: &str, json_len: usize) {
        let secs = self.elapsed(index);
        self.bar.println(format!(
            "  {} {:<40}  {:<12}  {}",
            green("✓"),
            short_name(input),
            dim(&format!("{json_len:>6} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, input: &str, error: &str) {
        let secs = self.elapsed(index);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            short_name(input),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total_files: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

fn short_name(input: &str) -> String {
    Path::new(input)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a mixed batch; one <name>.json per success in ./out
  any2json invoice.pdf ledger.xlsx letter.docx scan.png -o out

  # Every file in a directory, eight at a time
  any2json ./inbox -c 8 -o out

  # Custom extraction instructions
  any2json --prompt-file schema.txt receipts/*.jpg -o out

  # Route files without a converter through text extraction
  any2json --text-fallback legacy.rtf notes.log -o out

  # Whole batch result (entries + stats) as JSON on stdout
  any2json --json report.xlsx > batch.json

  # Show which converters and renderers this build can use
  any2json --capabilities

FILE ROUTES:
  pdf, png, jpg, gif, webp, heic                 sent as-is
  txt, md, csv, tsv, json, xml, html, yaml, log  inlined as text
  xlsx, xlsm, xlsb, xls, ods                     converted to PDF (feature excel)
  docx                                           converted to PDF (feature word)
  anything else                                  UnsupportedType

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred; reads PDFs natively)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium, for --pdf-delivery rasterise
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract structured JSON from documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "any2json",
    version,
    about = "Extract structured JSON from any document using LLMs",
    long_about = "Extract one JSON object per input document (PDFs, images, text, spreadsheets, \
Word files; local paths or URLs). Spreadsheets and Word files are converted to PDF first. \
Supports Gemini, OpenAI, Anthropic and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files, directories (non-recursive) or HTTP/HTTPS URLs.
    #[arg(required_unless_present = "capabilities")]
    inputs: Vec<String>,

    /// Write `<name>.json` per successful file into this directory.
    #[arg(short, long, env = "ANY2JSON_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Files processed at once.
    #[arg(short, long, env = "ANY2JSON_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Corrective follow-ups after malformed JSON.
    #[arg(long, env = "ANY2JSON_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ANY2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "ANY2JSON_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Extra output tokens reserved for model reasoning.
    #[arg(long, env = "ANY2JSON_REASONING_BUDGET")]
    reasoning_budget: Option<usize>,

    /// Text file with extraction instructions replacing the built-in prompt.
    #[arg(long, env = "ANY2JSON_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Use text extraction when a file's converter is unavailable.
    #[arg(long, env = "ANY2JSON_TEXT_FALLBACK")]
    text_fallback: bool,

    /// Worksheet to render (repeatable). Default: every sheet.
    #[arg(long = "sheet", env = "ANY2JSON_SHEETS", value_delimiter = ',')]
    sheets: Vec<String>,

    /// How PDFs reach the model: native or rasterise.
    #[arg(long, env = "ANY2JSON_PDF_DELIVERY", default_value = "native")]
    pdf_delivery: PdfDelivery,

    /// Page cap when rasterising.
    #[arg(long, env = "ANY2JSON_MAX_PAGES", default_value_t = 50)]
    max_pages: usize,

    /// Root for intermediate files.
    #[arg(long, env = "ANY2JSON_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Print the whole batch result as JSON on stdout.
    #[arg(long, env = "ANY2JSON_JSON")]
    json: bool,

    /// Print converter and renderer availability, then exit.
    #[arg(long)]
    capabilities: bool,

    /// Disable progress bar.
    #[arg(long, env = "ANY2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ANY2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ANY2JSON_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "ANY2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "ANY2JSON_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Capabilities mode ────────────────────────────────────────────────
    if cli.capabilities {
        let caps = capabilities();
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&caps).context("Failed to serialise capabilities")?
            );
        } else {
            let mark = |ok: bool| if ok { green("✓") } else { red("✗") };
            println!("Excel converter:  {}", mark(caps.excel));
            println!("Word converter:   {}", mark(caps.word));
            println!("PDF rasteriser:   {}", mark(caps.rasteriser));
            println!("Text fallback:    {}", mark(true));
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let inputs = expand_inputs(&cli.inputs)?;
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let coordinator = BatchCoordinator::new(config).context("Cannot start extraction")?;

    // ── Ctrl-C stops scheduling; in-flight files finish ──────────────────
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} cancelling: waiting for in-flight files…", cyan("⚠"));
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let batch = coordinator
        .run_with_cancel(&inputs, &cancel)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&batch).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&batch, show_progress);
    }

    if batch.stats.failed > 0 {
        std::process::exit(2);
    }
    Ok(())
}

/// Expand directories into their regular files (sorted, non-recursive).
fn expand_inputs(raw: &[String]) -> Result<Vec<String>> {
    let mut inputs = Vec::new();
    for item in raw {
        let path = Path::new(item);
        if !item.starts_with("http://") && !item.starts_with("https://") && path.is_dir() {
            let mut files: Vec<String> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to list directory {item}"))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            files.sort();
            inputs.extend(files);
        } else {
            inputs.push(item.clone());
        }
    }
    Ok(inputs)
}

fn print_summary(batch: &BatchResult, show_progress: bool) {
    if !show_progress {
        for entry in batch.iter() {
            match &entry.result {
                FileResult::Success { metadata, .. } => eprintln!(
                    "{} {}{}",
                    green("✓"),
                    entry.input,
                    metadata
                        .output_path
                        .as_ref()
                        .map(|p| format!("  →  {}", p.display()))
                        .unwrap_or_default()
                ),
                FileResult::Error {
                    kind, stage, message, ..
                } => eprintln!("{} {}  [{kind} @ {stage}] {message}", red("✗"), entry.input),
            }
        }
    }

    let s = &batch.stats;
    eprintln!(
        "{}  {}/{} files  {}  {}ms",
        if s.failed == 0 { green("✔") } else { cyan("⚠") },
        bold(&s.succeeded.to_string()),
        s.total_files,
        dim(&format!(
            "{} converted, {} LLM calls, {} cancelled",
            s.converted, s.extraction_calls, s.cancelled
        )),
        s.total_ms,
    );
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .text_fallback(cli.text_fallback)
        .pdf_delivery(cli.pdf_delivery)
        .max_pages(cli.max_pages)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(tokens) = cli.reasoning_budget {
        builder = builder.reasoning_budget(tokens);
    }
    if !cli.sheets.is_empty() {
        builder = builder.excel_sheets(cli.sheets.clone());
    }
    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_root(dir);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
