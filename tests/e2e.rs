//! End-to-end tests for edgequake-any2json against a live provider.
//!
//! Fixtures are generated on the fly (plain text, CSV, Markdown, a Word
//! file), so no sample documents need to be downloaded. The
//! live tests are gated behind `E2E_ENABLED` and need a provider key such as
//! `GEMINI_API_KEY`.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use edgequake_any2json::{
    extract_batch, extract_file, BatchProgressCallback, ErrorKind, ExtractionConfig, FileResult,
    NoopProgressCallback,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn live_config() -> ExtractionConfig {
    ExtractionConfig::builder()
        .concurrency(2)
        .max_retries(2)
        .text_fallback(true)
        .build()
        .expect("valid config")
}

fn print_result(label: &str, result: &FileResult) {
    match result {
        FileResult::Success { json, metadata } => {
            println!(
                "[{label}] {} attempt(s), {}ms\n{}",
                metadata.attempts.len(),
                metadata.total_ms,
                serde_json::to_string_pretty(json).unwrap()
            );
        }
        FileResult::Error { kind, message, .. } => println!("[{label}] {kind}: {message}"),
    }
}

// ── Live extraction ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_extract_invoice_text() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "invoice.txt",
        "INVOICE #2024-117\nBill to: Acme Corp\n\n\
         Widget x3   29.97\nGadget x1   15.00\n\nTOTAL DUE: 44.97 EUR\n",
    );

    let result = extract_file(path.to_str().unwrap(), &live_config())
        .await
        .expect("provider must be configured");
    print_result("invoice", &result);

    let json = result.json().expect("extraction should succeed");
    assert!(json.is_object());
    let text = json.to_string();
    assert!(text.contains("44.97"), "total should survive extraction: {text}");
}

#[tokio::test]
async fn test_extract_csv_via_inline_text() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "employees.csv",
        "name,role,start\nAda,engineer,2021-03-01\nGrace,manager,2019-07-15\n",
    );

    let result = extract_file(path.to_str().unwrap(), &live_config())
        .await
        .unwrap();
    print_result("csv", &result);
    assert!(result.json().unwrap().to_string().contains("Grace"));
}

#[cfg(feature = "word")]
#[tokio::test]
async fn test_extract_converted_docx() {
    use docx_rs::{Docx, Paragraph, Run};

    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minutes.docx");
    let para = |t: &str| Paragraph::new().add_run(Run::new().add_text(t));
    Docx::new()
        .add_paragraph(para("Board minutes, 12 May").style("Heading1"))
        .add_paragraph(para("Attendees: Ng, Osei, Park"))
        .add_paragraph(para("Decision: approve the 2025 budget"))
        .build()
        .pack(std::fs::File::create(&path).unwrap())
        .unwrap();

    let result = extract_file(path.to_str().unwrap(), &live_config())
        .await
        .unwrap();
    print_result("docx", &result);
    assert!(result.is_success(), "{result:?}");
    assert!(result.json().unwrap().to_string().contains("Osei"));
}

#[tokio::test]
async fn test_mixed_batch_keeps_order_and_isolates_failures() {
    e2e_skip_unless_enabled!();
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.txt", "Order 55: 2 chairs, 1 table.");
    let b = write(dir.path(), "b.unknown_ext", "opaque");
    let c = write(dir.path(), "c.md", "# Trip\n\n- Lisbon, 3 nights\n- Porto, 2 nights\n");

    let mut config = live_config();
    config.text_fallback = false;
    config.output_dir = Some(out.path().to_path_buf());

    let inputs = vec![
        a.to_string_lossy().into_owned(),
        b.to_string_lossy().into_owned(),
        c.to_string_lossy().into_owned(),
    ];
    let batch = extract_batch(&inputs, &config).await.unwrap();
    for entry in batch.iter() {
        print_result(&entry.input, &entry.result);
    }

    assert_eq!(batch.len(), 3);
    assert!(batch.entries[0].result.is_success());
    assert_eq!(
        batch.entries[1].result.error_kind(),
        Some(ErrorKind::UnsupportedType)
    );
    assert!(batch.entries[2].result.is_success());
    assert!(out.path().join("a.txt.json").exists());
    assert!(out.path().join("c.md.json").exists());
}

// ── Structural tests (no API calls, always run) ──────────────────────────────

/// `Arc<dyn BatchProgressCallback>` must move into spawned tasks.
#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    struct ErrorLogger {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl BatchProgressCallback for ErrorLogger {
        fn on_file_error(&self, _index: usize, input: &str, error: &str) {
            self.log.lock().unwrap().push(format!("{input}: {error}"));
        }
    }

    let log = Arc::new(Mutex::new(vec![]));
    let cb: Arc<dyn BatchProgressCallback> = Arc::new(ErrorLogger {
        log: Arc::clone(&log),
    });

    tokio::spawn(async move {
        cb.on_file_error(1, "b.xyz", "no extraction route");
    })
    .await
    .expect("spawn must succeed");

    assert_eq!(*log.lock().unwrap(), vec!["b.xyz: no extraction route"]);
}

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();

    let cb: Arc<dyn BatchProgressCallback> = Arc::new(NoopProgressCallback);
    cb.on_file_error(0, "a.pdf", "an error");
}

#[test]
fn test_config_accepts_provider_and_model() {
    let config = ExtractionConfig::builder()
        .provider_name("gemini")
        .model("gemini-2.5-flash")
        .build()
        .expect("builder must succeed");
    assert_eq!(config.provider_name.as_deref(), Some("gemini"));
    assert_eq!(config.model.as_deref(), Some("gemini-2.5-flash"));
}
