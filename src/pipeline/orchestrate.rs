//! Conversion orchestration: decide how a classified file reaches the
//! extraction service, converting it to PDF when it must.
//!
//! A `convert-*` file never passes through unconverted: it yields either a
//! real PDF artifact or a failed result. Converted PDFs live in a scratch
//! directory owned by the returned [`Artifact`], so they disappear when the
//! artifact is released or dropped, whatever happens downstream.

use crate::error::{ConversionError, FileError};
use crate::pipeline::classify::{FileCategory, InputFile};
use crate::pipeline::registry::{ConversionDetails, Converter, ConverterRegistry};
use crate::pipeline::scratch::{ScratchDir, ScratchSpace};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Route a file took to reach the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "lowercase")]
pub enum ConversionPath {
    /// Sent as-is.
    Direct,
    /// Converted to PDF by the category's converter.
    Converted { converter: String },
    /// Converted by the text fallback because the primary was missing.
    Fallback { converter: String },
}

/// A file ready for payload building.
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub mime: String,
    /// `false` for the original input, which is never deleted.
    pub is_temporary: bool,
    pub route: ConversionPath,
    pub details: Option<ConversionDetails>,
    scratch: Option<ScratchDir>,
}

impl Artifact {
    fn original(input: &InputFile) -> Self {
        Self {
            path: input.path.clone(),
            mime: input.mime.clone(),
            is_temporary: false,
            route: ConversionPath::Direct,
            details: None,
            scratch: None,
        }
    }

    /// Delete the temporary artifact now. No-op for originals.
    pub fn release(mut self) {
        if let Some(dir) = self.scratch.take() {
            dir.close();
        }
    }
}

/// Outcome of preparing one file.
#[derive(Debug)]
pub enum ConversionResult {
    Ready(Artifact),
    Failed(FileError),
}

/// Prepare `input` for extraction.
pub async fn prepare(
    input: &InputFile,
    registry: &ConverterRegistry,
    scratch: &ScratchSpace,
) -> ConversionResult {
    if input.category.is_native() {
        debug!("{} goes direct ({})", input.path.display(), input.category);
        return ConversionResult::Ready(Artifact::original(input));
    }

    if input.category == FileCategory::Unsupported {
        return ConversionResult::Failed(FileError::UnsupportedType {
            extension: input
                .extension
                .clone()
                .unwrap_or_else(|| "(none)".to_string()),
        });
    }

    let (converter, route) = match registry.primary(input.category) {
        Some(c) => {
            let route = ConversionPath::Converted {
                converter: c.name().to_string(),
            };
            (c, route)
        }
        None => match registry.fallback() {
            Some(c) => {
                warn!(
                    "No {} converter; falling back to {} for {}",
                    input.category.converter_label(),
                    c.name(),
                    input.path.display()
                );
                let route = ConversionPath::Fallback {
                    converter: c.name().to_string(),
                };
                (c, route)
            }
            None => {
                return ConversionResult::Failed(
                    ConversionError::Unavailable(input.category)
                        .into_file_error("none", &input.path),
                )
            }
        },
    };

    let dir = match scratch.acquire(&input.file_name()) {
        Ok(dir) => dir,
        Err(e) => {
            return ConversionResult::Failed(FileError::ConversionEngine {
                converter: converter.name().to_string(),
                detail: format!("cannot create scratch dir: {e}"),
            })
        }
    };

    let name = converter.name();
    match run_converter(converter, &input.path, dir.path()).await {
        Ok((path, details)) => {
            info!(
                "Converted {} via {} ({} pages)",
                input.path.display(),
                name,
                details.pages
            );
            ConversionResult::Ready(Artifact {
                path,
                mime: "application/pdf".to_string(),
                is_temporary: true,
                route,
                details: Some(details),
                scratch: Some(dir),
            })
        }
        Err(e) => {
            dir.close();
            ConversionResult::Failed(e.into_file_error(name, &input.path))
        }
    }
}

/// Run a converter on the blocking pool and check that it produced a PDF.
async fn run_converter(
    converter: Arc<dyn Converter>,
    input: &Path,
    out_dir: &Path,
) -> Result<(PathBuf, ConversionDetails), ConversionError> {
    let input = input.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    let name = converter.name();

    let converted = tokio::task::spawn_blocking(move || converter.convert(&input, &out_dir))
        .await
        .map_err(|e| ConversionError::Engine(format!("{name} converter panicked: {e}")))??;

    if !has_pdf_magic(&converted.path) {
        return Err(ConversionError::Engine(format!(
            "{name} converter did not produce a PDF at {}",
            converted.path.display()
        )));
    }
    Ok((converted.path, converted.details))
}

fn has_pdf_magic(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| &magic == b"%PDF")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::registry::ConvertedPdf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes a minimal PDF, or misbehaves on request.
    #[derive(Default)]
    struct Fake {
        calls: AtomicUsize,
        mode: FakeMode,
    }

    #[derive(Default, Clone, Copy)]
    enum FakeMode {
        #[default]
        Pdf,
        NotPdf,
        Panic,
        Fail,
    }

    impl Converter for Fake {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn convert(&self, input: &Path, out_dir: &Path) -> Result<ConvertedPdf, ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let path = out_dir.join(format!(
                "{}.pdf",
                input.file_stem().unwrap().to_string_lossy()
            ));
            match self.mode {
                FakeMode::Pdf => std::fs::write(&path, b"%PDF-1.4\n%%EOF")?,
                FakeMode::NotPdf => std::fs::write(&path, b"plain")?,
                FakeMode::Panic => panic!("converter exploded"),
                FakeMode::Fail => return Err(ConversionError::Engine("bad input".into())),
            }
            Ok(ConvertedPdf {
                path,
                details: ConversionDetails {
                    pages: 1,
                    ..Default::default()
                },
            })
        }
    }

    fn input(dir: &Path, name: &str) -> InputFile {
        let path = dir.join(name);
        std::fs::write(&path, b"content").unwrap();
        InputFile::inspect(&path).unwrap()
    }

    fn setup() -> (tempfile::TempDir, tempfile::TempDir, ScratchSpace) {
        let inputs = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(Some(root.path())).unwrap();
        (inputs, root, scratch)
    }

    fn leftovers(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn native_files_go_direct_and_are_never_temporary() {
        let (inputs, root, scratch) = setup();
        let file = input(inputs.path(), "notes.txt");

        match prepare(&file, &ConverterRegistry::empty(), &scratch).await {
            ConversionResult::Ready(a) => {
                assert!(!a.is_temporary);
                assert_eq!(a.route, ConversionPath::Direct);
                assert_eq!(a.path, file.path);
                a.release();
            }
            ConversionResult::Failed(e) => panic!("unexpected {e}"),
        }
        assert!(file.path.exists());
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn unsupported_touches_no_converter() {
        let (inputs, _root, scratch) = setup();
        let fake = Arc::new(Fake::default());
        let registry = ConverterRegistry::empty()
            .with_converter(FileCategory::ConvertExcel, fake.clone())
            .with_fallback(fake.clone());
        let file = input(inputs.path(), "notes.xyz");

        match prepare(&file, &registry, &scratch).await {
            ConversionResult::Failed(e) => assert_eq!(e.kind(), ErrorKind::UnsupportedType),
            ConversionResult::Ready(_) => panic!("should fail"),
        }
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_converter_without_fallback_is_unavailable() {
        let (inputs, root, scratch) = setup();
        let file = input(inputs.path(), "report.xlsx");

        match prepare(&file, &ConverterRegistry::empty(), &scratch).await {
            ConversionResult::Failed(e) => {
                assert_eq!(e.kind(), ErrorKind::ConverterUnavailable);
                assert!(e.to_string().contains("excel"));
            }
            ConversionResult::Ready(_) => panic!("should fail"),
        }
        assert_eq!(leftovers(root.path()), 0);
    }

    #[tokio::test]
    async fn converted_artifact_is_temporary_and_released() {
        let (inputs, root, scratch) = setup();
        let registry = ConverterRegistry::empty()
            .with_converter(FileCategory::ConvertWord, Arc::new(Fake::default()));
        let file = input(inputs.path(), "letter.docx");

        let artifact = match prepare(&file, &registry, &scratch).await {
            ConversionResult::Ready(a) => a,
            ConversionResult::Failed(e) => panic!("unexpected {e}"),
        };
        assert!(artifact.is_temporary);
        assert_eq!(artifact.mime, "application/pdf");
        assert_eq!(
            artifact.route,
            ConversionPath::Converted {
                converter: "fake".into()
            }
        );
        assert!(artifact.path.starts_with(root.path()));
        assert_eq!(leftovers(root.path()), 1);

        artifact.release();
        assert_eq!(leftovers(root.path()), 0);
        assert!(file.path.exists());
    }

    #[tokio::test]
    async fn fallback_is_used_when_primary_missing() {
        let (inputs, _root, scratch) = setup();
        let registry = ConverterRegistry::empty().with_fallback(Arc::new(Fake::default()));
        let file = input(inputs.path(), "report.xlsx");

        match prepare(&file, &registry, &scratch).await {
            ConversionResult::Ready(a) => assert!(matches!(a.route, ConversionPath::Fallback { .. })),
            ConversionResult::Failed(e) => panic!("unexpected {e}"),
        }
    }

    #[tokio::test]
    async fn converter_failures_are_typed_and_cleaned_up() {
        for mode in [FakeMode::NotPdf, FakeMode::Panic, FakeMode::Fail] {
            let (inputs, root, scratch) = setup();
            let registry = ConverterRegistry::empty().with_converter(
                FileCategory::ConvertExcel,
                Arc::new(Fake {
                    mode,
                    ..Default::default()
                }),
            );
            let file = input(inputs.path(), "report.xlsx");

            match prepare(&file, &registry, &scratch).await {
                ConversionResult::Failed(e) => {
                    assert_eq!(e.kind(), ErrorKind::ConversionEngineError)
                }
                ConversionResult::Ready(_) => panic!("should fail"),
            }
            assert_eq!(leftovers(root.path()), 0);
        }
    }
}
