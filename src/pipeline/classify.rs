//! Type classification: decide how a file reaches the extraction service.
//!
//! The decision is extension-first. Only when a file has no extension do we
//! look at content, and then only at the first [`SNIFF_LEN`] bytes, so the
//! cost is constant regardless of file size. Zip and OLE containers are
//! deliberately *not* resolved by sniffing: xlsx and docx share the same zip
//! magic and telling them apart means walking the central directory.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum number of bytes read when sniffing an extension-less file.
pub const SNIFF_LEN: usize = 512;

/// How a file is routed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileCategory {
    NativePdf,
    NativeImage,
    NativeText,
    ConvertExcel,
    ConvertWord,
    Unsupported,
}

impl FileCategory {
    /// Native categories go to the extraction service without conversion.
    pub fn is_native(self) -> bool {
        matches!(
            self,
            FileCategory::NativePdf | FileCategory::NativeImage | FileCategory::NativeText
        )
    }

    /// Short name of the converter a `convert-*` category needs.
    pub fn converter_label(self) -> &'static str {
        match self {
            FileCategory::ConvertExcel => "excel",
            FileCategory::ConvertWord => "word",
            _ => "none",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::NativePdf => "native-pdf",
            FileCategory::NativeImage => "native-image",
            FileCategory::NativeText => "native-text",
            FileCategory::ConvertExcel => "convert-excel",
            FileCategory::ConvertWord => "convert-word",
            FileCategory::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-cased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Map an extension to a category. Pure; no I/O.
///
/// Returns `None` only when the path has no extension at all. A present but
/// unknown extension is [`FileCategory::Unsupported`].
pub fn classify_extension(path: &Path) -> Option<FileCategory> {
    let ext = extension_of(path)?;
    let category = match ext.as_str() {
        "pdf" => FileCategory::NativePdf,
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "heic" | "heif" => FileCategory::NativeImage,
        "txt" | "csv" | "tsv" | "md" | "markdown" | "json" | "xml" | "html" | "htm" | "rtf"
        | "log" | "yaml" | "yml" => FileCategory::NativeText,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => FileCategory::ConvertExcel,
        "docx" | "doc" => FileCategory::ConvertWord,
        _ => FileCategory::Unsupported,
    };
    Some(category)
}

/// Classify from leading bytes. Pure; the caller supplies at most
/// [`SNIFF_LEN`] bytes.
///
/// Returns the category and the MIME type the bytes imply.
pub fn sniff(head: &[u8]) -> (FileCategory, &'static str) {
    if head.starts_with(b"%PDF") {
        return (FileCategory::NativePdf, "application/pdf");
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        return (FileCategory::NativeImage, "image/png");
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return (FileCategory::NativeImage, "image/jpeg");
    }
    if head.starts_with(b"GIF8") {
        return (FileCategory::NativeImage, "image/gif");
    }
    if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return (FileCategory::NativeImage, "image/webp");
    }
    // Zip (docx/xlsx/odt…) and OLE (doc/xls) containers are ambiguous here.
    if head.starts_with(b"PK\x03\x04") || head.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return (FileCategory::Unsupported, "application/octet-stream");
    }
    if !head.is_empty() && !head.contains(&0) && looks_like_utf8(head) {
        return (FileCategory::NativeText, "text/plain");
    }
    (FileCategory::Unsupported, "application/octet-stream")
}

/// UTF-8 check tolerant of a multi-byte sequence cut off by the sniff window.
fn looks_like_utf8(head: &[u8]) -> bool {
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && head.len() - e.valid_up_to() < 4,
    }
}

/// Classify a path: extension first, content sniffing as the fallback.
///
/// Reads at most [`SNIFF_LEN`] bytes, and only for extension-less paths.
/// An unreadable extension-less file is [`FileCategory::Unsupported`].
pub fn classify(path: &Path) -> FileCategory {
    if let Some(category) = classify_extension(path) {
        return category;
    }
    match read_head(path) {
        Ok(head) => sniff(&head).0,
        Err(_) => FileCategory::Unsupported,
    }
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let f = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    f.take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// An input file after inspection. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    /// Absolute path; the file's identity.
    pub path: PathBuf,
    /// Size in bytes at inspection time.
    pub size_bytes: u64,
    /// Detected MIME type.
    pub mime: String,
    /// Lower-cased extension, if any.
    pub extension: Option<String>,
    pub category: FileCategory,
}

impl InputFile {
    /// Stat and classify `path`.
    pub fn inspect(path: &Path) -> Result<Self, FileError> {
        let meta = std::fs::metadata(path).map_err(|e| FileError::SourceUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if !meta.is_file() {
            return Err(FileError::SourceUnreadable {
                path: path.to_path_buf(),
                detail: "not a regular file".into(),
            });
        }

        let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let extension = extension_of(path);

        let (category, mime) = match classify_extension(path) {
            Some(category) => {
                let mime = mime_guess::from_path(path)
                    .first()
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                (category, mime)
            }
            None => {
                let head = read_head(path).map_err(|e| FileError::SourceUnreadable {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })?;
                let (category, mime) = sniff(&head);
                (category, mime.to_string())
            }
        };

        debug!(
            "Classified {} as {} ({}, {} bytes)",
            abs.display(),
            category,
            mime,
            meta.len()
        );

        Ok(Self {
            path: abs,
            size_bytes: meta.len(),
            mime,
            extension,
            category,
        })
    }

    /// File name for display and output naming.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_table() {
        let cases = [
            ("scan.pdf", FileCategory::NativePdf),
            ("SCAN.PDF", FileCategory::NativePdf),
            ("photo.jpeg", FileCategory::NativeImage),
            ("photo.webp", FileCategory::NativeImage),
            ("data.csv", FileCategory::NativeText),
            ("notes.md", FileCategory::NativeText),
            ("report.xlsx", FileCategory::ConvertExcel),
            ("legacy.xls", FileCategory::ConvertExcel),
            ("sheet.ods", FileCategory::ConvertExcel),
            ("letter.docx", FileCategory::ConvertWord),
            ("notes.xyz", FileCategory::Unsupported),
            ("notes.unknownext", FileCategory::Unsupported),
            ("archive.tar.gz", FileCategory::Unsupported),
        ];
        for (name, expected) in cases {
            assert_eq!(
                classify_extension(Path::new(name)),
                Some(expected),
                "{name}"
            );
        }
        assert_eq!(classify_extension(Path::new("Makefile")), None);
    }

    #[test]
    fn sniff_magic_bytes() {
        assert_eq!(sniff(b"%PDF-1.7\n").0, FileCategory::NativePdf);
        assert_eq!(sniff(&[0x89, b'P', b'N', b'G', 0x0D]).0, FileCategory::NativeImage);
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]).1, "image/jpeg");
        assert_eq!(sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 ").1, "image/webp");
        assert_eq!(sniff(b"PK\x03\x04rest").0, FileCategory::Unsupported);
        assert_eq!(sniff(b"hello, world\n").0, FileCategory::NativeText);
        assert_eq!(sniff(b"bin\x00ary").0, FileCategory::Unsupported);
        assert_eq!(sniff(b"").0, FileCategory::Unsupported);
    }

    #[test]
    fn sniff_tolerates_truncated_utf8_tail() {
        // "é" is 0xC3 0xA9; cut after the first byte.
        let head = [b'c', b'a', b'f', 0xC3];
        assert_eq!(sniff(&head).0, FileCategory::NativeText);
    }

    #[test]
    fn classify_sniffs_extensionless_files() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("download");
        std::fs::write(&pdf, b"%PDF-1.4\n%rest").unwrap();
        assert_eq!(classify(&pdf), FileCategory::NativePdf);

        let text = dir.path().join("README");
        let mut f = std::fs::File::create(&text).unwrap();
        writeln!(f, "plain words").unwrap();
        assert_eq!(classify(&text), FileCategory::NativeText);

        assert_eq!(classify(&dir.path().join("missing")), FileCategory::Unsupported);
    }

    #[test]
    fn inspect_records_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("data.csv");
        std::fs::write(&csv, "a,b\n1,2\n").unwrap();

        let input = InputFile::inspect(&csv).unwrap();
        assert!(input.path.is_absolute());
        assert_eq!(input.size_bytes, 8);
        assert_eq!(input.category, FileCategory::NativeText);
        assert_eq!(input.mime, "text/csv");
        assert_eq!(input.extension.as_deref(), Some("csv"));
        assert_eq!(input.file_name(), "data.csv");
    }

    #[test]
    fn inspect_missing_file_is_unreadable() {
        let err = InputFile::inspect(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SourceUnreadable);
    }

    #[test]
    fn category_serialises_kebab_case() {
        let s = serde_json::to_string(&FileCategory::ConvertExcel).unwrap();
        assert_eq!(s, "\"convert-excel\"");
    }
}
