//! Input resolution: a caller-supplied path or URL → a local file.
//!
//! URLs are downloaded into a scratch directory; the returned guard keeps the
//! download alive until the file's pipeline finishes and deletes it after.

use crate::error::FileError;
use crate::pipeline::scratch::{ScratchDir, ScratchSpace};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A local file, possibly backed by a scratch download.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    Downloaded { path: PathBuf, scratch: ScratchDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    /// Delete the download now, if there is one.
    pub fn release(self) {
        if let ResolvedInput::Downloaded { scratch, .. } = self {
            scratch.close();
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a local file.
pub async fn resolve_input(
    input: &str,
    scratch: &ScratchSpace,
    timeout_secs: u64,
) -> Result<ResolvedInput, FileError> {
    if is_url(input) {
        download_url(input, scratch, timeout_secs).await
    } else {
        debug!("Resolved local input: {}", input);
        Ok(ResolvedInput::Local(PathBuf::from(input)))
    }
}

async fn download_url(
    url: &str,
    scratch: &ScratchSpace,
    timeout_secs: u64,
) -> Result<ResolvedInput, FileError> {
    info!("Downloading {}", url);
    let unreadable = |detail: String| FileError::SourceUnreadable {
        path: PathBuf::from(url),
        detail,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| unreadable(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            unreadable(format!("download timed out after {timeout_secs}s"))
        } else {
            unreadable(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(unreadable(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let scratch = scratch
        .acquire(&filename)
        .map_err(|e| unreadable(format!("cannot create scratch dir: {e}")))?;
    let path = scratch.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| unreadable(format!("cannot write download: {e}")))?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Downloaded { path, scratch })
}

/// Last path segment of the URL, or `download` when there is none. An
/// extension-less name is classified by sniffing.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last != "." && last != "..")
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filenames_from_urls() {
        assert_eq!(filename_from_url("https://x.io/files/report.xlsx"), "report.xlsx");
        assert_eq!(filename_from_url("https://x.io/files/report.xlsx?v=2"), "report.xlsx");
        assert_eq!(filename_from_url("https://x.io/"), "download");
        assert_eq!(filename_from_url("https://x.io/get"), "get");
    }

    #[tokio::test]
    async fn local_paths_pass_through() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(Some(root.path())).unwrap();
        let resolved = resolve_input("some/file.pdf", &scratch, 5).await.unwrap();
        assert_eq!(resolved.path(), Path::new("some/file.pdf"));
        resolved.release();
    }
}
