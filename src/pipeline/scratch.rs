//! Scratch space for intermediate artifacts (converted PDFs, downloads).
//!
//! Every file that needs an intermediate gets its own directory under a
//! shared temp root. The directory name combines a process-wide sequence
//! number, a sanitised label and `tempfile`'s random suffix, so two inputs
//! called `report.xlsx` in different folders never collide, within one
//! process or across concurrent processes sharing the root.
//!
//! Cleanup rides on `TempDir`'s `Drop`: the directory is removed exactly
//! once when the [`ScratchDir`] guard goes out of scope, whether the owning
//! pipeline succeeded, failed, or is unwinding from a panic.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Sub-directory of the system temp dir used when no root is configured.
pub const DEFAULT_ROOT_NAME: &str = "any2json";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The temp root shared by all pipelines of a batch.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: Arc<PathBuf>,
}

impl ScratchSpace {
    /// Use `root`, or `$TMPDIR/any2json` when `None`. The directory is
    /// created if absent.
    pub fn new(root: Option<&Path>) -> std::io::Result<Self> {
        let root = match root {
            Some(r) => r.to_path_buf(),
            None => std::env::temp_dir().join(DEFAULT_ROOT_NAME),
        };
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root: Arc::new(root),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquire a fresh, uniquely named directory for one file's artifacts.
    pub fn acquire(&self, label: &str) -> std::io::Result<ScratchDir> {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("{seq:06}-{}-", sanitise(label));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(self.root.as_path())?;
        debug!("Acquired scratch dir {}", dir.path().display());
        Ok(ScratchDir { dir: Some(dir) })
    }
}

/// Guard over one scratch directory; removes it on drop.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        // `dir` is only taken by `close`, which consumes `self`.
        self.dir
            .as_ref()
            .map(|d| d.path())
            .unwrap_or_else(|| Path::new(""))
    }

    /// Remove the directory now, logging (not propagating) failures.
    pub fn close(mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Released scratch dir {}", path.display()),
                Err(e) => warn!("Failed to remove scratch dir {}: {}", path.display(), e),
            }
        }
    }
}

/// Keep labels short and filesystem-safe.
fn sanitise(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(40)
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_label_never_collides() {
        let root = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(Some(root.path())).unwrap();
        let a = space.acquire("report").unwrap();
        let b = space.acquire("report").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
    }

    #[test]
    fn drop_and_close_remove_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let space = ScratchSpace::new(Some(root.path())).unwrap();

        let dropped = space.acquire("a").unwrap();
        std::fs::write(dropped.path().join("a.pdf"), b"%PDF").unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());

        let closed = space.acquire("b").unwrap();
        let closed_path = closed.path().to_path_buf();
        closed.close();
        assert!(!closed_path.exists());

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn root_is_created() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("nested/scratch");
        let space = ScratchSpace::new(Some(&root)).unwrap();
        assert!(space.root().is_dir());
    }

    #[test]
    fn sanitise_labels() {
        assert_eq!(sanitise("my report (v2)"), "my_report__v2_");
        assert_eq!(sanitise(""), "file");
        assert_eq!(sanitise(&"x".repeat(100)).len(), 40);
    }
}
