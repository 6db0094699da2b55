//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`]. Files run
//! concurrently, so methods may be called from several tasks at once;
//! implementations guard shared state themselves.
//!
//! # Example
//!
//! ```rust
//! use edgequake_any2json::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_file_complete(&self, _index: usize, input: &str, json_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{input}: {json_len} bytes of JSON");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch coordinator as files move through the pipeline.
///
/// `index` is the 0-based position of the file in the input list. All
/// methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any file is scheduled.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file's pipeline starts.
    fn on_file_start(&self, index: usize, input: &str) {
        let _ = (index, input);
    }

    /// Called when a file produced a valid JSON object.
    ///
    /// `json_len` is the byte length of the compact serialisation.
    fn on_file_complete(&self, index: usize, input: &str, json_len: usize) {
        let _ = (index, input, json_len);
    }

    /// Called when a file ended in an error entry (cancellation included).
    fn on_file_error(&self, index: usize, input: &str, error: &str) {
        let _ = (index, input, error);
    }

    /// Called once after every file has an entry.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
