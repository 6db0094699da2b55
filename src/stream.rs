//! Streaming batch API: emit entries as files finish.
//!
//! [`BatchCoordinator::run`] returns once every file has an entry. The stream
//! form yields `(index, BatchEntry)` pairs in completion order instead, so a
//! caller can show results or write them out while the rest of the batch is
//! still running. Sort by `index` if input order matters.
//!
//! Streamed entries are not persisted to `output_dir`; that happens only in
//! the eager API, where name collisions can be resolved in input order.

use crate::batch::BatchCoordinator;
use crate::config::ExtractionConfig;
use crate::error::Any2JsonError;
use crate::output::BatchEntry;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of `(input index, entry)` pairs.
pub type EntryStream = Pin<Box<dyn Stream<Item = (usize, BatchEntry)> + Send>>;

impl BatchCoordinator {
    /// Process `inputs`, yielding each entry as soon as its file finishes.
    ///
    /// The stream owns a clone of the coordinator, so it may outlive `self`.
    pub fn stream<I, S>(&self, inputs: I) -> EntryStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        let concurrency = self.config().concurrency;
        info!("Streaming batch of {} files", inputs.len());

        let this = self.clone();
        let s = stream::iter(inputs.into_iter().enumerate())
            .map(move |(index, input)| {
                let this = this.clone();
                async move {
                    let result = this.process_file(index, &input).await;
                    (index, BatchEntry { input, result })
                }
            })
            .buffer_unordered(concurrency);

        Box::pin(s)
    }
}

/// Stream entries for `inputs` with a coordinator built from `config`.
///
/// # Example
/// ```rust,no_run
/// use edgequake_any2json::{extract_stream, ExtractionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let mut entries = extract_stream(vec!["invoice.pdf", "ledger.xlsx"], &config)?;
/// while let Some((index, entry)) = entries.next().await {
///     println!("#{index} {}: success={}", entry.input, entry.result.is_success());
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream<I, S>(inputs: I, config: &ExtractionConfig) -> Result<EntryStream, Any2JsonError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Ok(BatchCoordinator::new(config.clone())?.stream(inputs))
}
