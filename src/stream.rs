//! Streaming API: emit group results as they complete.
//!
//! Unlike the eager [`crate::process::process`], which returns only after
//! every group finishes, [`process_stream`] decodes and groups up front and
//! then yields one item per group. With `concurrency > 1` items arrive in
//! completion order; sort by position in the key order if that matters.
//!
//! `on_batch_complete` is never fired for streams: the caller decides when
//! the batch is over by how far it drains the stream. Streams never produce
//! a ZIP bundle. Dropping a stream cancels any render still in flight.

use crate::config::SplitConfig;
use crate::error::{GroupError, SplitError};
use crate::output::GroupResult;
use crate::pipeline::input;
use crate::process::{prepare, process_group, GroupContext};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of group results.
pub type GroupStream = Pin<Box<dyn Stream<Item = Result<GroupResult, GroupError>> + Send>>;

/// Split a spreadsheet, streaming group results as they are ready.
///
/// # Returns
/// - `Ok(GroupStream)` — one `Result<GroupResult, GroupError>` per group
/// - `Err(SplitError)` — fatal error before any group started
///
/// # Example
/// ```rust,no_run
/// use sheet_split::{process_stream, SplitConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut groups = process_stream("challans.xlsx", &SplitConfig::default()).await?;
/// while let Some(item) = groups.next().await {
///     match item {
///         Ok(r) => println!("{}: {:?}", r.group_key, r.document_url),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_stream(
    input_str: impl AsRef<str>,
    config: &SplitConfig,
) -> Result<GroupStream, SplitError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming run: {}", input_str);

    let bytes = input::load_source(
        input_str,
        config.download_timeout_secs,
        config.max_source_bytes,
    )
    .await?;
    process_stream_bytes(bytes, config).await
}

/// In-memory equivalent of [`process_stream`].
pub async fn process_stream_bytes(
    bytes: impl Into<Vec<u8>>,
    config: &SplitConfig,
) -> Result<GroupStream, SplitError> {
    let bytes = bytes.into();
    input::check_size(bytes.len(), config.max_source_bytes)?;

    let prepared = prepare(bytes, config).await?;
    let groups = prepared.grouping.groups;
    let ctx = Arc::new(GroupContext::new(config, &groups));

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(groups.len(), prepared.grouping.skipped);
    }

    let into_item = |mut r: GroupResult| match r.error.take() {
        None => Ok(r),
        Some(e) => Err(e),
    };

    let jobs = groups.into_iter().enumerate().map(move |(i, group)| {
        let ctx = Arc::clone(&ctx);
        async move { into_item(process_group(ctx, i + 1, group).await) }
    });

    if config.concurrency <= 1 {
        Ok(Box::pin(stream::iter(jobs).then(|job| job)))
    } else {
        Ok(Box::pin(stream::iter(jobs).buffer_unordered(config.concurrency)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn sequential_stream_yields_groups_in_key_order() {
        let config = SplitConfig::builder()
            .use_browser(false)
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        let csv = "Del.Challan,Item\nb,1\na,2\nc,3\n";

        let items: Vec<_> = process_stream_bytes(csv.as_bytes(), &config)
            .await
            .unwrap()
            .collect()
            .await;
        let keys: Vec<String> = items
            .into_iter()
            .map(|r| r.unwrap().group_key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn fatal_errors_surface_before_streaming() {
        let config = SplitConfig::builder()
            .use_browser(false)
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap();
        let result = process_stream_bytes(b"Del.Challan\n".to_vec(), &config).await;
        assert!(matches!(result, Err(SplitError::EmptyDataset)));
    }
}
