//! Progress-callback trait for per-group batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::SplitConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each group.
//!
//! # Example
//!
//! ```rust
//! use sheet_split::{BatchProgressCallback, SplitConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_group_complete(&self, index: usize, total: usize, key: &str, renderer: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{index}/{total}: {key} via {renderer}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = SplitConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each group.
///
/// All methods default to no-ops. `index` is the 1-based position of the
/// group in the final ordering.
///
/// # Thread safety
///
/// With `concurrency > 1`, the per-group methods may be called concurrently
/// and out of order.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after grouping, before any group is rendered.
    fn on_batch_start(&self, total_groups: usize, skipped_rows: usize) {
        let _ = (total_groups, skipped_rows);
    }

    fn on_group_start(&self, index: usize, total: usize, key: &str) {
        let _ = (index, total, key);
    }

    /// Called when the group's document has been stored.
    fn on_group_complete(&self, index: usize, total: usize, key: &str, renderer: &str) {
        let _ = (index, total, key, renderer);
    }

    fn on_group_error(&self, index: usize, total: usize, key: &str, error: &str) {
        let _ = (index, total, key, error);
    }

    /// Called once after every group has been attempted.
    fn on_batch_complete(&self, total_groups: usize, success_count: usize) {
        let _ = (total_groups, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SplitConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
