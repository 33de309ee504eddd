//! Error types for the sheet-split library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SplitError`] — **Fatal**: the run cannot proceed at all (source file
//!   missing, not a spreadsheet, no rows, serial column never populated).
//!   Returned as `Err(SplitError)` from the top-level `process*` functions.
//!
//! * [`GroupError`] — **Non-fatal**: one group failed (both renderers gave up,
//!   upload rejected) but every other group is fine. Stored inside
//!   [`crate::output::GroupResult`] so callers can inspect partial success
//!   rather than losing the whole batch to one bad group.
//!
//! [`RasterError`] and [`StoreError`] are the collaborator-level errors that
//! the per-group driver folds into a [`GroupError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the sheet-split library.
///
/// Group-level failures use [`GroupError`] and are stored in
/// [`crate::output::GroupResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum SplitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Spreadsheet not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// Source download failed (network error or non-2xx status).
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Source is larger than the configured limit.
    #[error("Source is {size} bytes, above the {limit}-byte limit")]
    SourceTooLarge { size: usize, limit: usize },

    // ── Dataset errors ────────────────────────────────────────────────────
    /// The bytes could not be read as a spreadsheet.
    #[error("Could not decode spreadsheet: {detail}")]
    Decode { detail: String },

    /// The first sheet decoded but holds no data rows.
    #[error("No data found in the uploaded file")]
    EmptyDataset,

    /// No row carried a usable value in the serial column.
    #[error("No valid data found for serial column '{column}'")]
    MissingColumn { column: String },

    // ── Run errors ────────────────────────────────────────────────────────
    /// The whole run exceeded `run_timeout_secs`.
    #[error("Processing timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Some groups succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::ProcessingReport::into_result`] when
    /// the caller wants to treat any group failure as an error.
    #[error("{failed}/{total} groups failed during processing")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the JSON report file.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single group.
///
/// Stored alongside [`crate::output::GroupResult`] when a group fails.
/// The run continues with the next group.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum GroupError {
    /// Neither the primary nor the fallback renderer produced a document.
    #[error("Group '{key}': rendering failed: {detail}")]
    RenderFailed { key: String, detail: String },

    /// The document was produced but the store rejected it.
    #[error("Group '{key}': upload failed: {detail}")]
    StoreFailed { key: String, detail: String },

    /// A worker task panicked or was cancelled.
    #[error("Group '{key}': {detail}")]
    Internal { key: String, detail: String },
}

impl GroupError {
    /// The group key this error belongs to.
    pub fn key(&self) -> &str {
        match self {
            GroupError::RenderFailed { key, .. }
            | GroupError::StoreFailed { key, .. }
            | GroupError::Internal { key, .. } => key,
        }
    }
}

/// Failure of a single rasterizer attempt.
#[derive(Debug, Error)]
pub enum RasterError {
    /// The rendering engine could not be started.
    #[error("{engine} engine unavailable: {detail}")]
    Unavailable { engine: &'static str, detail: String },

    /// The engine started but failed while loading, measuring or printing.
    #[error("{engine} engine failed: {detail}")]
    Failed { engine: &'static str, detail: String },

    /// Both the primary and the fallback engine failed.
    #[error("primary: {primary}; fallback: {fallback}")]
    Exhausted { primary: String, fallback: String },

    /// The run was cancelled while this document was rendering.
    #[error("rendering cancelled")]
    Cancelled,
}

/// Failure reported by an [`crate::store::ArtifactStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local file-system failure.
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store-specific rejection (quota, auth, remote error).
    #[error("{0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = SplitError::PartialFailure {
            success: 9,
            failed: 1,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/10"), "got: {msg}");
    }

    #[test]
    fn missing_column_names_the_column() {
        let e = SplitError::MissingColumn {
            column: "Del.Challan".into(),
        };
        assert!(e.to_string().contains("'Del.Challan'"));
    }

    #[test]
    fn source_too_large_display() {
        let e = SplitError::SourceTooLarge {
            size: 20,
            limit: 10,
        };
        assert!(e.to_string().contains("20 bytes"));
        assert!(e.to_string().contains("10-byte"));
    }

    #[test]
    fn group_error_key_accessor() {
        let e = GroupError::StoreFailed {
            key: "A1".into(),
            detail: "quota".into(),
        };
        assert_eq!(e.key(), "A1");
        assert!(e.to_string().contains("upload failed"));
    }

    #[test]
    fn exhausted_raster_error_lists_both_causes() {
        let e = RasterError::Exhausted {
            primary: "no browser".into(),
            fallback: "out of memory".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("no browser"));
        assert!(msg.contains("out of memory"));
    }
}
