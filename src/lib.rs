//! # sheet-split
//!
//! Split a spreadsheet into one PDF per value of a key ("serial") column.
//!
//! A delivery-challan workbook with hundreds of rows becomes one table page
//! per challan number, each rendered by a headless browser (or a plain-text
//! fallback when no browser is available) and stored through a pluggable
//! [`ArtifactStore`]. The run returns a [`ProcessingReport`] listing every
//! group's artifacts or the error that stopped it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! XLSX / XLS / ODS / CSV
//!  │
//!  ├─ 1. Input    local file or URL (size-limited)
//!  ├─ 2. Decode   first sheet → rows keyed by header
//!  ├─ 3. Group    by trimmed serial value; numeric or text order
//!  ├─ 4. Layout   HTML table, width/height from the row count
//!  ├─ 5. Raster   headless Chrome → PDF, lopdf fallback on failure
//!  ├─ 6. Store    processed-pdfs/ (+ processed-xlsx/, processed-bundles/)
//!  └─ 7. Report   per-group refs/URLs or errors, key range, counts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sheet_split::{process, SplitConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SplitConfig::builder()
//!         .serial_column("Del.Challan")
//!         .output_dir("out")
//!         .build()?;
//!     let report = process("challans.xlsx", &config).await?;
//!     for r in &report.results {
//!         println!("{} → {:?}", r.group_key, r.document_url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `sheet-split` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `chrome` | on      | Headless-Chrome rendering via `headless_chrome`; without it every group uses the fallback |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dataset;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{SplitConfig, SplitConfigBuilder};
pub use dataset::{CellValue, Dataset, RowRecord};
pub use error::{GroupError, RasterError, SplitError, StoreError};
pub use output::{DatasetSummary, GroupResult, GroupSummary, KeyRange, ProcessingReport};
pub use pipeline::group::GroupOrdering;
pub use pipeline::raster::{CancelFlag, RasterEngine, Rasterizer};
pub use process::{inspect, process, process_bytes, process_sync, process_to_file};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{ArtifactKind, ArtifactStore, ArtifactUpload, DirectoryStore, MemoryStore, StoredArtifact};
pub use stream::{process_stream, process_stream_bytes, GroupStream};
