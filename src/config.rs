//! Configuration types for a splitting run.
//!
//! All run behaviour is controlled through [`SplitConfig`], built via its
//! [`SplitConfigBuilder`]. Collaborators (store, rasterizers, progress
//! callback) are injected as trait objects; everything else is plain data.

use crate::error::SplitError;
use crate::pipeline::raster::Rasterizer;
use crate::progress::ProgressCallback;
use crate::store::{ArtifactStore, DirectoryStore};
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Serial column used when none is configured.
pub const DEFAULT_SERIAL_COLUMN: &str = "Del.Challan";

/// Upload size accepted by default (10 MiB).
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for a splitting run.
///
/// Built via [`SplitConfig::builder()`] or [`SplitConfig::default()`].
///
/// # Example
/// ```rust
/// use sheet_split::SplitConfig;
///
/// let config = SplitConfig::builder()
///     .serial_column("Invoice No")
///     .also_produce_tabular_artifacts(true)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SplitConfig {
    /// Column whose value groups rows. Default: `"Del.Challan"`.
    pub serial_column: String,

    /// Worksheet to read. Default: the first sheet.
    pub sheet: Option<String>,

    /// Also write each group as its own XLSX workbook. Default: false.
    pub also_produce_tabular_artifacts: bool,

    /// Display names for source headers, e.g. `"Qty" → "Quantity"`.
    ///
    /// Only the printed documents use them; workbooks keep the source headers.
    pub header_labels: IndexMap<String, String>,

    /// Also store one ZIP holding every document of the run. Default: false.
    pub bundle_documents: bool,

    /// Groups rendered at once. Default: 1 (sequential).
    ///
    /// Each concurrent group launches its own browser, so memory grows
    /// roughly linearly with this value.
    pub concurrency: usize,

    /// Try a headless browser before the fallback renderer. Default: true.
    pub use_browser: bool,

    /// Explicit browser executable. Default: discovered on the host.
    pub browser_path: Option<PathBuf>,

    /// Pre-constructed primary rasterizer. Takes precedence over browser discovery.
    pub primary_rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Replacement for the built-in fallback rasterizer.
    pub fallback_rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Bound on each browser wait (launch, load, print) in seconds. Default: 30.
    pub render_timeout_secs: u64,

    /// Bound on the whole run in seconds. Default: unbounded.
    pub run_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest accepted source in bytes. Default: 10 MiB.
    pub max_source_bytes: usize,

    /// First component of artifact names. Default: `"batch"`.
    pub artifact_prefix: String,

    /// Root for the default [`DirectoryStore`]. Default: `output`.
    pub output_dir: PathBuf,

    /// Artifact store. Default: a [`DirectoryStore`] at `output_dir`.
    pub store: Option<Arc<dyn ArtifactStore>>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            serial_column: DEFAULT_SERIAL_COLUMN.to_string(),
            sheet: None,
            also_produce_tabular_artifacts: false,
            header_labels: IndexMap::new(),
            bundle_documents: false,
            concurrency: 1,
            use_browser: true,
            browser_path: None,
            primary_rasterizer: None,
            fallback_rasterizer: None,
            render_timeout_secs: 30,
            run_timeout_secs: None,
            download_timeout_secs: 120,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            artifact_prefix: "batch".to_string(),
            output_dir: PathBuf::from("output"),
            store: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SplitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitConfig")
            .field("serial_column", &self.serial_column)
            .field("sheet", &self.sheet)
            .field(
                "also_produce_tabular_artifacts",
                &self.also_produce_tabular_artifacts,
            )
            .field("header_labels", &self.header_labels)
            .field("bundle_documents", &self.bundle_documents)
            .field("concurrency", &self.concurrency)
            .field("use_browser", &self.use_browser)
            .field("browser_path", &self.browser_path)
            .field(
                "primary_rasterizer",
                &self.primary_rasterizer.as_ref().map(|r| r.name()),
            )
            .field(
                "fallback_rasterizer",
                &self.fallback_rasterizer.as_ref().map(|r| r.name()),
            )
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_source_bytes", &self.max_source_bytes)
            .field("artifact_prefix", &self.artifact_prefix)
            .field("output_dir", &self.output_dir)
            .field("store", &self.store.as_ref().map(|_| "<dyn ArtifactStore>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl SplitConfig {
    /// Create a new builder for `SplitConfig`.
    pub fn builder() -> SplitConfigBuilder {
        SplitConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured store, or a [`DirectoryStore`] at `output_dir`.
    pub fn artifact_store(&self) -> Arc<dyn ArtifactStore> {
        match self.store {
            Some(ref s) => Arc::clone(s),
            None => Arc::new(DirectoryStore::new(self.output_dir.clone())),
        }
    }
}

/// Builder for [`SplitConfig`].
#[derive(Debug)]
pub struct SplitConfigBuilder {
    config: SplitConfig,
}

impl SplitConfigBuilder {
    pub fn serial_column(mut self, column: impl Into<String>) -> Self {
        self.config.serial_column = column.into();
        self
    }

    pub fn sheet(mut self, name: impl Into<String>) -> Self {
        self.config.sheet = Some(name.into());
        self
    }

    pub fn also_produce_tabular_artifacts(mut self, v: bool) -> Self {
        self.config.also_produce_tabular_artifacts = v;
        self
    }

    /// Print `from` as `to` in document headers.
    pub fn header_label(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.header_labels.insert(from.into(), to.into());
        self
    }

    pub fn header_labels(mut self, labels: IndexMap<String, String>) -> Self {
        self.config.header_labels = labels;
        self
    }

    pub fn bundle_documents(mut self, v: bool) -> Self {
        self.config.bundle_documents = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn use_browser(mut self, v: bool) -> Self {
        self.config.use_browser = v;
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn primary_rasterizer(mut self, r: Arc<dyn Rasterizer>) -> Self {
        self.config.primary_rasterizer = Some(r);
        self
    }

    pub fn fallback_rasterizer(mut self, r: Arc<dyn Rasterizer>) -> Self {
        self.config.fallback_rasterizer = Some(r);
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs.max(1);
        self
    }

    pub fn run_timeout_secs(mut self, secs: u64) -> Self {
        self.config.run_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_source_bytes(mut self, n: usize) -> Self {
        self.config.max_source_bytes = n;
        self
    }

    pub fn artifact_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.artifact_prefix = prefix.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.config.store = Some(store);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SplitConfig, SplitError> {
        let c = &self.config;
        if c.serial_column.trim().is_empty() {
            return Err(SplitError::InvalidConfig(
                "Serial column must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(SplitError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_source_bytes == 0 {
            return Err(SplitError::InvalidConfig(
                "Source size limit must be > 0".into(),
            ));
        }
        if c.run_timeout_secs == Some(0) {
            return Err(SplitError::InvalidConfig(
                "Run timeout must be > 0 seconds".into(),
            ));
        }
        if c.header_labels.values().any(|label| label.trim().is_empty()) {
            return Err(SplitError::InvalidConfig(
                "Header labels must not be empty".into(),
            ));
        }
        if let Some(ref sheet) = c.sheet {
            if sheet.is_empty() {
                return Err(SplitError::InvalidConfig("Sheet name must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = SplitConfig::default();
        assert_eq!(c.serial_column, "Del.Challan");
        assert_eq!(c.concurrency, 1);
        assert!(!c.also_produce_tabular_artifacts);
        assert!(c.use_browser);
        assert_eq!(c.max_source_bytes, 10 * 1024 * 1024);
        assert_eq!(c.run_timeout_secs, None);
        assert!(c.header_labels.is_empty());
        assert!(!c.bundle_documents);
    }

    #[test]
    fn header_labels_keep_insertion_order() {
        let c = SplitConfig::builder()
            .header_label("Qty", "Quantity")
            .header_label("Amt", "Amount")
            .header_label("Qty", "Units")
            .build()
            .unwrap();
        let pairs: Vec<(&str, &str)> = c
            .header_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(pairs, vec![("Qty", "Units"), ("Amt", "Amount")]);
    }

    #[test]
    fn blank_header_label_is_rejected() {
        let err = SplitConfig::builder()
            .header_label("Qty", " ")
            .build()
            .unwrap_err();
        assert!(matches!(err, SplitError::InvalidConfig(_)));
    }

    #[test]
    fn setters_clamp() {
        let c = SplitConfig::builder()
            .concurrency(0)
            .render_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.render_timeout_secs, 1);
    }

    #[test]
    fn blank_serial_column_is_rejected() {
        let err = SplitConfig::builder().serial_column("  ").build().unwrap_err();
        assert!(matches!(err, SplitError::InvalidConfig(_)));
    }

    #[test]
    fn zero_run_timeout_is_rejected() {
        assert!(SplitConfig::builder().run_timeout_secs(0).build().is_err());
        assert!(SplitConfig::builder().max_source_bytes(0).build().is_err());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = SplitConfig::builder()
            .store(Arc::new(crate::store::MemoryStore::new()))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn ArtifactStore>"));
        assert!(dbg.contains("Del.Challan"));
    }
}
