//! Eager (whole-batch) entry points.
//!
//! Every group is rendered and stored before the call returns with a
//! [`ProcessingReport`]. Use [`crate::stream::process_stream`] to receive
//! group results as they finish instead.
//!
//! A group's failure never aborts the run: it becomes an error entry in the
//! report and the next group proceeds.

use crate::config::SplitConfig;
use crate::error::{GroupError, SplitError};
use crate::output::{DatasetSummary, GroupResult, GroupSummary, ProcessingReport};
use crate::pipeline::group::{self, Group, Grouping};
use crate::pipeline::raster::{CancelFlag, EngineKind, RasterEngine};
use crate::pipeline::{bundle, decode, input, layout, tabular};
use crate::progress::ProgressCallback;
use crate::store::{self, ArtifactKind, ArtifactStore, ArtifactUpload, StoredArtifact};
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Split a spreadsheet file or URL into per-group documents.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ProcessingReport)` whenever the run completes, even if some groups
/// failed (see [`ProcessingReport::into_result`] for strict handling).
///
/// # Errors
/// Returns `Err(SplitError)` only for fatal errors:
/// - source missing, unreadable, too large, or not a spreadsheet
/// - no data rows, or no row with a usable serial value
/// - the run exceeded `run_timeout_secs`; renders still in flight are
///   cancelled and their browsers killed
pub async fn process(
    input_str: impl AsRef<str>,
    config: &SplitConfig,
) -> Result<ProcessingReport, SplitError> {
    let input_str = input_str.as_ref();
    info!("Starting run: {}", input_str);

    with_run_timeout(config, async {
        let bytes = input::load_source(
            input_str,
            config.download_timeout_secs,
            config.max_source_bytes,
        )
        .await?;
        run(bytes, config).await
    })
    .await
}

/// Split an in-memory spreadsheet.
///
/// # Example
/// ```rust,no_run
/// use sheet_split::{process_bytes, SplitConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("challans.xlsx")?;
/// let report = process_bytes(bytes, &SplitConfig::default()).await?;
/// println!("{} documents", report.documents_created);
/// # Ok(())
/// # }
/// ```
pub async fn process_bytes(
    bytes: impl Into<Vec<u8>>,
    config: &SplitConfig,
) -> Result<ProcessingReport, SplitError> {
    let bytes = bytes.into();
    input::check_size(bytes.len(), config.max_source_bytes)?;
    with_run_timeout(config, run(bytes, config)).await
}

/// Run [`process`] and write the JSON report to `report_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn process_to_file(
    input_str: impl AsRef<str>,
    report_path: impl AsRef<Path>,
    config: &SplitConfig,
) -> Result<ProcessingReport, SplitError> {
    let report = process(input_str, config).await?;
    let path = report_path.as_ref();
    let json = serde_json::to_vec_pretty(&report)
        .map_err(|e| SplitError::Internal(format!("report serialisation: {e}")))?;

    let write_err = |e: std::io::Error| SplitError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(report)
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    input_str: impl AsRef<str>,
    config: &SplitConfig,
) -> Result<ProcessingReport, SplitError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SplitError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(input_str, config))
}

/// Decode and group without rendering or storing anything.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &SplitConfig,
) -> Result<DatasetSummary, SplitError> {
    let bytes = input::load_source(
        input_str.as_ref(),
        config.download_timeout_secs,
        config.max_source_bytes,
    )
    .await?;
    let prepared = prepare(bytes, config).await?;

    Ok(DatasetSummary {
        total_rows: prepared.total_rows,
        columns: prepared.columns,
        serial_column: config.serial_column.clone(),
        skipped_rows: prepared.grouping.skipped,
        ordering: prepared.grouping.ordering,
        key_range: group::key_range(prepared.grouping.groups.iter().map(|g| g.key.as_str())),
        groups: prepared
            .grouping
            .groups
            .iter()
            .map(|g| GroupSummary {
                group_key: g.key.clone(),
                row_count: g.row_count(),
            })
            .collect(),
    })
}

// ── Run driver ───────────────────────────────────────────────────────────

async fn with_run_timeout<T>(
    config: &SplitConfig,
    fut: impl Future<Output = Result<T, SplitError>>,
) -> Result<T, SplitError> {
    match config.run_timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| {
                warn!("Run exceeded {}s; cancelling in-flight groups", secs);
                SplitError::Timeout { secs }
            })?,
        None => fut.await,
    }
}

async fn run(bytes: Vec<u8>, config: &SplitConfig) -> Result<ProcessingReport, SplitError> {
    let total_start = Instant::now();

    // ── Step 1: Decode + group ───────────────────────────────────────────
    let prepared = prepare(bytes, config).await?;
    let Prepared {
        total_rows,
        grouping,
        ..
    } = prepared;
    let Grouping {
        groups,
        skipped,
        ordering,
    } = grouping;
    let total_groups = groups.len();
    info!(
        "{} rows → {} groups ({} skipped)",
        total_rows, total_groups, skipped
    );

    // ── Step 2: Pick engines and store ───────────────────────────────────
    let ctx = Arc::new(GroupContext::new(config, &groups));

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total_groups, skipped);
    }

    // ── Step 3: Render + store each group ────────────────────────────────
    let results = if config.concurrency <= 1 {
        process_sequential(&ctx, groups).await
    } else {
        process_concurrent(&ctx, groups, config.concurrency).await
    };

    // ── Step 4: Bundle documents ─────────────────────────────────────────
    let bundle = match ctx.take_bundle() {
        Some(entries) if !entries.is_empty() => store_bundle(&ctx, entries).await,
        _ => None,
    };

    // ── Step 5: Assemble report ──────────────────────────────────────────
    let documents_created = results.iter().filter(|r| r.is_success()).count();
    let tabular_created = results
        .iter()
        .filter(|r| r.tabular_artifact_ref.is_some())
        .count();
    let fallback_documents = results
        .iter()
        .filter(|r| r.is_success() && r.renderer.as_deref() == Some(ctx.engine.fallback_name()))
        .count();

    let report = ProcessingReport {
        success: true,
        total_groups,
        total_rows,
        skipped_rows: skipped,
        documents_created,
        tabular_artifacts_created: config
            .also_produce_tabular_artifacts
            .then_some(tabular_created),
        key_range: group::key_range(results.iter().map(|r| r.group_key.as_str())),
        ordering,
        results,
        fallback_documents,
        bundle_artifact_ref: bundle.as_ref().map(|b| b.reference.clone()),
        bundle_url: bundle.map(|b| b.url),
        duration_ms: total_start.elapsed().as_millis() as u64,
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    info!(
        "Run complete: {}/{} documents, {} via fallback, {} skipped rows, {}ms",
        report.documents_created,
        report.total_groups,
        report.fallback_documents,
        report.skipped_rows,
        report.duration_ms
    );
    if let Some(n) = report.tabular_artifacts_created {
        info!("Workbooks created: {}", n);
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total_groups, documents_created);
    }

    Ok(report)
}

/// Decoded and grouped source.
pub(crate) struct Prepared {
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub grouping: Grouping,
}

/// Decode and group on the blocking pool; the dataset is dropped afterwards.
pub(crate) async fn prepare(bytes: Vec<u8>, config: &SplitConfig) -> Result<Prepared, SplitError> {
    let sheet = config.sheet.clone();
    let serial_column = config.serial_column.clone();

    tokio::task::spawn_blocking(move || {
        let dataset = decode::decode(&bytes, sheet.as_deref())?;
        let grouping = group::group_rows(&dataset, &serial_column)?;
        Ok(Prepared {
            total_rows: dataset.len(),
            columns: dataset.headers().to_vec(),
            grouping,
        })
    })
    .await
    .map_err(|e| SplitError::Internal(format!("Decode task panicked: {}", e)))?
}

/// Everything a group worker needs, shared across workers.
///
/// Dropping the last handle trips `cancel`, so a timed-out run or an
/// abandoned stream stops every render still in flight.
pub(crate) struct GroupContext {
    pub engine: RasterEngine,
    store: Arc<dyn ArtifactStore>,
    prefix: String,
    timestamp: i64,
    tabular: bool,
    total: usize,
    progress: Option<ProgressCallback>,
    /// Artifact stems in key order, unique within the run.
    stems: Vec<String>,
    header_labels: Arc<IndexMap<String, String>>,
    cancel: CancelFlag,
    /// `(index, entry name, pdf)` for the run's ZIP, when bundling.
    bundle: Option<Mutex<Vec<(usize, String, Vec<u8>)>>>,
}

impl GroupContext {
    pub(crate) fn new(config: &SplitConfig, groups: &[Group]) -> Self {
        Self {
            engine: RasterEngine::detect(config),
            store: config.artifact_store(),
            prefix: config.artifact_prefix.clone(),
            timestamp: Utc::now().timestamp_millis(),
            tabular: config.also_produce_tabular_artifacts,
            total: groups.len(),
            progress: config.progress_callback.clone(),
            stems: store::unique_group_stems(groups.iter().map(|g| g.key.as_str())),
            header_labels: Arc::new(config.header_labels.clone()),
            cancel: CancelFlag::new(),
            bundle: config.bundle_documents.then(|| Mutex::new(Vec::new())),
        }
    }

    fn stem(&self, index: usize, key: &str) -> String {
        index
            .checked_sub(1)
            .and_then(|i| self.stems.get(i))
            .cloned()
            .unwrap_or_else(|| store::group_stem(key))
    }

    fn keep_for_bundle(&self, index: usize, name: String, pdf: Vec<u8>) {
        if let Some(ref slot) = self.bundle {
            slot.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((index, name, pdf));
        }
    }

    /// Bundled documents in key order.
    fn take_bundle(&self) -> Option<Vec<(String, Vec<u8>)>> {
        let slot = self.bundle.as_ref()?;
        let mut entries = std::mem::take(&mut *slot.lock().unwrap_or_else(|e| e.into_inner()));
        entries.sort_by_key(|(i, _, _)| *i);
        Some(entries.into_iter().map(|(_, name, pdf)| (name, pdf)).collect())
    }
}

impl Drop for GroupContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Zip and store the run's documents. Failures are logged; the run still succeeds.
async fn store_bundle(
    ctx: &GroupContext,
    entries: Vec<(String, Vec<u8>)>,
) -> Option<StoredArtifact> {
    let count = entries.len();
    let archive = tokio::task::spawn_blocking(move || bundle::zip_documents(&entries)).await;
    let bytes = match archive {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!("Bundle encoding failed: {}", e);
            return None;
        }
        Err(e) => {
            warn!("Bundle task failed: {}", e);
            return None;
        }
    };

    match ctx
        .store
        .put(ArtifactUpload::for_bundle(&ctx.prefix, ctx.timestamp, bytes))
        .await
    {
        Ok(stored) => {
            info!("Bundled {} documents into {}", count, stored.reference);
            Some(stored)
        }
        Err(e) => {
            warn!("Bundle upload failed: {}", e);
            None
        }
    }
}

async fn process_sequential(ctx: &Arc<GroupContext>, groups: Vec<Group>) -> Vec<GroupResult> {
    let mut results = Vec::with_capacity(groups.len());
    for (i, group) in groups.into_iter().enumerate() {
        results.push(process_group(Arc::clone(ctx), i + 1, group).await);
    }
    results
}

async fn process_concurrent(
    ctx: &Arc<GroupContext>,
    groups: Vec<Group>,
    concurrency: usize,
) -> Vec<GroupResult> {
    let mut indexed: Vec<(usize, GroupResult)> =
        stream::iter(groups.into_iter().enumerate().map(|(i, group)| {
            let ctx = Arc::clone(ctx);
            async move { (i, process_group(ctx, i + 1, group).await) }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

    // Restore group order
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, r)| r).collect()
}

/// Render, rasterize and store one group. Never fails; errors land in the result.
pub(crate) async fn process_group(ctx: Arc<GroupContext>, index: usize, group: Group) -> GroupResult {
    let start = Instant::now();
    let key = group.key.clone();
    let mut result = GroupResult::pending(&key, group.row_count());

    if let Some(ref cb) = ctx.progress {
        cb.on_group_start(index, ctx.total, &key);
    }
    debug!("Group {}/{} '{}': {} rows", index, ctx.total, key, group.row_count());

    let stem = ctx.stem(index, &key);
    // The blocking task must not hold `ctx`, or dropping the run would not cancel it.
    let engine = ctx.engine.clone();
    let labels = Arc::clone(&ctx.header_labels);
    let cancel = ctx.cancel.clone();
    let want_tabular = ctx.tabular;
    let rendered = tokio::task::spawn_blocking(move || {
        let workbook = want_tabular.then(|| tabular::encode_group(&group).map_err(|e| e.to_string()));
        let doc = layout::render_group(&group, &labels);
        let raster = engine.rasterize(&doc, &cancel);
        (workbook, raster)
    })
    .await;

    match rendered {
        Err(e) => {
            result.error = Some(GroupError::Internal {
                key: key.clone(),
                detail: format!("render task failed: {e}"),
            });
        }
        Ok((workbook, raster)) => {
            // Workbook problems are logged only; the document still goes out.
            match workbook {
                Some(Ok(bytes)) => {
                    let upload = ArtifactUpload::for_group(
                        ArtifactKind::Tabular,
                        &ctx.prefix,
                        ctx.timestamp,
                        &stem,
                        bytes,
                    );
                    match ctx.store.put(upload).await {
                        Ok(stored) => {
                            result.tabular_artifact_ref = Some(stored.reference);
                            result.tabular_url = Some(stored.url);
                        }
                        Err(e) => warn!("Workbook upload failed for '{}': {}", key, e),
                    }
                }
                Some(Err(e)) => warn!("Workbook encoding failed for '{}': {}", key, e),
                None => {}
            }

            match raster {
                Ok(out) => {
                    if out.kind == EngineKind::Fallback {
                        debug!("'{}' produced by {}", key, out.renderer);
                    }
                    let kept = ctx.bundle.is_some().then(|| out.bytes.clone());
                    let upload = ArtifactUpload::for_group(
                        ArtifactKind::Document,
                        &ctx.prefix,
                        ctx.timestamp,
                        &stem,
                        out.bytes,
                    );
                    match ctx.store.put(upload).await {
                        Ok(stored) => {
                            result.document_artifact_ref = Some(stored.reference);
                            result.document_url = Some(stored.url);
                            result.renderer = Some(out.renderer.to_string());
                            if let Some(pdf) = kept {
                                ctx.keep_for_bundle(index, format!("{stem}.pdf"), pdf);
                            }
                        }
                        Err(e) => {
                            result.error = Some(GroupError::StoreFailed {
                                key: key.clone(),
                                detail: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => {
                    result.error = Some(GroupError::RenderFailed {
                        key: key.clone(),
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;

    match result.error {
        Some(ref e) => {
            warn!("{}", e);
            if let Some(ref cb) = ctx.progress {
                cb.on_group_error(index, ctx.total, &key, &e.to_string());
            }
        }
        None => {
            let renderer = result.renderer.as_deref().unwrap_or_default();
            info!(
                "Group '{}' done: {} rows via {} in {}ms",
                key, result.row_count, renderer, result.duration_ms
            );
            if let Some(ref cb) = ctx.progress {
                cb.on_group_complete(index, ctx.total, &key, renderer);
            }
        }
    }

    result
}
