//! Artifact persistence.
//!
//! The pipeline hands every generated file to an [`ArtifactStore`] and
//! records the returned reference and URL in the report. Two stores ship
//! with the crate:
//!
//! * [`DirectoryStore`] — writes under a root directory, one sub-folder per
//!   artifact kind, using temp-file + rename so readers never see a
//!   half-written file.
//! * [`MemoryStore`] — keeps bytes in process; handy for embedding and tests.
//!
//! Anything else (object storage, a CDN, a database) implements the trait.

use crate::error::StoreError;
use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

static RE_UNSAFE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// What kind of file an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Single-page PDF rendering of a group.
    Document,
    /// XLSX workbook holding a group's rows.
    Tabular,
    /// ZIP archive of every document in a run.
    Bundle,
}

impl ArtifactKind {
    /// Folder the artifact is filed under.
    pub fn folder(self) -> &'static str {
        match self {
            ArtifactKind::Document => "processed-pdfs",
            ArtifactKind::Tabular => "processed-xlsx",
            ArtifactKind::Bundle => "processed-bundles",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Document => "pdf",
            ArtifactKind::Tabular => "xlsx",
            ArtifactKind::Bundle => "zip",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Document => "application/pdf",
            ArtifactKind::Tabular => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ArtifactKind::Bundle => "application/zip",
        }
    }
}

/// A file ready to be persisted.
#[derive(Debug, Clone)]
pub struct ArtifactUpload {
    pub kind: ArtifactKind,
    /// Base name without folder or extension.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArtifactUpload {
    /// Build an upload named `{prefix}_{timestamp}_{stem}`.
    ///
    /// `stem` comes from [`group_stem`] or [`unique_group_stems`].
    pub fn for_group(
        kind: ArtifactKind,
        prefix: &str,
        timestamp: i64,
        stem: &str,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            name: run_scoped_name(prefix, timestamp, stem),
            bytes,
        }
    }

    /// The run's document archive, `{prefix}_{timestamp}_grouped_pdfs.zip`.
    pub fn for_bundle(prefix: &str, timestamp: i64, bytes: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::Bundle,
            name: run_scoped_name(prefix, timestamp, BUNDLE_STEM),
            bytes,
        }
    }

    /// `folder/name.ext`, the store-independent reference.
    pub fn reference(&self) -> String {
        format!(
            "{}/{}.{}",
            self.kind.folder(),
            self.name,
            self.kind.extension()
        )
    }
}

/// Where a persisted artifact can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub reference: String,
    pub url: String,
}

/// Persistence collaborator.
///
/// Implementations must be `Send + Sync`: groups may be stored from
/// concurrent workers.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, upload: ArtifactUpload) -> Result<StoredArtifact, StoreError>;
}

const BUNDLE_STEM: &str = "grouped_pdfs";

/// Compose an artifact name for a single key, replacing unsafe runs with `_`.
///
/// Distinct keys can share a name here (`"DC/1"` and `"DC 1"`); a run names
/// its groups through [`unique_group_stems`] instead.
pub fn artifact_name(prefix: &str, timestamp: i64, key: &str) -> String {
    run_scoped_name(prefix, timestamp, &group_stem(key))
}

/// `Serial_{key}` with unsafe runs replaced by `_`.
pub fn group_stem(key: &str) -> String {
    format!("Serial_{}", sanitize(key))
}

/// One stem per key, in key order, no two equal ignoring case.
///
/// The first key to claim a stem keeps it; later ones get `_2`, `_3`, …
/// Case is ignored so names also stay apart on case-insensitive file systems.
pub fn unique_group_stems<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    keys.into_iter()
        .map(|key| {
            let base = group_stem(key);
            let mut stem = base.clone();
            let mut n = 2usize;
            while !taken.insert(stem.to_lowercase()) {
                stem = format!("{base}_{n}");
                n += 1;
            }
            stem
        })
        .collect()
}

fn run_scoped_name(prefix: &str, timestamp: i64, stem: &str) -> String {
    format!("{}_{}_{}", sanitize(prefix), timestamp, stem)
}

fn sanitize(part: &str) -> String {
    let cleaned = RE_UNSAFE_NAME.replace_all(part, "_");
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.into_owned()
    }
}

// ── Directory store ──────────────────────────────────────────────────────

/// Writes artifacts to `<root>/<folder>/<name>.<ext>`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for DirectoryStore {
    async fn put(&self, upload: ArtifactUpload) -> Result<StoredArtifact, StoreError> {
        let dir = self.root.join(upload.kind.folder());
        let ext = upload.kind.extension();
        let path = dir.join(format!("{}.{}", upload.name, ext));
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;

        // Atomic write: temp file in the same folder, then rename.
        let tmp_path = path.with_extension(format!("{ext}.tmp"));
        tokio::fs::write(&tmp_path, &upload.bytes)
            .await
            .map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(io_err)?;

        let absolute = std::path::absolute(&path).map_err(io_err)?;
        let url = reqwest::Url::from_file_path(&absolute)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| absolute.display().to_string());

        debug!("Stored {} ({} bytes)", path.display(), upload.bytes.len());
        Ok(StoredArtifact {
            reference: upload.reference(),
            url,
        })
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Keeps artifacts in a map keyed by reference.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<IndexMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored under `reference`, if any.
    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.lock().get(reference).cloned()
    }

    /// References in insertion order.
    pub fn references(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, Vec<u8>>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(&self, upload: ArtifactUpload) -> Result<StoredArtifact, StoreError> {
        let reference = upload.reference();
        let url = format!("memory://{reference}");
        self.lock().insert(reference.clone(), upload.bytes);
        Ok(StoredArtifact { reference, url })
    }
}
