//! Output types: the per-run report and per-group results.
//!
//! Everything here serialises to camelCase JSON, the shape the CLI prints
//! with `--json` and [`crate::process::process_to_file`] writes.

use crate::error::{GroupError, SplitError};
use crate::pipeline::group::GroupOrdering;
use serde::{Deserialize, Serialize, Serializer};

/// Smallest and largest integer group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub min: i64,
    pub max: i64,
}

/// Outcome for one group.
///
/// Exactly one of `document_artifact_ref` / `error` is set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    pub group_key: String,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabular_artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabular_url: Option<String>,
    /// Engine that produced the document, e.g. `chrome` or `fallback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "error_message"
    )]
    pub error: Option<GroupError>,
    pub duration_ms: u64,
}

impl GroupResult {
    /// A result with no artifacts yet.
    pub fn pending(group_key: impl Into<String>, row_count: usize) -> Self {
        Self {
            group_key: group_key.into(),
            row_count,
            document_artifact_ref: None,
            document_url: None,
            tabular_artifact_ref: None,
            tabular_url: None,
            renderer: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn error_message<S: Serializer>(error: &Option<GroupError>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_str(&e.to_string()),
        None => s.serialize_none(),
    }
}

/// Report for a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingReport {
    /// `true` whenever the run completed, even if groups failed.
    pub success: bool,
    pub total_groups: usize,
    /// Decoded data rows, including skipped ones.
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub documents_created: usize,
    /// `None` when tabular artifacts were not requested.
    pub tabular_artifacts_created: Option<usize>,
    pub key_range: Option<KeyRange>,
    pub ordering: GroupOrdering,
    /// One entry per group, in group order.
    pub results: Vec<GroupResult>,
    /// Documents produced by the fallback engine.
    pub fallback_documents: usize,
    /// ZIP of every stored document, when bundling was requested and succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_url: Option<String>,
    pub duration_ms: u64,
    /// RFC 3339 completion time.
    pub generated_at: String,
}

impl ProcessingReport {
    /// Results that carry an error.
    pub fn failed_groups(&self) -> impl Iterator<Item = &GroupResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn failed_count(&self) -> usize {
        self.failed_groups().count()
    }

    /// Treat any failed group as an error.
    pub fn into_result(self) -> Result<Self, SplitError> {
        let failed = self.failed_count();
        if failed == 0 {
            Ok(self)
        } else {
            Err(SplitError::PartialFailure {
                success: self.results.len() - failed,
                failed,
                total: self.results.len(),
            })
        }
    }
}

/// Per-group line of a [`DatasetSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group_key: String,
    pub row_count: usize,
}

/// What a run would produce, without rendering anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub serial_column: String,
    pub skipped_rows: usize,
    pub ordering: GroupOrdering,
    pub key_range: Option<KeyRange>,
    pub groups: Vec<GroupSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(results: Vec<GroupResult>) -> ProcessingReport {
        ProcessingReport {
            success: true,
            total_groups: results.len(),
            total_rows: 3,
            skipped_rows: 0,
            documents_created: results.iter().filter(|r| r.is_success()).count(),
            tabular_artifacts_created: None,
            key_range: Some(KeyRange { min: 1, max: 2 }),
            ordering: GroupOrdering::Numeric,
            results,
            fallback_documents: 0,
            bundle_artifact_ref: None,
            bundle_url: None,
            duration_ms: 5,
            generated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn ok(key: &str) -> GroupResult {
        GroupResult {
            document_artifact_ref: Some(format!("processed-pdfs/{key}.pdf")),
            document_url: Some(format!("memory://{key}")),
            renderer: Some("fallback".into()),
            ..GroupResult::pending(key, 1)
        }
    }

    fn failed(key: &str) -> GroupResult {
        GroupResult {
            error: Some(GroupError::RenderFailed {
                key: key.into(),
                detail: "no engine".into(),
            }),
            ..GroupResult::pending(key, 2)
        }
    }

    #[test]
    fn json_is_camel_case_and_omits_empty_fields() {
        let json = serde_json::to_value(report(vec![ok("1")])).unwrap();
        assert_eq!(json["totalGroups"], 1);
        assert_eq!(json["tabularArtifactsCreated"], serde_json::Value::Null);
        assert_eq!(json["keyRange"]["min"], 1);
        assert_eq!(json["ordering"], "numeric");
        let r = &json["results"][0];
        assert_eq!(r["groupKey"], "1");
        assert_eq!(r["documentArtifactRef"], "processed-pdfs/1.pdf");
        assert!(r.get("error").is_none());
        assert!(r.get("tabularUrl").is_none());
        assert!(json.get("bundleArtifactRef").is_none());
        assert!(json.get("bundleUrl").is_none());
    }

    #[test]
    fn bundle_fields_appear_when_set() {
        let mut r = report(vec![ok("1")]);
        r.bundle_artifact_ref = Some("processed-bundles/b.zip".into());
        r.bundle_url = Some("memory://processed-bundles/b.zip".into());
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["bundleArtifactRef"], "processed-bundles/b.zip");
        assert_eq!(json["bundleUrl"], "memory://processed-bundles/b.zip");
    }

    #[test]
    fn group_error_serialises_as_message() {
        let json = serde_json::to_value(failed("2")).unwrap();
        assert_eq!(json["error"], "Group '2': rendering failed: no engine");
        assert!(json.get("documentUrl").is_none());
    }

    #[test]
    fn into_result_passes_clean_reports() {
        let r = report(vec![ok("1"), ok("2")]).into_result().unwrap();
        assert_eq!(r.failed_count(), 0);
    }

    #[test]
    fn into_result_flags_partial_failure() {
        match report(vec![ok("1"), failed("2")]).into_result() {
            Err(SplitError::PartialFailure {
                success,
                failed,
                total,
            }) => assert_eq!((success, failed, total), (1, 1, 2)),
            other => panic!("expected PartialFailure, got {other:?}"),
        }
    }
}
