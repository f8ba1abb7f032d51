//! Runs a bucketing view across a document collection.
//!
//! Applies [`derive_bucket_key`] per document and folds the emissions into a
//! count-per-bucket reduction. One bad document never halts the run: failures
//! are logged with the document id and counted, then skipped.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::deriver::{DeriveError, DeriverConfig, derive_bucket_key};
use crate::document::CredsDocument;

/// Outcome counters for one view run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ViewStats {
    pub total_documents: usize,
    pub emitted: usize,
    pub excluded: usize,

    // per-document failures, skipped
    pub malformed: usize,
    pub identifier_too_short: usize,
    pub invalid_identifier_format: usize,
}

impl ViewStats {
    pub fn failed(&self) -> usize {
        self.malformed + self.identifier_too_short + self.invalid_identifier_format
    }
}

/// Result of a view run: per-bucket emission counts plus outcome stats.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BucketReport {
    pub counts: BTreeMap<u64, u64>,
    pub stats: ViewStats,
}

impl BucketReport {
    /// Number of distinct buckets that received at least one document.
    pub fn occupied_buckets(&self) -> usize {
        self.counts.len()
    }

    pub fn min_count(&self) -> u64 {
        self.counts.values().copied().min().unwrap_or(0)
    }

    pub fn max_count(&self) -> u64 {
        self.counts.values().copied().max().unwrap_or(0)
    }
}

/// Maps every document through the deriver and reduces emissions to counts.
///
/// Deterministic for a given collection and config. Derivation failures are
/// per-document: they are logged, tallied in [`ViewStats`], and the remainder
/// of the collection is still processed.
pub fn run_view(docs: &[CredsDocument], config: &DeriverConfig) -> BucketReport {
    let mut report = BucketReport::default();
    report.stats.total_documents = docs.len();

    for doc in docs {
        match derive_bucket_key(doc, config) {
            Ok(Some(assignment)) => {
                report.stats.emitted += 1;
                *report.counts.entry(assignment.key).or_insert(0) += 1;
            }
            Ok(None) => {
                report.stats.excluded += 1;
                debug!(doc = doc.log_id(), doc_type = %doc.doc_type, "Document outside view");
            }
            Err(e) => {
                warn!(doc = doc.log_id(), error = %e, "Skipping document");
                match e {
                    DeriveError::MalformedDocument => report.stats.malformed += 1,
                    DeriveError::IdentifierTooShort { .. } => {
                        report.stats.identifier_too_short += 1
                    }
                    DeriveError::InvalidIdentifierFormat { .. } => {
                        report.stats.invalid_identifier_format += 1
                    }
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs_from_json(raw: &str) -> Vec<CredsDocument> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_empty_collection() {
        let report = run_view(&[], &DeriverConfig::fine_spread());
        assert_eq!(report.stats.total_documents, 0);
        assert_eq!(report.occupied_buckets(), 0);
        assert_eq!(report.min_count(), 0);
        assert_eq!(report.max_count(), 0);
    }

    #[test]
    fn test_counts_accumulate_per_bucket() {
        // "ab12" and "ab13" land in the same fine-spread bucket (669)
        let docs = docs_from_json(
            r#"[
                {"type": "creds_v1.0", "basic": {"api_key": "ab12"}},
                {"type": "creds_v1.0", "basic": {"api_key": "ab13"}},
                {"type": "creds_v1.0", "basic": {"api_key": "0000"}}
            ]"#,
        );

        let report = run_view(&docs, &DeriverConfig::fine_spread());
        assert_eq!(report.stats.emitted, 3);
        assert_eq!(report.counts[&669], 2);
        assert_eq!(report.counts[&1], 1);
        assert_eq!(report.max_count(), 2);
        assert_eq!(report.min_count(), 1);
    }

    #[test]
    fn test_bad_documents_do_not_halt_the_run() {
        let docs = docs_from_json(
            r#"[
                {"type": "creds_v1.0", "basic": {"api_key": "ab12"}},
                {"type": "creds_v1.0"},
                {"type": "creds_v1.0", "basic": {"api_key": "a"}},
                {"type": "creds_v1.0", "basic": {"api_key": "wxyz5678"}},
                {"type": "session_v1.0"},
                {"type": "creds_v1.0", "basic": {"api_key": "ffff"}}
            ]"#,
        );

        let report = run_view(&docs, &DeriverConfig::fine_spread());
        assert_eq!(report.stats.total_documents, 6);
        assert_eq!(report.stats.emitted, 2);
        assert_eq!(report.stats.excluded, 1);
        assert_eq!(report.stats.malformed, 1);
        assert_eq!(report.stats.identifier_too_short, 1);
        assert_eq!(report.stats.invalid_identifier_format, 1);
        assert_eq!(report.stats.failed(), 3);
    }

    #[test]
    fn test_run_is_deterministic() {
        let docs = docs_from_json(
            r#"[
                {"type": "creds_v1.0", "basic": {"api_key": "deadbeef"}},
                {"type": "creds_v1.0", "mac": {"mac_key_identifier": "cafe0123"}}
            ]"#,
        );
        let config = DeriverConfig::sample_window();

        assert_eq!(run_view(&docs, &config), run_view(&docs, &config));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let docs = docs_from_json(r#"[{"type": "creds_v1.0", "basic": {"api_key": "ab12"}}]"#);
        let report = run_view(&docs, &DeriverConfig::fine_spread());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["emitted"], 1);
        assert_eq!(json["counts"]["669"], 1);
    }
}
