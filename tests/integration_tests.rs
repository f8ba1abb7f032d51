use creds_bucketizer::deriver::DeriverConfig;
use creds_bucketizer::document::parse_documents;
use creds_bucketizer::view::run_view;

#[test]
fn test_full_pipeline_fine_spread() {
    let bytes = include_bytes!("fixtures/creds.json");
    let docs = parse_documents(bytes).expect("Failed to parse fixture");
    let report = run_view(&docs, &DeriverConfig::fine_spread());

    assert_eq!(report.stats.total_documents, 8);
    assert_eq!(report.stats.emitted, 5);
    assert_eq!(report.stats.excluded, 1);
    assert_eq!(report.stats.malformed, 1);
    assert_eq!(report.stats.invalid_identifier_format, 1);

    // "ab12…" and "ab13…" share a bucket in a 1000-way spread
    assert_eq!(report.counts[&669], 2);
    assert_eq!(report.counts[&1000], 1);
    assert_eq!(report.max_count(), 2);
}

#[test]
fn test_full_pipeline_sample_window() {
    let bytes = include_bytes!("fixtures/creds.json");
    let docs = parse_documents(bytes).expect("Failed to parse fixture");
    let report = run_view(&docs, &DeriverConfig::sample_window());

    assert_eq!(report.stats.emitted, 5);
    // trailing-digit bucketing spreads the same five documents differently
    assert_eq!(report.occupied_buckets(), 5);
    assert_eq!(report.counts[&99], 1);
    assert_eq!(report.counts[&49], 1);
}
