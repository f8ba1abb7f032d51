//! Output formatting and persistence for bucket reports.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::view::BucketReport;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One CSV row: how many documents one bucket received in one run.
#[derive(Debug, Serialize)]
pub struct BucketRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub variant: &'a str,
    pub bucket: u64,
    pub count: u64,
}

/// Logs a bucket report using Rust's debug pretty-print format.
pub fn print_pretty(report: &BucketReport) {
    debug!("{:#?}", report);
}

/// Prints a bucket report as pretty-printed JSON on stdout.
pub fn print_json(report: &BucketReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Appends one row per occupied bucket to a CSV file.
///
/// Creates the file with headers if it does not already exist. Every row of
/// the run shares one timestamp so rows from different runs stay separable.
pub fn append_counts(path: &str, variant: &str, report: &BucketReport) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    let timestamp = Utc::now();
    for (&bucket, &count) in &report.counts {
        writer.serialize(BucketRecord {
            timestamp,
            variant,
            bucket,
            count,
        })?;
    }
    writer.flush()?;

    info!(
        path,
        buckets = report.occupied_buckets(),
        "Bucket counts written"
    );
    Ok(())
}
