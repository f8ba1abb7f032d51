//! CLI entry point for the credential bucketizer.
//!
//! Provides subcommands for running a bucketing view over a credential
//! collection, installing the equivalent design document into a CouchDB key
//! store, and inspecting the built-in view variants.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use creds_bucketizer::couch::{CouchClient, DocumentSource};
use creds_bucketizer::deriver::{DeriverConfig, DigitOffset};
use creds_bucketizer::design::design_document;
use creds_bucketizer::document::{CredsDocument, parse_documents};
use creds_bucketizer::output::{append_counts, print_json};
use creds_bucketizer::view::run_view;
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "creds_bucketizer")]
#[command(about = "A tool to bucket credential records for load testing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// The built-in view variants the key store deployments use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Variant {
    /// 1000 buckets, leading four digits, 1-based keys
    FineSpread,
    /// 100 buckets, leading four digits, 1-based keys, sub-object values
    Percentile,
    /// 99 buckets, trailing four digits, 0-based keys
    SampleWindow,
    /// 99 buckets, trailing two digits, 0-based keys
    CoarseSample,
}

impl Variant {
    fn config(self) -> DeriverConfig {
        match self {
            Variant::FineSpread => DeriverConfig::fine_spread(),
            Variant::Percentile => DeriverConfig::percentile(),
            Variant::SampleWindow => DeriverConfig::sample_window(),
            Variant::CoarseSample => DeriverConfig::coarse_sample(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Variant::FineSpread => "fine-spread",
            Variant::Percentile => "percentile",
            Variant::SampleWindow => "sample-window",
            Variant::CoarseSample => "coarse-sample",
        }
    }

    fn all() -> [Variant; 4] {
        [
            Variant::FineSpread,
            Variant::Percentile,
            Variant::SampleWindow,
            Variant::CoarseSample,
        ]
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bucketing view over a credential collection
    Analyze {
        /// Path to a JSON file (array or JSON lines) or a CouchDB database
        /// URL, e.g. http://localhost:5984/creds
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// View variant to run
        #[arg(short, long, value_enum, default_value = "fine-spread")]
        variant: Variant,

        /// Override: number of hex digits to extract (1-16)
        #[arg(long)]
        digits: Option<u32>,

        /// Override: take the digits from the end of the identifier
        #[arg(long)]
        tail: bool,

        /// Override: number of buckets
        #[arg(long)]
        buckets: Option<u64>,

        /// Override: additive base for bucket keys
        #[arg(long)]
        key_offset: Option<u64>,

        /// CSV file to append bucket counts to
        #[arg(short, long, default_value = "buckets.csv")]
        output: String,

        /// Also print the full report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Render a view variant's design document and install it into CouchDB
    InstallView {
        /// CouchDB base URL; falls back to the COUCHDB_URL env var
        #[arg(long)]
        couchdb: Option<String>,

        /// Database to install into
        #[arg(short, long, default_value = "creds")]
        database: String,

        /// Design document / view name
        #[arg(long, default_value = "random_set_of_creds")]
        view: String,

        /// View variant to render
        #[arg(short, long, value_enum, default_value = "sample-window")]
        variant: Variant,

        /// Create the database before installing the design document
        #[arg(long)]
        create_database: bool,

        /// Leave out the _count reduce function
        #[arg(long)]
        skip_reduce: bool,
    },
    /// Print a view variant's design document as JSON
    ShowDesign {
        /// View variant to render
        #[arg(short, long, value_enum, default_value = "sample-window")]
        variant: Variant,

        /// Design document / view name
        #[arg(long, default_value = "random_set_of_creds")]
        view: String,

        /// Leave out the _count reduce function
        #[arg(long)]
        skip_reduce: bool,
    },
    /// List the built-in view variants
    ListVariants,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/creds_bucketizer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("creds_bucketizer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            source,
            variant,
            digits,
            tail,
            buckets,
            key_offset,
            output,
            json,
        } => {
            let mut config = variant.config();
            if let Some(digits) = digits {
                config.digit_count = digits;
            }
            if tail {
                config.digit_offset = DigitOffset::FromEnd;
            }
            if let Some(buckets) = buckets {
                config.bucket_count = buckets;
            }
            if let Some(key_offset) = key_offset {
                config.key_offset = key_offset;
            }
            config.validate()?;

            let docs = load_documents(&source).await?;
            let report = run_view(&docs, &config);

            info!(
                variant = variant.name(),
                total = report.stats.total_documents,
                emitted = report.stats.emitted,
                excluded = report.stats.excluded,
                failed = report.stats.failed(),
                buckets = report.occupied_buckets(),
                min_count = report.min_count(),
                max_count = report.max_count(),
                "View run complete"
            );

            append_counts(&output, variant.name(), &report)?;
            if json {
                print_json(&report)?;
            }
        }
        Commands::InstallView {
            couchdb,
            database,
            view,
            variant,
            create_database,
            skip_reduce,
        } => {
            let base_url = match couchdb.or_else(|| std::env::var("COUCHDB_URL").ok()) {
                Some(url) => url,
                None => anyhow::bail!("pass --couchdb or set COUCHDB_URL"),
            };

            let client = CouchClient::new(&base_url)?;
            if !client.is_accessible().await {
                anyhow::bail!("no CouchDB server answering on {}", base_url);
            }

            if create_database {
                info!(database = %database, "Creating database");
                client.create_database(&database).await?;
            }

            let design = design_document(&view, &variant.config(), !skip_reduce);
            client.install_design_doc(&database, &view, &design).await?;
            info!(
                database = %database,
                view = %view,
                variant = variant.name(),
                "Design document installed"
            );
        }
        Commands::ShowDesign {
            variant,
            view,
            skip_reduce,
        } => {
            let design = design_document(&view, &variant.config(), !skip_reduce);
            println!("{}", serde_json::to_string_pretty(&design)?);
        }
        Commands::ListVariants => {
            for variant in Variant::all() {
                let config = variant.config();
                info!(
                    variant = variant.name(),
                    digits = config.digit_count,
                    offset = ?config.digit_offset,
                    buckets = config.bucket_count,
                    key_offset = config.key_offset,
                    correction = ?config.divisor_correction,
                    emits = ?config.value_selector,
                    "Variant"
                );
            }
        }
    }

    Ok(())
}

/// Loads the document collection from a local file path or a CouchDB
/// database URL.
#[tracing::instrument(fields(source = %source))]
async fn load_documents(source: &str) -> Result<Vec<CredsDocument>> {
    if source.starts_with("http") {
        let Some((base_url, database)) = source.trim_end_matches('/').rsplit_once('/') else {
            anyhow::bail!("expected <couchdb-url>/<database>, got {}", source);
        };
        let client = CouchClient::new(base_url)?;
        client.fetch_documents(database).await
    } else {
        let bytes = std::fs::read(source)?;
        parse_documents(&bytes)
    }
}
