//! Luxury housing ETL command line entry point.
//!
//! Runs load, validate, clean, derive features and export over one raw
//! extract and prints a short summary.
//!
//! # Usage
//!
//! ```bash
//! housing-etl --input data/raw/luxury_housing.csv \
//!     --output data/processed/luxury_housing_cleaned.csv \
//!     --report data/processed/run_report.json
//!
//! # Settings from a file, with a flag overriding the format
//! housing-etl --config housing_etl.toml --format sql
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use luxury_housing_etl::config::{AmenityPolicy, MissingPolicy, PipelineConfig};
use luxury_housing_etl::io::{ExportFormat, RunReport};
use luxury_housing_etl::preprocessing::HousingPipeline;

/// Clean and enrich a raw luxury housing sales extract.
#[derive(Parser, Debug)]
#[command(name = "housing-etl", version)]
struct Args {
    /// TOML configuration file. Defaults to housing_etl.toml if one is found.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Raw CSV extract.
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Cleaned output file.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// JSON run report, written on success and on failure.
    #[arg(long)]
    report: Option<PathBuf>,

    /// CSV of rejected rows.
    #[arg(long)]
    rejected: Option<PathBuf>,

    /// Output format: csv, jsonl or sql.
    #[arg(long)]
    format: Option<ExportFormat>,

    /// Out-of-range amenity scores: clip or reject.
    #[arg(long)]
    amenity_policy: Option<AmenityPolicy>,

    /// Missing non-key fields: fill or flag.
    #[arg(long)]
    missing_policy: Option<MissingPolicy>,
}

impl Args {
    fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => match PipelineConfig::find_default_location() {
                Some(path) => {
                    info!("Using configuration {}", path.display());
                    PipelineConfig::from_file(&path).with_context(|| {
                        format!("Failed to load configuration from {}", path.display())
                    })?
                }
                None => PipelineConfig::default(),
            },
        };

        let pipeline = &mut config.pipeline;
        if let Some(input) = &self.input {
            pipeline.input = Some(input.clone());
        }
        if let Some(output) = &self.output {
            pipeline.output = Some(output.clone());
        }
        if let Some(report) = &self.report {
            pipeline.report = Some(report.clone());
        }
        if let Some(rejected) = &self.rejected {
            pipeline.rejected = Some(rejected.clone());
        }
        if let Some(format) = self.format {
            pipeline.format = format;
        }
        if let Some(policy) = self.amenity_policy {
            config.validation.amenity_policy = policy;
        }
        if let Some(policy) = self.missing_policy {
            config.cleaning.missing_policy = policy;
        }

        Ok(config)
    }
}

fn execute(args: &Args) -> Result<RunReport> {
    let config = args.load_config()?;
    let pipeline = HousingPipeline::new(config).context("Invalid pipeline configuration")?;

    match pipeline.run() {
        Ok(report) => Ok(report),
        Err(failure) => {
            print!("{}", failure.report);
            Err(failure.error).context("Pipeline run failed")
        }
    }
}

fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    match execute(&args) {
        Ok(report) => {
            print!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
