use log::{error, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::algorithms::analysis::compute_measures;
use crate::config::PipelineConfig;
use crate::core::domain::{EnrichedSale, Field, PropertySale};
use crate::error::{EtlError, EtlResult};
use crate::io::exporter::{self, ArtifactInfo, ArtifactWriter};
use crate::io::report::{RunReport, RunStatus};
use crate::parsing::csv_parser::{self, RawTable};
use crate::preprocessing::cleaner::{CleaningOutcome, SaleCleaner};
use crate::preprocessing::enricher::FeatureEnricher;
use crate::preprocessing::validator::{SaleValidator, ValidationOutcome};

/// Columns a source can never do without.
const KEY_FIELDS: [Field; 2] = [Field::PropertyId, Field::TicketPrice];

/// Result of processing a table in memory
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub rows: Vec<EnrichedSale>,
    /// Stage counts, rejections and measures; no artifact
    pub report: RunReport,
}

/// A run that halted. The report describes how far it got.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: EtlError,
    pub report: Box<RunReport>,
}

/// Main ingestion pipeline: load, validate, clean, derive features, export.
///
/// Each stage is exposed on its own so callers can stop early or inspect
/// intermediate tables; [`HousingPipeline::run`] chains them against the
/// configured files.
pub struct HousingPipeline {
    config: PipelineConfig,
    required: Vec<Field>,
}

impl HousingPipeline {
    /// Create a pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> EtlResult<Self> {
        config.check()?;

        let mut required = config.required_fields()?;
        for key in KEY_FIELDS {
            if !required.contains(&key) {
                required.push(key);
            }
        }

        Ok(Self { config, required })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the raw CSV at `source`.
    pub fn load(&self, source: &Path) -> EtlResult<RawTable> {
        csv_parser::load_csv(source, &self.required)
    }

    /// Load a raw CSV from any reader.
    pub fn load_reader<R: Read>(&self, reader: R) -> EtlResult<RawTable> {
        csv_parser::load_csv_reader(reader, &self.required)
    }

    pub fn validate(&self, table: &RawTable) -> ValidationOutcome {
        SaleValidator::new(self.config.validation.clone()).validate(table)
    }

    pub fn clean(&self, rows: Vec<PropertySale>) -> CleaningOutcome {
        SaleCleaner::new(self.config.cleaning.clone()).clean(rows)
    }

    pub fn derive_features(&self, rows: Vec<PropertySale>) -> Vec<EnrichedSale> {
        FeatureEnricher::new(self.config.features.clone()).enrich(rows)
    }

    /// Render `rows` in the configured format and publish them at `destination`.
    pub fn export(&self, rows: &[EnrichedSale], destination: &Path) -> EtlResult<ArtifactInfo> {
        exporter::export(rows, destination, self.config.pipeline.format)
    }

    /// Validate, clean and enrich a loaded table, recording every stage in `report`.
    pub fn transform(&self, table: RawTable, report: &mut RunReport) -> Vec<EnrichedSale> {
        report.schema.column_mapping = table.schema.mapping();
        report.schema.unmapped_columns = table.schema.unmapped_columns();
        report.record_stage("load", table.rows_read(), table.rows_read());

        let validated = self.validate(&table);
        report.record_stage(
            "validate",
            validated.report.stats.rows_read,
            validated.valid_rows.len(),
        );
        report.validation = validated.report.stats;
        report.warnings = validated.report.warnings;
        report.rejections = validated.rejected_rows;

        let cleaned = self.clean(validated.valid_rows);
        report.record_stage("clean", cleaned.rows.len(), cleaned.rows.len());
        report.cleaning = cleaned.stats;

        let rows = self.derive_features(cleaned.rows);
        report.record_stage("derive_features", rows.len(), rows.len());
        report.measures = Some(compute_measures(&rows));

        rows
    }

    /// Process CSV text entirely in memory. Nothing is written.
    pub fn process_str(&self, csv: &str) -> EtlResult<ProcessResult> {
        self.process_reader(csv.as_bytes())
    }

    pub fn process_reader<R: Read>(&self, reader: R) -> EtlResult<ProcessResult> {
        let mut report = RunReport::new(&self.config);
        report.source = None;
        report.destination = None;

        let table = self.load_reader(reader)?;
        let rows = self.transform(table, &mut report);
        report.status = RunStatus::Succeeded;
        Ok(ProcessResult { rows, report })
    }

    /// Run the whole batch against the configured input and outputs.
    ///
    /// The data artifact, the rejected-rows CSV and the report are staged
    /// together and published only once all of them were written. On
    /// failure no data artifact is published, but the report (if configured)
    /// is still written with status `failed`.
    pub fn run(&self) -> Result<RunReport, RunFailure> {
        let started = Instant::now();
        let mut report = RunReport::new(&self.config);

        let result = self.run_stages(&mut report);
        match result {
            Ok(()) => {
                info!(
                    "Pipeline finished in {:.2?}: {} rows exported, {} rejected",
                    started.elapsed(),
                    report.validation.rows_valid,
                    report.validation.rows_rejected
                );
                Ok(report)
            }
            Err((stage, err)) => {
                error!("Pipeline failed during {}: {}", stage, err);
                report.record_failure(stage, &err);
                self.write_failure_report(&report);
                Err(RunFailure {
                    error: err,
                    report: Box::new(report),
                })
            }
        }
    }

    fn run_stages(&self, report: &mut RunReport) -> Result<(), (&'static str, EtlError)> {
        let settings = &self.config.pipeline;
        let at = |stage: &'static str| move |e: EtlError| (stage, e);

        let source = settings
            .input
            .as_deref()
            .ok_or_else(|| EtlError::Config("no input file configured".to_string()))
            .map_err(at("configure"))?;
        let destination = settings
            .output
            .as_deref()
            .ok_or_else(|| EtlError::Config("no output file configured".to_string()))
            .map_err(at("configure"))?;
        self.check_outputs(source, destination)
            .map_err(at("configure"))?;

        info!("Loading raw data from {}", source.display());
        let table = self.load(source).map_err(at("load"))?;

        let rows = self.transform(table, report);

        let content = exporter::render(&rows, settings.format).map_err(at("export"))?;
        let artifact = ArtifactInfo::describe(destination, rows.len(), &content);

        let rejected = match &settings.rejected {
            Some(path) => {
                let bytes = exporter::render_rejections(&report.rejections).map_err(at("export"))?;
                Some((path.as_path(), bytes))
            }
            None => None,
        };

        report.record_stage("export", rows.len(), rows.len());
        report.artifact = Some(artifact);
        let rejected_count = report.rejections.len();
        report.rejected_artifact = rejected
            .as_ref()
            .map(|(path, bytes)| ArtifactInfo::describe(path, rejected_count, bytes));
        report.status = RunStatus::Succeeded;

        let mut writer = ArtifactWriter::new();
        writer
            .stage(destination, &content)
            .map_err(at("export"))?;
        if let Some((path, bytes)) = &rejected {
            writer.stage(path, bytes).map_err(at("export"))?;
        }
        if let Some(path) = &settings.report {
            let json = report.to_json().map_err(at("report"))?;
            writer.stage(path, &json).map_err(at("report"))?;
        }
        writer.commit().map_err(at("export"))?;

        Ok(())
    }

    /// Outputs must not overwrite the raw source or each other.
    fn check_outputs(&self, source: &Path, destination: &Path) -> EtlResult<()> {
        let settings = &self.config.pipeline;
        let outputs: Vec<&Path> = std::iter::once(destination)
            .chain(settings.rejected.as_deref())
            .chain(settings.report.as_deref())
            .collect();

        for (idx, output) in outputs.iter().enumerate() {
            if same_file(source, output) {
                return Err(EtlError::Config(format!(
                    "refusing to overwrite the raw source {}",
                    source.display()
                )));
            }
            if outputs[..idx].iter().any(|other| same_file(other, output)) {
                return Err(EtlError::Config(format!(
                    "{} is configured as more than one output",
                    output.display()
                )));
            }
        }
        Ok(())
    }

    fn write_failure_report(&self, report: &RunReport) {
        let Some(path) = &self.config.pipeline.report else {
            return;
        };

        let outcome = report.to_json().and_then(|json| {
            let mut writer = ArtifactWriter::new();
            writer.stage(path, &json)?;
            writer.commit()
        });
        if let Err(e) = outcome {
            warn!("Could not write run report {}: {}", path.display(), e);
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (absolute(a), absolute(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Canonical path, resolving through the parent when the file does not exist yet.
fn absolute(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Some(canonical);
    }
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    parent.canonicalize().ok().map(|p| p.join(name))
}
