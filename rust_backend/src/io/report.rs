//! Machine-readable run report.
//!
//! The report carries no timestamps or durations: two runs over the same
//! source with the same configuration serialize to identical JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::algorithms::analysis::DashboardMeasures;
use crate::config::{AmenityPolicy, MissingPolicy, PipelineConfig};
use crate::error::{EtlError, EtlResult};
use crate::io::exporter::{ArtifactInfo, ExportFormat};
use crate::preprocessing::cleaner::CleaningStats;
use crate::preprocessing::validator::{ValidationError, ValidationStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => f.write_str("succeeded"),
            RunStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Error that halted the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub kind: String,
    /// Stage that was running when the error occurred
    pub stage: String,
    pub message: String,
}

/// How the source headers were matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    /// Canonical column to source header
    pub column_mapping: BTreeMap<String, String>,
    pub unmapped_columns: Vec<String>,
    /// Required columns absent from the source (schema failures only)
    pub missing_columns: Vec<String>,
}

/// Rows entering and leaving one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub rows_in: usize,
    pub rows_out: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub error: Option<ErrorSummary>,
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub format: ExportFormat,
    pub amenity_policy: AmenityPolicy,
    pub missing_policy: MissingPolicy,
    pub schema: SchemaSummary,
    pub stages: Vec<StageSummary>,
    pub validation: ValidationStats,
    pub cleaning: CleaningStats,
    pub rejections: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub measures: Option<DashboardMeasures>,
    pub artifact: Option<ArtifactInfo>,
    pub rejected_artifact: Option<ArtifactInfo>,
}

impl RunReport {
    /// Empty report for a run about to start.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            status: RunStatus::Failed,
            error: None,
            source: config.pipeline.input.clone(),
            destination: config.pipeline.output.clone(),
            format: config.pipeline.format,
            amenity_policy: config.validation.amenity_policy,
            missing_policy: config.cleaning.missing_policy,
            schema: SchemaSummary::default(),
            stages: Vec::new(),
            validation: ValidationStats::default(),
            cleaning: CleaningStats::default(),
            rejections: Vec::new(),
            warnings: Vec::new(),
            measures: None,
            artifact: None,
            rejected_artifact: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn record_stage(&mut self, stage: &str, rows_in: usize, rows_out: usize) {
        self.stages.push(StageSummary {
            stage: stage.to_string(),
            rows_in,
            rows_out,
        });
    }

    /// Mark the run failed; published artifacts are dropped from the report.
    pub fn record_failure(&mut self, stage: &str, error: &EtlError) {
        if let EtlError::Schema { missing } = error {
            self.schema.missing_columns = missing.clone();
        }
        self.status = RunStatus::Failed;
        self.error = Some(ErrorSummary {
            kind: error.kind().to_string(),
            stage: stage.to_string(),
            message: error.to_string(),
        });
        self.artifact = None;
        self.rejected_artifact = None;
    }

    pub fn to_json(&self) -> EtlResult<Vec<u8>> {
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        Ok(json)
    }

    pub fn from_json(content: &[u8]) -> EtlResult<Self> {
        Ok(serde_json::from_slice(content)?)
    }
}

/// One-screen summary for the console.
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status:        {}", self.status)?;
        if let Some(source) = &self.source {
            writeln!(f, "Source:        {}", source.display())?;
        }
        writeln!(f, "Rows read:     {}", self.validation.rows_read)?;
        writeln!(f, "Rows valid:    {}", self.validation.rows_valid)?;
        writeln!(f, "Rows rejected: {}", self.validation.rows_rejected)?;
        for (reason, count) in &self.validation.rejections_by_reason {
            writeln!(f, "  {:<28} {}", reason, count)?;
        }
        if let Some(measures) = &self.measures {
            writeln!(
                f,
                "Bookings:      {} of {} ({:.1}%)",
                measures.total_bookings,
                measures.total_projects,
                measures.conversion_rate * 100.0
            )?;
            writeln!(f, "Revenue (Cr):  {:.2}", measures.total_revenue_cr)?;
        }
        if let Some(artifact) = &self.artifact {
            writeln!(
                f,
                "Output:        {} ({}, sha256 {})",
                artifact.path.display(),
                self.format,
                artifact.sha256
            )?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error:         [{}] {}", error.stage, error.message)?;
        }
        Ok(())
    }
}
