//! Artifact output: rendering, staged publication, checksums and the run
//! report.
//!
//! # Example
//!
//! ```no_run
//! use luxury_housing_etl::io::exporter::{export, ExportFormat};
//! use std::path::Path;
//!
//! # fn example(rows: &[luxury_housing_etl::core::EnrichedSale]) -> luxury_housing_etl::error::EtlResult<()> {
//! let info = export(rows, Path::new("out/housing_clean.csv"), ExportFormat::Csv)?;
//! println!("Wrote {} rows, sha256 {}", info.rows, info.sha256);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod exporter;
pub mod report;

pub use checksum::calculate_checksum;
pub use exporter::{
    export, render, render_rejections, ArtifactInfo, ArtifactWriter, ExportFormat, ExportRow,
    EXPORT_COLUMNS,
};
pub use report::{ErrorSummary, RunReport, RunStatus, SchemaSummary, StageSummary};
