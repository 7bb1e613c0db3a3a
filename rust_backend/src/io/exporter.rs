//! Rendering and staged publication of pipeline artifacts.
//!
//! Artifacts are rendered to memory first so their checksum is known before
//! anything touches the destination. [`ArtifactWriter`] then writes each one
//! to a `.partial` sibling and renames all of them into place on
//! [`ArtifactWriter::commit`]. Existing destinations are moved to a
//! `.previous` sibling first and restored if any rename fails, so a commit
//! publishes every artifact or none. Staged files left behind by a failed or
//! abandoned publish are removed on drop.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::domain::EnrichedSale;
use crate::error::{EtlError, EtlResult};
use crate::io::checksum::calculate_checksum;
use crate::preprocessing::validator::ValidationError;

/// Column order of every exported table.
pub const EXPORT_COLUMNS: [&str; 23] = [
    "Property_ID",
    "Micro_Market",
    "Developer_Name",
    "Ticket_Price_Cr",
    "Configuration",
    "Amenity_Score",
    "Booking_Status",
    "Possession_Status",
    "Sales_Channel",
    "Purchase_Quarter",
    "Transaction_Date",
    "Latitude",
    "Longitude",
    "Booking_Flag",
    "Carpet_Area_Sqft",
    "Price_per_Sqft",
    "Quarter_Number",
    "Year",
    "Period",
    "Price_Category",
    "Season",
    "Imputed_Fields",
    "Additional_Data",
];

/// Columns of the rejected-rows CSV.
pub const REJECTED_COLUMNS: [&str; 5] = ["line", "property_id", "column", "value", "reason"];

const SQL_TABLE: &str = "housing_data";

const STAGING_SUFFIX: &str = ".partial";
const BACKUP_SUFFIX: &str = ".previous";

/// Output format of the cleaned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    #[serde(rename = "jsonl")]
    JsonLines,
    /// MySQL script creating and filling `housing_data`
    Sql,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::JsonLines => "jsonl",
            ExportFormat::Sql => "sql",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "jsonl" | "ndjson" | "json-lines" => Ok(ExportFormat::JsonLines),
            "sql" | "mysql" => Ok(ExportFormat::Sql),
            other => Err(format!(
                "unknown export format '{}' (expected csv, jsonl or sql)",
                other
            )),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exported row, fields in [`EXPORT_COLUMNS`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow<'a> {
    #[serde(rename = "Property_ID")]
    pub property_id: &'a str,
    #[serde(rename = "Micro_Market")]
    pub micro_market: Option<&'a str>,
    #[serde(rename = "Developer_Name")]
    pub developer_name: Option<&'a str>,
    #[serde(rename = "Ticket_Price_Cr")]
    pub ticket_price_cr: f64,
    #[serde(rename = "Configuration")]
    pub configuration: Option<&'a str>,
    #[serde(rename = "Amenity_Score")]
    pub amenity_score: Option<f64>,
    #[serde(rename = "Booking_Status")]
    pub booking_status: Option<&'a str>,
    #[serde(rename = "Possession_Status")]
    pub possession_status: Option<&'a str>,
    #[serde(rename = "Sales_Channel")]
    pub sales_channel: Option<&'a str>,
    #[serde(rename = "Purchase_Quarter")]
    pub purchase_quarter: Option<&'a str>,
    #[serde(rename = "Transaction_Date")]
    pub transaction_date: Option<&'a str>,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
    #[serde(rename = "Booking_Flag")]
    pub booking_flag: u8,
    #[serde(rename = "Carpet_Area_Sqft")]
    pub carpet_area_sqft: f64,
    #[serde(rename = "Price_per_Sqft")]
    pub price_per_sqft: f64,
    #[serde(rename = "Quarter_Number")]
    pub quarter_number: Option<u8>,
    #[serde(rename = "Year")]
    pub year: Option<i32>,
    #[serde(rename = "Period")]
    pub period: String,
    #[serde(rename = "Price_Category")]
    pub price_category: &'static str,
    #[serde(rename = "Season")]
    pub season: Option<&'static str>,
    /// `;`-joined
    #[serde(rename = "Imputed_Fields")]
    pub imputed_fields: String,
    /// JSON object of unmapped source columns
    #[serde(rename = "Additional_Data")]
    pub additional_data: String,
}

impl<'a> ExportRow<'a> {
    pub fn new(row: &'a EnrichedSale) -> EtlResult<Self> {
        let sale = &row.sale;
        let features = &row.features;

        Ok(Self {
            property_id: &sale.property_id,
            micro_market: sale.micro_market.as_deref(),
            developer_name: sale.developer_name.as_deref(),
            ticket_price_cr: sale.ticket_price_cr,
            configuration: sale.configuration.as_deref(),
            amenity_score: sale.amenity_score,
            booking_status: sale.booking_status.as_deref(),
            possession_status: sale.possession_status.as_deref(),
            sales_channel: sale.sales_channel.as_deref(),
            purchase_quarter: sale.purchase_quarter.as_deref(),
            transaction_date: sale.transaction_date.as_deref(),
            latitude: sale.latitude,
            longitude: sale.longitude,
            booking_flag: features.booking_flag,
            carpet_area_sqft: features.carpet_area_sqft,
            price_per_sqft: features.price_per_sqft,
            quarter_number: features.period.and_then(|p| p.quarter),
            year: features.period.map(|p| p.year),
            period: features.period_label(),
            price_category: features.price_category.as_str(),
            season: features.season.map(|s| s.as_str()),
            imputed_fields: sale.imputed_fields.join(";"),
            additional_data: serde_json::to_string(&sale.additional_data)?,
        })
    }
}

/// Render rows in the requested format.
///
/// Output depends only on the rows, so identical input gives identical bytes.
pub fn render(rows: &[EnrichedSale], format: ExportFormat) -> EtlResult<Vec<u8>> {
    let export_rows = rows
        .iter()
        .map(ExportRow::new)
        .collect::<EtlResult<Vec<_>>>()?;

    match format {
        ExportFormat::Csv => render_csv(&export_rows),
        ExportFormat::JsonLines => render_json_lines(&export_rows),
        ExportFormat::Sql => Ok(render_sql(&export_rows).into_bytes()),
    }
}

fn render_csv(rows: &[ExportRow<'_>]) -> EtlResult<Vec<u8>> {
    // Header written by hand so an empty table still has one.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(EXPORT_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    into_bytes(writer)
}

fn render_json_lines(rows: &[ExportRow<'_>]) -> EtlResult<Vec<u8>> {
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.push(b'\n');
    }
    Ok(out)
}

fn render_sql(rows: &[ExportRow<'_>]) -> String {
    let columns = EXPORT_COLUMNS
        .iter()
        .map(|c| c.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = String::new();
    sql.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {} (\n\
         \x20   id INT AUTO_INCREMENT PRIMARY KEY,\n\
         \x20   property_id VARCHAR(100) NOT NULL UNIQUE,\n\
         \x20   micro_market VARCHAR(100),\n\
         \x20   developer_name VARCHAR(100),\n\
         \x20   ticket_price_cr DECIMAL(12, 4) NOT NULL,\n\
         \x20   configuration VARCHAR(50),\n\
         \x20   amenity_score DECIMAL(4, 2),\n\
         \x20   booking_status VARCHAR(50),\n\
         \x20   possession_status VARCHAR(50),\n\
         \x20   sales_channel VARCHAR(50),\n\
         \x20   purchase_quarter VARCHAR(20),\n\
         \x20   transaction_date VARCHAR(20),\n\
         \x20   latitude DECIMAL(9, 6),\n\
         \x20   longitude DECIMAL(9, 6),\n\
         \x20   booking_flag TINYINT NOT NULL,\n\
         \x20   carpet_area_sqft DECIMAL(10, 2),\n\
         \x20   price_per_sqft DECIMAL(14, 2),\n\
         \x20   quarter_number TINYINT,\n\
         \x20   year SMALLINT,\n\
         \x20   period VARCHAR(10),\n\
         \x20   price_category VARCHAR(10),\n\
         \x20   season VARCHAR(10),\n\
         \x20   imputed_fields VARCHAR(255),\n\
         \x20   additional_data JSON,\n\
         \x20   INDEX idx_micro_market (micro_market),\n\
         \x20   INDEX idx_developer (developer_name),\n\
         \x20   INDEX idx_configuration (configuration),\n\
         \x20   INDEX idx_price_category (price_category),\n\
         \x20   INDEX idx_booking_flag (booking_flag),\n\
         \x20   INDEX idx_year_quarter (year, quarter_number)\n\
         );\n",
        SQL_TABLE
    ));

    sql.push_str("START TRANSACTION;\n");
    for row in rows {
        let values = [
            sql_text(Some(row.property_id)),
            sql_text(row.micro_market),
            sql_text(row.developer_name),
            sql_number(Some(row.ticket_price_cr)),
            sql_text(row.configuration),
            sql_number(row.amenity_score),
            sql_text(row.booking_status),
            sql_text(row.possession_status),
            sql_text(row.sales_channel),
            sql_text(row.purchase_quarter),
            sql_text(row.transaction_date),
            sql_number(row.latitude),
            sql_number(row.longitude),
            row.booking_flag.to_string(),
            sql_number(Some(row.carpet_area_sqft)),
            sql_number(Some(row.price_per_sqft)),
            sql_number(row.quarter_number),
            sql_number(row.year),
            sql_text(Some(row.period.as_str())),
            sql_text(Some(row.price_category)),
            sql_text(row.season),
            sql_text(Some(row.imputed_fields.as_str())),
            sql_text(Some(row.additional_data.as_str())),
        ];
        sql.push_str(&format!(
            "INSERT INTO {} ({}) VALUES ({});\n",
            SQL_TABLE,
            columns,
            values.join(", ")
        ));
    }
    sql.push_str("COMMIT;\n");
    sql
}

fn sql_text(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", v.replace('\\', "\\\\").replace('\'', "''")),
        None => "NULL".to_string(),
    }
}

fn sql_number<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| v.to_string())
}

/// Render rejections as CSV with a header row.
pub fn render_rejections(rejections: &[ValidationError]) -> EtlResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(REJECTED_COLUMNS)?;
    for rejection in rejections {
        writer.write_record([
            rejection.line.to_string().as_str(),
            rejection.property_id.as_deref().unwrap_or(""),
            rejection.column.as_deref().unwrap_or(""),
            rejection.value.as_deref().unwrap_or(""),
            rejection.reason.as_str(),
        ])?;
    }
    into_bytes(writer)
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> EtlResult<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| EtlError::Serialization(e.to_string()))
}

/// Location, size and checksum of a published artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub rows: usize,
    pub bytes: usize,
    pub sha256: String,
}

impl ArtifactInfo {
    pub fn describe(path: &Path, rows: usize, content: &[u8]) -> Self {
        Self {
            path: path.to_path_buf(),
            rows,
            bytes: content.len(),
            sha256: calculate_checksum(content),
        }
    }
}

#[derive(Debug)]
struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

/// Writes artifacts next to their destinations and publishes them together.
#[derive(Debug, Default)]
pub struct ArtifactWriter {
    staged: Vec<StagedFile>,
}

impl ArtifactWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `content` to the staging sibling of `target`.
    pub fn stage(&mut self, target: &Path, content: &[u8]) -> EtlResult<()> {
        let staged = staging_path(target)?;

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
        }

        // Registered before writing so a partial write is still cleaned up.
        self.staged.push(StagedFile {
            staged: staged.clone(),
            target: target.to_path_buf(),
        });
        fs::write(&staged, content).map_err(|e| EtlError::io(&staged, e))?;

        debug!("Staged {} bytes at {}", content.len(), staged.display());
        Ok(())
    }

    /// Rename every staged file into place.
    ///
    /// Either all targets are replaced or, on error, every target is left
    /// as it was before the call.
    pub fn commit(mut self) -> EtlResult<Vec<PathBuf>> {
        for file in &self.staged {
            if file.target.is_dir() {
                return Err(EtlError::io(
                    &file.target,
                    io::Error::new(io::ErrorKind::AlreadyExists, "a directory is in the way"),
                ));
            }
        }

        let staged = std::mem::take(&mut self.staged);
        let mut published: Vec<Published> = Vec::with_capacity(staged.len());

        let mut pending = staged.into_iter();
        while let Some(file) = pending.next() {
            if let Err(err) = publish(&file, &mut published) {
                // Put the rest back so drop removes them.
                self.staged.push(file);
                self.staged.extend(pending);
                roll_back(published);
                return Err(err);
            }
        }

        let mut targets = Vec::with_capacity(published.len());
        for entry in published {
            if let Some(backup) = &entry.backup {
                if let Err(e) = fs::remove_file(backup) {
                    warn!("Could not remove {}: {}", backup.display(), e);
                }
            }
            info!("Published {}", entry.target.display());
            targets.push(entry.target);
        }
        Ok(targets)
    }

    /// Remove every staged file without publishing.
    pub fn abort(self) {}
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        for file in self.staged.drain(..) {
            if file.staged.exists() {
                if let Err(e) = fs::remove_file(&file.staged) {
                    warn!("Could not remove {}: {}", file.staged.display(), e);
                }
            }
        }
    }
}

/// A target replaced during `commit`, with the file it displaced.
struct Published {
    target: PathBuf,
    backup: Option<PathBuf>,
}

fn publish(file: &StagedFile, published: &mut Vec<Published>) -> EtlResult<()> {
    let backup = if file.target.exists() {
        let backup = sibling(&file.target, BACKUP_SUFFIX)?;
        fs::rename(&file.target, &backup).map_err(|e| EtlError::io(&file.target, e))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(&file.staged, &file.target) {
        if let Some(backup) = &backup {
            restore(backup, &file.target);
        }
        return Err(EtlError::io(&file.target, e));
    }

    published.push(Published {
        target: file.target.clone(),
        backup,
    });
    Ok(())
}

/// Undo published renames, newest first.
fn roll_back(published: Vec<Published>) {
    for entry in published.into_iter().rev() {
        if let Err(e) = fs::remove_file(&entry.target) {
            warn!("Could not remove {}: {}", entry.target.display(), e);
        }
        if let Some(backup) = &entry.backup {
            restore(backup, &entry.target);
        }
    }
}

fn restore(backup: &Path, target: &Path) {
    match fs::rename(backup, target) {
        Ok(()) => debug!("Restored {}", target.display()),
        Err(e) => warn!(
            "Could not restore {} from {}: {}",
            target.display(),
            backup.display(),
            e
        ),
    }
}

fn staging_path(target: &Path) -> EtlResult<PathBuf> {
    sibling(target, STAGING_SUFFIX)
}

fn sibling(target: &Path, suffix: &str) -> EtlResult<PathBuf> {
    let name = target.file_name().ok_or_else(|| {
        EtlError::Config(format!("'{}' is not a file path", target.display()))
    })?;
    let mut sibling: OsString = name.to_os_string();
    sibling.push(suffix);
    Ok(target.with_file_name(sibling))
}

/// Render and publish one table.
pub fn export(
    rows: &[EnrichedSale],
    destination: &Path,
    format: ExportFormat,
) -> EtlResult<ArtifactInfo> {
    let content = render(rows, format)?;
    let info = ArtifactInfo::describe(destination, rows.len(), &content);

    let mut writer = ArtifactWriter::new();
    writer.stage(destination, &content)?;
    writer.commit()?;

    Ok(info)
}
