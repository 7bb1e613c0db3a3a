//! Row validation with detailed rejection and warning reporting.
//!
//! This module turns raw records into [`PropertySale`]s. A row that fails a
//! key-column check is moved to the rejected set together with a
//! [`ValidationError`] naming the line, column, offending value and reason.
//! Rejections never abort the run.
//!
//! Checks, in order (the first failure decides the reason):
//!
//! 1. the row could be decoded
//! 2. `Property_ID` is present
//! 3. `Property_ID` was not seen on an earlier row (compared after collapsing
//!    whitespace runs, the form the cleaner publishes)
//! 4. `Ticket_Price_Cr` is present, numeric and not negative
//! 5. `Amenity_Score` is numeric and within bounds (or clipped, per policy)

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::config::{AmenityPolicy, ValidationSettings};
use crate::core::domain::{Field, PropertySale, RawRecord};
use crate::parsing::csv_parser::{MalformedRow, RawTable};
use crate::parsing::values::{parse_number, parse_price_cr};
use crate::preprocessing::cleaner::collapse_whitespace;

/// Warnings of one kind listed individually before being summarized.
const MAX_LISTED_WARNINGS: usize = 20;

/// Why a row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RejectReason {
    #[serde(rename = "malformed record")]
    MalformedRecord,
    #[serde(rename = "missing property id")]
    MissingPropertyId,
    #[serde(rename = "duplicate property id")]
    DuplicatePropertyId,
    #[serde(rename = "missing price")]
    MissingPrice,
    #[serde(rename = "non-numeric price")]
    NonNumericPrice,
    #[serde(rename = "negative price")]
    NegativePrice,
    #[serde(rename = "non-numeric amenity score")]
    NonNumericAmenityScore,
    #[serde(rename = "amenity score out of range")]
    AmenityScoreOutOfRange,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MalformedRecord => "malformed record",
            RejectReason::MissingPropertyId => "missing property id",
            RejectReason::DuplicatePropertyId => "duplicate property id",
            RejectReason::MissingPrice => "missing price",
            RejectReason::NonNumericPrice => "non-numeric price",
            RejectReason::NegativePrice => "negative price",
            RejectReason::NonNumericAmenityScore => "non-numeric amenity score",
            RejectReason::AmenityScoreOutOfRange => "amenity score out of range",
        }
    }

    /// Column the check applies to.
    pub fn field(&self) -> Option<Field> {
        match self {
            RejectReason::MalformedRecord => None,
            RejectReason::MissingPropertyId | RejectReason::DuplicatePropertyId => {
                Some(Field::PropertyId)
            }
            RejectReason::MissingPrice
            | RejectReason::NonNumericPrice
            | RejectReason::NegativePrice => Some(Field::TicketPrice),
            RejectReason::NonNumericAmenityScore | RejectReason::AmenityScoreOutOfRange => {
                Some(Field::AmenityScore)
            }
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row-level validation failure. Collected, never thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub line: usize,
    pub property_id: Option<String>,
    pub column: Option<String>,
    pub value: Option<String>,
    pub reason: RejectReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ValidationError {
    fn for_record(record: &RawRecord, reason: RejectReason) -> Self {
        let field = reason.field();
        Self {
            line: record.line,
            property_id: record.get(Field::PropertyId).map(str::to_string),
            column: field.map(|f| f.canonical_name().to_string()),
            value: field.and_then(|f| record.get(f)).map(str::to_string),
            reason,
            detail: None,
        }
    }

    fn malformed(row: &MalformedRow) -> Self {
        Self {
            line: row.line,
            property_id: None,
            column: None,
            value: None,
            reason: RejectReason::MalformedRecord,
            detail: Some(row.message.clone()),
        }
    }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)?;
        if let Some(id) = &self.property_id {
            write!(f, " (Property_ID {})", id)?;
        }
        if let (Some(column), Some(value)) = (&self.column, &self.value) {
            write!(f, " [{} = {:?}]", column, value)?;
        }
        Ok(())
    }
}

/// Summary statistics computed during validation.
///
/// * `rows_read` - rows in the source, malformed ones included
/// * `amenity_clipped` - scores clamped to the declared bound
/// * `amenity_unparsed` - non-numeric scores treated as missing (clip policy)
/// * `coordinates_dropped` - latitude/longitude cells dropped as invalid
/// * `carpet_area_dropped` - non-positive or non-numeric carpet areas dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub rows_read: usize,
    pub rows_valid: usize,
    pub rows_rejected: usize,
    pub rejections_by_reason: BTreeMap<String, usize>,
    pub amenity_clipped: usize,
    pub amenity_unparsed: usize,
    pub coordinates_dropped: usize,
    pub carpet_area_dropped: usize,
}

/// Validation report: statistics plus non-fatal warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
    pub stats: ValidationStats,
}

impl ValidationReport {
    fn warn(&mut self, counter: usize, message: String) {
        if counter <= MAX_LISTED_WARNINGS {
            self.warnings.push(message);
        }
    }

    fn summarize(&mut self, counter: usize, what: &str) {
        if counter > MAX_LISTED_WARNINGS {
            self.warnings.push(format!(
                "Total {}: {} (showing first {})",
                what, counter, MAX_LISTED_WARNINGS
            ));
        }
    }
}

/// Output of `validate`.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub valid_rows: Vec<PropertySale>,
    pub rejected_rows: Vec<ValidationError>,
    pub report: ValidationReport,
}

/// Validator for raw housing sale records.
///
/// # Examples
///
/// ```
/// use luxury_housing_etl::config::ValidationSettings;
/// use luxury_housing_etl::core::{Field, RawRecord};
/// use luxury_housing_etl::parsing::RawTable;
/// use luxury_housing_etl::preprocessing::validator::{RejectReason, SaleValidator};
///
/// let mut table = RawTable::default();
/// table.records.push(
///     RawRecord::new(2)
///         .with(Field::PropertyId, "P1")
///         .with(Field::TicketPrice, "-5")
///         .with(Field::AmenityScore, "7"),
/// );
///
/// let outcome = SaleValidator::new(ValidationSettings::default()).validate(&table);
/// assert!(outcome.valid_rows.is_empty());
/// assert_eq!(outcome.rejected_rows[0].reason, RejectReason::NegativePrice);
/// ```
pub struct SaleValidator {
    settings: ValidationSettings,
}

impl SaleValidator {
    pub fn new(settings: ValidationSettings) -> Self {
        Self { settings }
    }

    /// Split a raw table into valid and rejected rows.
    pub fn validate(&self, table: &RawTable) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut seen_ids: HashSet<String> = HashSet::new();

        outcome.report.stats.rows_read = table.rows_read();

        // Merge malformed rows back in by line so rejections stay in file order.
        let mut malformed = table.malformed.iter().peekable();

        for record in &table.records {
            while let Some(row) = malformed.next_if(|m| m.line < record.line) {
                outcome.rejected_rows.push(ValidationError::malformed(row));
            }

            match self.validate_record(record, &mut seen_ids, &mut outcome.report) {
                Ok(sale) => outcome.valid_rows.push(sale),
                Err(rejection) => outcome.rejected_rows.push(rejection),
            }
        }
        outcome
            .rejected_rows
            .extend(malformed.map(ValidationError::malformed));

        let report = &mut outcome.report;
        let (clipped, unparsed, dropped, areas) = (
            report.stats.amenity_clipped,
            report.stats.amenity_unparsed,
            report.stats.coordinates_dropped,
            report.stats.carpet_area_dropped,
        );
        report.summarize(clipped, "amenity scores clipped");
        report.summarize(unparsed, "non-numeric amenity scores");
        report.summarize(dropped, "coordinates dropped");
        report.summarize(areas, "carpet areas dropped");

        let stats = &mut outcome.report.stats;
        stats.rows_valid = outcome.valid_rows.len();
        stats.rows_rejected = outcome.rejected_rows.len();
        for rejection in &outcome.rejected_rows {
            *stats
                .rejections_by_reason
                .entry(rejection.reason.as_str().to_string())
                .or_insert(0) += 1;
        }

        info!(
            "Validation complete: {} read, {} valid, {} rejected",
            stats.rows_read, stats.rows_valid, stats.rows_rejected
        );
        if stats.rows_rejected > 0 {
            warn!("Rejections by reason: {:?}", stats.rejections_by_reason);
        }

        outcome
    }

    fn validate_record(
        &self,
        record: &RawRecord,
        seen_ids: &mut HashSet<String>,
        report: &mut ValidationReport,
    ) -> Result<PropertySale, ValidationError> {
        let property_id = record
            .get(Field::PropertyId)
            .map(collapse_whitespace)
            .ok_or_else(|| ValidationError::for_record(record, RejectReason::MissingPropertyId))?;

        if !seen_ids.insert(property_id.clone()) {
            return Err(ValidationError::for_record(
                record,
                RejectReason::DuplicatePropertyId,
            ));
        }

        let raw_price = record
            .get(Field::TicketPrice)
            .ok_or_else(|| ValidationError::for_record(record, RejectReason::MissingPrice))?;
        let price = parse_price_cr(raw_price)
            .ok_or_else(|| ValidationError::for_record(record, RejectReason::NonNumericPrice))?;
        if price < 0.0 {
            return Err(ValidationError::for_record(record, RejectReason::NegativePrice));
        }

        let amenity_score = self.check_amenity(record, &property_id, report)?;

        let mut sale = PropertySale::new(record.line, property_id, price);
        sale.amenity_score = amenity_score;
        sale.micro_market = text(record, Field::MicroMarket);
        sale.developer_name = text(record, Field::DeveloperName);
        sale.configuration = text(record, Field::Configuration);
        sale.booking_status = text(record, Field::BookingStatus);
        sale.possession_status = text(record, Field::PossessionStatus);
        sale.sales_channel = text(record, Field::SalesChannel);
        sale.purchase_quarter = text(record, Field::PurchaseQuarter);
        sale.transaction_date = text(record, Field::TransactionDate);
        sale.latitude = check_coordinate(record, Field::Latitude, 90.0, report);
        sale.longitude = check_coordinate(record, Field::Longitude, 180.0, report);
        sale.carpet_area_sqft = check_carpet_area(record, report);
        sale.additional_data = record.extra.clone();

        Ok(sale)
    }

    fn check_amenity(
        &self,
        record: &RawRecord,
        property_id: &str,
        report: &mut ValidationReport,
    ) -> Result<Option<f64>, ValidationError> {
        let Some(raw) = record.get(Field::AmenityScore) else {
            return Ok(None);
        };

        let (min, max) = (self.settings.amenity_min, self.settings.amenity_max);

        let Some(score) = parse_number(raw) else {
            return match self.settings.amenity_policy {
                AmenityPolicy::Reject => Err(ValidationError::for_record(
                    record,
                    RejectReason::NonNumericAmenityScore,
                )),
                AmenityPolicy::Clip => {
                    report.stats.amenity_unparsed += 1;
                    report.warn(
                        report.stats.amenity_unparsed,
                        format!(
                            "Line {} ({}): non-numeric Amenity_Score {:?} treated as missing",
                            record.line, property_id, raw
                        ),
                    );
                    Ok(None)
                }
            };
        };

        if (min..=max).contains(&score) {
            return Ok(Some(score));
        }

        match self.settings.amenity_policy {
            AmenityPolicy::Reject => Err(ValidationError::for_record(
                record,
                RejectReason::AmenityScoreOutOfRange,
            )
            .with_detail(format!("expected {} to {}", min, max))),
            AmenityPolicy::Clip => {
                let clipped = score.clamp(min, max);
                report.stats.amenity_clipped += 1;
                report.warn(
                    report.stats.amenity_clipped,
                    format!(
                        "Line {} ({}): Amenity_Score {} clipped to {}",
                        record.line, property_id, score, clipped
                    ),
                );
                Ok(Some(clipped))
            }
        }
    }
}

/// Validate a raw table with the given settings.
pub fn validate(table: &RawTable, settings: &ValidationSettings) -> ValidationOutcome {
    SaleValidator::new(settings.clone()).validate(table)
}

fn text(record: &RawRecord, field: Field) -> Option<String> {
    record.get(field).map(str::to_string)
}

fn check_coordinate(
    record: &RawRecord,
    field: Field,
    bound: f64,
    report: &mut ValidationReport,
) -> Option<f64> {
    let raw = record.get(field)?;
    match parse_number(raw) {
        Some(v) if v.abs() <= bound => Some(v),
        _ => {
            report.stats.coordinates_dropped += 1;
            report.warn(
                report.stats.coordinates_dropped,
                format!("Line {}: invalid {} {:?} dropped", record.line, field, raw),
            );
            None
        }
    }
}

fn check_carpet_area(record: &RawRecord, report: &mut ValidationReport) -> Option<f64> {
    let raw = record.get(Field::CarpetArea)?;
    match parse_number(raw) {
        Some(v) if v > 0.0 => Some(v),
        _ => {
            report.stats.carpet_area_dropped += 1;
            report.warn(
                report.stats.carpet_area_dropped,
                format!(
                    "Line {}: invalid Carpet_Area_Sqft {:?} dropped",
                    record.line, raw
                ),
            );
            None
        }
    }
}
