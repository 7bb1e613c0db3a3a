//! Normalization of validated records.
//!
//! Text cells are trimmed and whitespace runs collapsed. Categorical columns
//! are title-cased, configurations are upper-cased with the bedroom count
//! joined to `BHK`. Missing non-key fields are then filled or flagged
//! according to [`MissingPolicy`]; either way the field lands in the row's
//! `imputed_fields` so downstream consumers can tell observed values from
//! defaults.

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{CleaningSettings, MissingPolicy};
use crate::core::domain::{Field, PropertySale};

static BHK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)\s*BHK").expect("valid BHK regex"));
static PLUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\+\s*").expect("valid plus regex"));

/// Fields the missing-value policy applies to.
const FILLABLE: [Field; 7] = [
    Field::MicroMarket,
    Field::DeveloperName,
    Field::Configuration,
    Field::AmenityScore,
    Field::BookingStatus,
    Field::PossessionStatus,
    Field::SalesChannel,
];

/// Per-field counts of filled and flagged values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningStats {
    pub filled: BTreeMap<String, usize>,
    pub flagged: BTreeMap<String, usize>,
    /// Median used to fill `Amenity_Score`, if any row had a score
    pub amenity_fill_value: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CleaningOutcome {
    pub rows: Vec<PropertySale>,
    pub stats: CleaningStats,
}

pub struct SaleCleaner {
    settings: CleaningSettings,
}

impl SaleCleaner {
    pub fn new(settings: CleaningSettings) -> Self {
        Self { settings }
    }

    pub fn clean(&self, rows: Vec<PropertySale>) -> CleaningOutcome {
        let amenity_median = median(rows.iter().filter_map(|r| r.amenity_score));
        let mut stats = CleaningStats {
            amenity_fill_value: amenity_median,
            ..Default::default()
        };

        let rows = rows
            .into_iter()
            .map(|mut row| {
                normalize_row(&mut row);
                for field in FILLABLE {
                    self.apply_missing_policy(&mut row, field, amenity_median, &mut stats);
                }
                row
            })
            .collect::<Vec<_>>();

        info!(
            "Cleaning complete: {} rows, filled {:?}, flagged {:?}",
            rows.len(),
            stats.filled,
            stats.flagged
        );

        CleaningOutcome { rows, stats }
    }

    fn apply_missing_policy(
        &self,
        row: &mut PropertySale,
        field: Field,
        amenity_median: Option<f64>,
        stats: &mut CleaningStats,
    ) {
        let name = field.canonical_name();

        if field == Field::AmenityScore {
            if row.amenity_score.is_some() {
                return;
            }
            match (self.settings.missing_policy, amenity_median) {
                (MissingPolicy::Fill, Some(median)) => {
                    row.amenity_score = Some(median);
                    record(row, stats, name, false);
                }
                _ => record(row, stats, name, true),
            }
            return;
        }

        let slot = match field {
            Field::MicroMarket => &mut row.micro_market,
            Field::DeveloperName => &mut row.developer_name,
            Field::Configuration => &mut row.configuration,
            Field::BookingStatus => &mut row.booking_status,
            Field::PossessionStatus => &mut row.possession_status,
            Field::SalesChannel => &mut row.sales_channel,
            _ => return,
        };
        if slot.is_some() {
            return;
        }

        match self.settings.missing_policy {
            MissingPolicy::Fill => {
                let default = match field {
                    Field::BookingStatus => self.settings.default_booking_status.clone(),
                    Field::Configuration => normalize_configuration(&self.settings.unknown_label),
                    _ => title_case(&self.settings.unknown_label),
                };
                debug!("Line {}: filled {} with {:?}", row.line, name, default);
                *slot = Some(default);
                record(row, stats, name, false);
            }
            MissingPolicy::Flag => record(row, stats, name, true),
        }
    }
}

/// Normalize valid rows with the given settings.
pub fn clean(rows: Vec<PropertySale>, settings: &CleaningSettings) -> CleaningOutcome {
    SaleCleaner::new(settings.clone()).clean(rows)
}

fn record(row: &mut PropertySale, stats: &mut CleaningStats, name: &str, flagged: bool) {
    if flagged {
        row.imputed_fields.push(format!("{}:missing", name));
        *stats.flagged.entry(name.to_string()).or_insert(0) += 1;
    } else {
        row.imputed_fields.push(name.to_string());
        *stats.filled.entry(name.to_string()).or_insert(0) += 1;
    }
}

fn normalize_row(row: &mut PropertySale) {
    row.property_id = collapse_whitespace(&row.property_id);

    for slot in [
        &mut row.micro_market,
        &mut row.developer_name,
        &mut row.booking_status,
        &mut row.possession_status,
        &mut row.sales_channel,
    ] {
        map_text(slot, title_case);
    }

    map_text(&mut row.configuration, normalize_configuration);
    map_text(&mut row.purchase_quarter, collapse_whitespace);
    map_text(&mut row.transaction_date, collapse_whitespace);

    row.additional_data = std::mem::take(&mut row.additional_data)
        .into_iter()
        .map(|(k, v)| (k, collapse_whitespace(&v)))
        .collect();
}

fn map_text(slot: &mut Option<String>, f: impl Fn(&str) -> String) {
    *slot = slot.take().map(|s| f(&s)).filter(|s| !s.is_empty());
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case: a letter is upper-cased when it does not follow another
/// letter or digit, every other letter is lower-cased.
///
/// ```
/// use luxury_housing_etl::preprocessing::cleaner::title_case;
///
/// assert_eq!(title_case("  sarjapur   ROAD "), "Sarjapur Road");
/// assert_eq!(title_case("not booked"), "Not Booked");
/// ```
pub fn title_case(s: &str) -> String {
    let collapsed = collapse_whitespace(s);
    let mut out = String::with_capacity(collapsed.len());
    let mut prev_alnum = false;

    for c in collapsed.chars() {
        if c.is_alphabetic() && !prev_alnum {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        prev_alnum = c.is_alphanumeric();
    }

    out
}

/// Upper-case a configuration and join the bedroom count to `BHK`.
///
/// ```
/// use luxury_housing_etl::preprocessing::cleaner::normalize_configuration;
///
/// assert_eq!(normalize_configuration("3 bhk"), "3BHK");
/// assert_eq!(normalize_configuration("2 BHK + Study"), "2BHK+STUDY");
/// ```
pub fn normalize_configuration(s: &str) -> String {
    let upper = collapse_whitespace(s).to_uppercase();
    let joined = BHK.replace_all(&upper, "${1}BHK");
    PLUS.replace_all(&joined, "+").into_owned()
}

fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
