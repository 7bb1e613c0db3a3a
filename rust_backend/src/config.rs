//! Pipeline configuration file support.
//!
//! This module reads pipeline settings from a TOML file. Every key is
//! optional; a missing section or key falls back to the defaults below.
//!
//! ```toml
//! [pipeline]
//! input = "data/raw/luxury_housing_raw.csv"
//! output = "data/processed/luxury_housing_cleaned.csv"
//! report = "data/processed/validation_report.json"
//! format = "csv"
//!
//! [validation]
//! amenity_policy = "clip"
//!
//! [cleaning]
//! missing_policy = "fill"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::domain::Field;
use crate::error::{EtlError, EtlResult};
use crate::io::exporter::ExportFormat;

/// Name of the configuration file searched by [`PipelineConfig::from_default_location`].
pub const CONFIG_FILE_NAME: &str = "housing_etl.toml";

/// What to do with an `Amenity_Score` outside its declared bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmenityPolicy {
    /// Clamp to the nearest bound and count the clip in the report
    #[default]
    Clip,
    /// Reject the row
    Reject,
}

/// What to do with missing non-key fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Fill with the declared default and record the field as imputed
    #[default]
    Fill,
    /// Leave the value missing and record it as `<field>:missing`
    Flag,
}

impl FromStr for AmenityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clip" => Ok(AmenityPolicy::Clip),
            "reject" => Ok(AmenityPolicy::Reject),
            other => Err(format!(
                "Invalid amenity policy: {}. Must be 'clip' or 'reject'",
                other
            )),
        }
    }
}

impl FromStr for MissingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fill" => Ok(MissingPolicy::Fill),
            "flag" => Ok(MissingPolicy::Flag),
            other => Err(format!(
                "Invalid missing-value policy: {}. Must be 'fill' or 'flag'",
                other
            )),
        }
    }
}

impl fmt::Display for AmenityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AmenityPolicy::Clip => "clip",
            AmenityPolicy::Reject => "reject",
        })
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingPolicy::Fill => "fill",
            MissingPolicy::Flag => "flag",
        })
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub cleaning: CleaningSettings,
    #[serde(default)]
    pub features: FeatureSettings,
}

/// Input and output locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// JSON run report; written on success and on failure
    #[serde(default)]
    pub report: Option<PathBuf>,
    /// Optional CSV of rejected rows
    #[serde(default)]
    pub rejected: Option<PathBuf>,
    #[serde(default)]
    pub format: ExportFormat,
}

/// Row validation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default = "default_required_columns")]
    pub required_columns: Vec<String>,
    #[serde(default = "default_amenity_min")]
    pub amenity_min: f64,
    #[serde(default = "default_amenity_max")]
    pub amenity_max: f64,
    #[serde(default)]
    pub amenity_policy: AmenityPolicy,
}

/// Normalization and default-fill rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSettings {
    #[serde(default)]
    pub missing_policy: MissingPolicy,
    #[serde(default = "default_unknown_label")]
    pub unknown_label: String,
    #[serde(default = "default_booking_status")]
    pub default_booking_status: String,
}

/// Feature derivation tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Lower-case statuses that count as a booking
    #[serde(default = "default_booked_statuses")]
    pub booked_statuses: Vec<String>,
    /// Estimated carpet area per normalized configuration
    #[serde(default = "default_carpet_areas")]
    pub carpet_area_by_configuration: BTreeMap<String, f64>,
    #[serde(default = "default_carpet_area")]
    pub default_carpet_area_sqft: f64,
}

fn default_required_columns() -> Vec<String> {
    vec![
        Field::PropertyId.canonical_name().to_string(),
        Field::TicketPrice.canonical_name().to_string(),
    ]
}

fn default_amenity_min() -> f64 {
    0.0
}

fn default_amenity_max() -> f64 {
    10.0
}

fn default_unknown_label() -> String {
    "Unknown".to_string()
}

fn default_booking_status() -> String {
    "Not Booked".to_string()
}

fn default_booked_statuses() -> Vec<String> {
    ["booked", "confirmed", "sold", "yes", "true", "1"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_carpet_areas() -> BTreeMap<String, f64> {
    [
        ("1BHK", 650.0),
        ("2BHK", 950.0),
        ("3BHK", 1250.0),
        ("4BHK", 1600.0),
        ("5BHK", 2100.0),
        ("STUDIO", 400.0),
        ("1RK", 350.0),
        ("2BHK+STUDY", 1100.0),
        ("3BHK+STUDY", 1400.0),
        ("4BHK+STUDY", 1800.0),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), *v))
    .collect()
}

fn default_carpet_area() -> f64 {
    1000.0
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            required_columns: default_required_columns(),
            amenity_min: default_amenity_min(),
            amenity_max: default_amenity_max(),
            amenity_policy: AmenityPolicy::default(),
        }
    }
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            missing_policy: MissingPolicy::default(),
            unknown_label: default_unknown_label(),
            default_booking_status: default_booking_status(),
        }
    }
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            booked_statuses: default_booked_statuses(),
            carpet_area_by_configuration: default_carpet_areas(),
            default_carpet_area_sqft: default_carpet_area(),
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(PipelineConfig)` if the file was read, parsed and is consistent
    /// * `Err(EtlError::Config)` otherwise
    pub fn from_file<P: AsRef<Path>>(path: P) -> EtlResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> EtlResult<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| EtlError::Config(format!("Failed to parse config file: {}", e)))?;

        config.check()?;
        Ok(config)
    }

    /// Load pipeline configuration from the default location.
    ///
    /// Searches for `housing_etl.toml` in:
    /// 1. Current directory
    /// 2. `rust_backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> EtlResult<Self> {
        match Self::find_default_location() {
            Some(path) => Self::from_file(path),
            None => Err(EtlError::Config(format!(
                "No {} found in standard locations",
                CONFIG_FILE_NAME
            ))),
        }
    }

    pub fn find_default_location() -> Option<PathBuf> {
        [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("rust_backend").join(CONFIG_FILE_NAME),
            PathBuf::from("..").join(CONFIG_FILE_NAME),
        ]
        .into_iter()
        .find(|path| path.exists())
    }

    /// Resolve `required_columns` to canonical fields.
    pub fn required_fields(&self) -> EtlResult<Vec<Field>> {
        self.validation
            .required_columns
            .iter()
            .map(|name| {
                Field::from_canonical_name(name).ok_or_else(|| {
                    EtlError::Config(format!("Unknown required column: {}", name))
                })
            })
            .collect()
    }

    /// Check cross-field consistency.
    pub fn check(&self) -> EtlResult<()> {
        self.required_fields()?;

        let v = &self.validation;
        if !v.amenity_min.is_finite() || !v.amenity_max.is_finite() || v.amenity_min > v.amenity_max
        {
            return Err(EtlError::Config(format!(
                "Invalid amenity bounds: [{}, {}]",
                v.amenity_min, v.amenity_max
            )));
        }

        let f = &self.features;
        if f.default_carpet_area_sqft <= 0.0 {
            return Err(EtlError::Config(
                "default_carpet_area_sqft must be > 0".to_string(),
            ));
        }
        if let Some((config, area)) = f
            .carpet_area_by_configuration
            .iter()
            .find(|(_, area)| **area <= 0.0)
        {
            return Err(EtlError::Config(format!(
                "Carpet area for {} must be > 0, got {}",
                config, area
            )));
        }

        Ok(())
    }
}
