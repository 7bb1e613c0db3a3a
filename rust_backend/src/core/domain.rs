//! Domain models for luxury housing sale records.
//!
//! A record moves through three shapes during a run:
//!
//! 1. [`RawRecord`] - trimmed string cells keyed by canonical [`Field`], as read
//!    from the source extract.
//! 2. [`PropertySale`] - a validated record with typed key columns; the cleaner
//!    normalizes it in place.
//! 3. [`EnrichedSale`] - a cleaned record paired with its [`DerivedFeatures`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical columns of a property sale record.
///
/// Source extracts name these columns inconsistently; each field carries the
/// list of header spellings it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    PropertyId,
    MicroMarket,
    DeveloperName,
    TicketPrice,
    Configuration,
    AmenityScore,
    BookingStatus,
    PossessionStatus,
    SalesChannel,
    PurchaseQuarter,
    TransactionDate,
    Latitude,
    Longitude,
    CarpetArea,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::PropertyId,
        Field::MicroMarket,
        Field::DeveloperName,
        Field::TicketPrice,
        Field::Configuration,
        Field::AmenityScore,
        Field::BookingStatus,
        Field::PossessionStatus,
        Field::SalesChannel,
        Field::PurchaseQuarter,
        Field::TransactionDate,
        Field::Latitude,
        Field::Longitude,
        Field::CarpetArea,
    ];

    pub fn canonical_name(&self) -> &'static str {
        match self {
            Field::PropertyId => "Property_ID",
            Field::MicroMarket => "Micro_Market",
            Field::DeveloperName => "Developer_Name",
            Field::TicketPrice => "Ticket_Price_Cr",
            Field::Configuration => "Configuration",
            Field::AmenityScore => "Amenity_Score",
            Field::BookingStatus => "Booking_Status",
            Field::PossessionStatus => "Possession_Status",
            Field::SalesChannel => "Sales_Channel",
            Field::PurchaseQuarter => "Purchase_Quarter",
            Field::TransactionDate => "Transaction_Date",
            Field::Latitude => "Latitude",
            Field::Longitude => "Longitude",
            Field::CarpetArea => "Carpet_Area_Sqft",
        }
    }

    /// Header spellings accepted for this field, in priority order.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::PropertyId => &[
                "Property_ID",
                "Project_ID",
                "property_id",
                "project_id",
                "ID",
                "id",
            ],
            Field::MicroMarket => &[
                "Micro_Market",
                "micro_market",
                "Location",
                "location",
                "Area",
                "area",
                "Market",
            ],
            Field::DeveloperName => &[
                "Developer_Name",
                "developer_name",
                "Builder",
                "builder",
                "Developer",
                "developer",
                "builder_name",
            ],
            Field::TicketPrice => &[
                "Ticket_Price_Cr",
                "Price",
                "price",
                "ticket_price",
                "Price_Cr",
                "price_cr",
            ],
            Field::Configuration => &[
                "Configuration",
                "configuration",
                "config",
                "BHK",
                "bhk",
                "unit_type",
            ],
            Field::AmenityScore => &[
                "Amenity_Score",
                "Amenity",
                "amenity_score",
                "AmenityScore",
                "amenity",
            ],
            Field::BookingStatus => &[
                "Booking_Status",
                "booking_status",
                "Status",
                "status",
                "Booking",
                "booking",
            ],
            Field::PossessionStatus => &["Possession_Status", "possession_status", "Possession"],
            Field::SalesChannel => &["Sales_Channel", "sales_channel", "Channel", "channel"],
            Field::PurchaseQuarter => &[
                "Purchase_Quarter",
                "purchase_quarter",
                "Quarter",
                "quarter",
                "Time_Period",
                "period",
            ],
            Field::TransactionDate => &[
                "Transaction_Date",
                "transaction_date",
                "Date",
                "date",
                "Booking_Date",
            ],
            Field::Latitude => &["Latitude", "latitude", "Lat", "lat"],
            Field::Longitude => &["Longitude", "longitude", "Lon", "lon", "Lng", "lng"],
            Field::CarpetArea => &[
                "Carpet_Area_Sqft",
                "carpet_area_sqft",
                "Carpet_Area",
                "Area_Sqft",
            ],
        }
    }

    pub fn from_canonical_name(name: &str) -> Option<Field> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.canonical_name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// A source row before validation.
///
/// Only non-empty cells are stored, so a missing value and an empty cell are
/// the same thing from here on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    /// 1-based line number in the source file (the header is line 1)
    pub line: usize,
    pub values: BTreeMap<Field, String>,
    /// Non-empty cells of columns that map to no canonical field
    pub extra: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            ..Default::default()
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// Builder-style setter used by loaders and tests. Blank values are ignored.
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            self.values.insert(field, trimmed.to_string());
        }
    }
}

/// A validated property sale record.
///
/// Key columns are guaranteed present and typed; every other column is
/// optional until the cleaner applies its missing-value policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySale {
    pub line: usize,
    pub property_id: String,
    pub micro_market: Option<String>,
    pub developer_name: Option<String>,
    pub ticket_price_cr: f64,
    pub configuration: Option<String>,
    pub amenity_score: Option<f64>,
    pub booking_status: Option<String>,
    pub possession_status: Option<String>,
    pub sales_channel: Option<String>,
    pub purchase_quarter: Option<String>,
    pub transaction_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub carpet_area_sqft: Option<f64>,
    /// Fields the cleaner filled (`Field`) or left missing (`Field:missing`)
    pub imputed_fields: Vec<String>,
    pub additional_data: BTreeMap<String, String>,
}

impl PropertySale {
    pub fn new(line: usize, property_id: impl Into<String>, ticket_price_cr: f64) -> Self {
        Self {
            line,
            property_id: property_id.into(),
            micro_market: None,
            developer_name: None,
            ticket_price_cr,
            configuration: None,
            amenity_score: None,
            booking_status: None,
            possession_status: None,
            sales_channel: None,
            purchase_quarter: None,
            transaction_date: None,
            latitude: None,
            longitude: None,
            carpet_area_sqft: None,
            imputed_fields: Vec::new(),
            additional_data: BTreeMap::new(),
        }
    }
}

/// Ticket price buckets used by the dashboard slicers.
///
/// Bins are half-open: a 2.0 Cr property falls into `2-5Cr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceCategory {
    #[serde(rename = "0-2Cr")]
    UpTo2Cr,
    #[serde(rename = "2-5Cr")]
    From2To5Cr,
    #[serde(rename = "5-10Cr")]
    From5To10Cr,
    #[serde(rename = "10-20Cr")]
    From10To20Cr,
    #[serde(rename = "20Cr+")]
    Above20Cr,
}

impl PriceCategory {
    pub fn from_price(price_cr: f64) -> Self {
        if price_cr < 2.0 {
            PriceCategory::UpTo2Cr
        } else if price_cr < 5.0 {
            PriceCategory::From2To5Cr
        } else if price_cr < 10.0 {
            PriceCategory::From5To10Cr
        } else if price_cr < 20.0 {
            PriceCategory::From10To20Cr
        } else {
            PriceCategory::Above20Cr
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceCategory::UpTo2Cr => "0-2Cr",
            PriceCategory::From2To5Cr => "2-5Cr",
            PriceCategory::From5To10Cr => "5-10Cr",
            PriceCategory::From10To20Cr => "10-20Cr",
            PriceCategory::Above20Cr => "20Cr+",
        }
    }
}

impl fmt::Display for PriceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Monsoon,
}

impl Season {
    pub fn from_quarter(quarter: u8) -> Option<Self> {
        match quarter {
            1 => Some(Season::Winter),
            2 => Some(Season::Spring),
            3 => Some(Season::Summer),
            4 => Some(Season::Monsoon),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Monsoon => "Monsoon",
        }
    }
}

/// Sales period resolved from a quarter label or a transaction date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SalesPeriod {
    pub year: i32,
    /// `None` when the source only carried a year
    pub quarter: Option<u8>,
}

impl SalesPeriod {
    pub fn new(year: i32, quarter: Option<u8>) -> Self {
        Self { year, quarter }
    }

    /// `2023-Q1`, or just `2023` when the quarter is unknown.
    pub fn label(&self) -> String {
        match self.quarter {
            Some(q) => format!("{}-Q{}", self.year, q),
            None => self.year.to_string(),
        }
    }
}

/// Label used for rows whose period could not be resolved.
pub const UNKNOWN_PERIOD: &str = "Unknown";

/// Features computed by the enricher for one cleaned record.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub booking_flag: u8,
    pub carpet_area_sqft: f64,
    pub price_per_sqft: f64,
    pub period: Option<SalesPeriod>,
    pub price_category: PriceCategory,
    pub season: Option<Season>,
}

impl DerivedFeatures {
    pub fn is_booked(&self) -> bool {
        self.booking_flag == 1
    }

    pub fn period_label(&self) -> String {
        self.period
            .map(|p| p.label())
            .unwrap_or_else(|| UNKNOWN_PERIOD.to_string())
    }
}

/// A cleaned record with its derived features; the unit of export.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedSale {
    pub sale: PropertySale,
    pub features: DerivedFeatures,
}
