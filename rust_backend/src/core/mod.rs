//! Core domain models for luxury housing sales.
//!
//! This module defines the record types that flow through the pipeline,
//! the canonical column set, and the derived-feature vocabulary.

pub mod domain;

pub use domain::{
    DerivedFeatures, EnrichedSale, Field, PriceCategory, PropertySale, RawRecord, SalesPeriod,
    Season, UNKNOWN_PERIOD,
};
