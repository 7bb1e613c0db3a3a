//! Luxury housing ETL - ingestion, validation and feature engineering for
//! Bangalore luxury housing sales extracts.
//!
//! A run is a single synchronous batch:
//!
//! 1. [`parsing`] loads the raw CSV and maps source headers onto canonical columns
//! 2. [`preprocessing::validator`] splits rows into valid and rejected
//! 3. [`preprocessing::cleaner`] normalizes text and applies the missing-value policy
//! 4. [`preprocessing::enricher`] derives booking flag, price per sqft, period and bins
//! 5. [`io::exporter`] publishes the table, and [`io::report`] records what happened
//!
//! ```
//! use luxury_housing_etl::config::PipelineConfig;
//! use luxury_housing_etl::preprocessing::HousingPipeline;
//!
//! let pipeline = HousingPipeline::new(PipelineConfig::default()).unwrap();
//! let result = pipeline
//!     .process_str("Property_ID,Ticket_Price_Cr,Booking_Status\nP1,-5,Booked\nP2,4.5,Booked\n")
//!     .unwrap();
//!
//! assert_eq!(result.rows.len(), 1);
//! assert_eq!(result.rows[0].features.booking_flag, 1);
//! assert_eq!(result.report.rejections[0].reason.as_str(), "negative price");
//! ```

pub mod algorithms;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod parsing;
pub mod preprocessing;

pub use error::{EtlError, EtlResult};
