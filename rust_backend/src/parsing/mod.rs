//! Parsers for raw housing sales extracts.
//!
//! # Parsers
//!
//! - [`csv_parser`]: Read a CSV extract, resolve its headers to canonical
//!   fields and check the required columns
//! - [`values`]: Parse individual cells (prices, numbers, quarters, dates)
//!
//! # Example
//!
//! ```no_run
//! use luxury_housing_etl::core::Field;
//! use luxury_housing_etl::parsing::csv_parser::load_csv;
//! use std::path::Path;
//!
//! let table = load_csv(
//!     Path::new("Luxury_Housing_Bangalore.csv"),
//!     &[Field::PropertyId, Field::TicketPrice],
//! )
//! .expect("Failed to load extract");
//! println!("{} rows", table.rows_read());
//! ```

pub mod csv_parser;
pub mod values;


pub use csv_parser::{load_csv, load_csv_reader, MalformedRow, RawTable, SourceSchema};
