//! Aggregate analytics over pipeline output.
//!
//! - [`analysis`]: conversion and revenue measures for the BI dashboard

pub mod analysis;

pub use analysis::{compute_measures, DashboardMeasures, SegmentMeasures};
