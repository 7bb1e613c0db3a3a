pub mod cleaner;
pub mod enricher;
pub mod pipeline;
pub mod validator;

pub use cleaner::{clean, CleaningOutcome, CleaningStats, SaleCleaner};
pub use enricher::{derive_features, FeatureEnricher};
pub use pipeline::{HousingPipeline, ProcessResult, RunFailure};
pub use validator::{
    validate, RejectReason, SaleValidator, ValidationError, ValidationOutcome, ValidationReport,
    ValidationStats,
};
