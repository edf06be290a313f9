// crates/snuffel-core/src/error.rs

use polars::error::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Polars operation failed: {0}")]
    Polars(#[from] PolarsError),

    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    #[error("column '{column}' has a null value at row {row}")]
    NullValue { column: String, row: usize },

    #[error("column '{column}' has an invalid value '{value}'")]
    InvalidValue { column: String, value: String },

    #[error("column '{column}' holds an unparseable timestamp '{value}'")]
    InvalidTimestamp { column: String, value: String },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("units were already corrected (marker column '{0}' present)")]
    AlreadyCorrected(String),

    #[error("identity column '{0}' already exists, refusing to overwrite")]
    IdentityExists(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
