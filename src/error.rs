//! Fatal error taxonomy for the distribution pipeline
//!
//! Only conditions that invalidate the whole run live here. Data-quality
//! problems (unparsable rows, unattributable points, missing joins) are
//! filtered or zero-filled upstream and never reach this enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required column is absent from one of the input tables.
    #[error("required column '{column}' missing from {table}")]
    SchemaViolation { table: String, column: String },

    /// Every box biomass estimate is zero, so proportions are undefined.
    /// Refusing to emit a table of NaNs is deliberate.
    #[error("all box biomass estimates are zero; normalization is undefined")]
    DegenerateDenominator,

    /// The geometry file declares a projection family we cannot evaluate.
    #[error("unsupported projection '{0}' (supported: longlat, tmerc)")]
    UnsupportedProjection(String),

    /// The box-geometry file is truncated or internally inconsistent.
    #[error("malformed geometry file: {0}")]
    MalformedGeometry(String),
}
