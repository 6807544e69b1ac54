//! Error taxonomy for the engine.
//!
//! Everything here is a setup-time configuration error: the run must abort
//! immediately rather than limp along with silently-zeroed biology.

use thiserror::Error;

/// Fatal configuration errors raised while building or wiring the model.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A species was present in the roster but no allocator was registered
    /// for it by the time allocation ran.
    #[error("no allocator registered for species `{0}`")]
    MissingAllocator(String),

    /// Allocation weights summed to zero, a negative number or a non-finite
    /// number and cannot be normalized.
    #[error("allocation weights for species `{species}` sum to {sum} and cannot be normalized")]
    NonNormalizableWeights { species: String, sum: f64 },

    /// The Deriso-Schnute grower needs at least one historical biomass entry.
    #[error("empirical biomass series for species `{0}` is empty")]
    EmptyBiomassSeries(String),

    /// The requested recruitment lag reaches past the start of the series.
    #[error("recruitment lag {lag} exceeds the {len} entries of the biomass series")]
    LagBeyondSeries { lag: usize, len: usize },

    /// The shared grower stepped before its redistribution weights were set.
    #[error("redistribution weights must be set before the grower first steps")]
    RedistributionWeightsUnset,

    /// Redistribution weights must sum to one over the governed cells.
    #[error("redistribution weights sum to {0}, expected 1")]
    BadRedistributionWeights(f64),

    /// The altitude raster does not match the declared grid shape.
    #[error("altitude raster has {got} cells, expected {expected}")]
    TopologyShapeMismatch { got: usize, expected: usize },

    /// Catch-all for malformed configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
