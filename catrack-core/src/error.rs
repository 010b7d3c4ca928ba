//! Error types for catrack-core.

use thiserror::Error;

/// Result type alias for catrack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration-time errors.
///
/// These are the only errors surfaced to the caller. Everything that goes
/// wrong while processing a single candidate is absorbed as a rejection.
#[derive(Error, Debug)]
pub enum Error {
    /// Out-of-range or inconsistent configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filter name not known to the factory.
    #[error("unknown filter '{name}' for stage '{stage}'")]
    UnknownFilter { stage: &'static str, name: String },

    /// Filter exists but cannot score this candidate kind.
    #[error("filter '{name}' cannot score {candidate} candidates (stage '{stage}')")]
    UnsupportedFilter {
        stage: &'static str,
        name: String,
        candidate: &'static str,
    },

    /// Malformed geometry table.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Classifier blob could not be decoded.
    #[error("invalid model '{name}': {reason}")]
    InvalidModel { name: String, reason: String },

    /// Classifier name not present in the model store.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// Classifier trained on a different feature set.
    #[error("model '{model}' expects features {expected:?}, candidate provides {actual:?}")]
    FeatureMismatch {
        model: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// JSON decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-candidate numerical failures.
///
/// Never propagated out of a stage; converted into a rejected candidate or
/// a dropped path and counted in the event diagnostics.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericError {
    /// Innovation or normal-equation matrix is not invertible.
    #[error("singular matrix in {0}")]
    SingularMatrix(&'static str),

    /// Too few distinct sample positions for the requested fit.
    #[error("degenerate fit: {points} points at {distinct} distinct positions for {parameters} parameters")]
    DegenerateFit {
        points: usize,
        distinct: usize,
        parameters: usize,
    },

    /// NaN or infinite value in a state vector or covariance.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}
