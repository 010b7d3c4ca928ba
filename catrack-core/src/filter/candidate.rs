//! Trait implemented by every object a filter can score.

use crate::error::NumericError;

/// Object scored by a [`Filter`](super::Filter).
///
/// Implementations must not panic on malformed input: degenerate geometry
/// is reported through [`fit_chi2`](Self::fit_chi2) errors or non-finite
/// features, which the filters turn into rejections.
pub trait Candidate {
    /// Name used in error messages and recorded samples.
    const KIND: &'static str;

    /// Names of the values returned by [`features`](Self::features).
    const FEATURE_NAMES: &'static [&'static str];

    /// Whether [`fit_chi2`](Self::fit_chi2) evaluates a trajectory hypothesis.
    const SUPPORTS_FIT: bool = false;

    /// Weight used when a filter accepts without a score of its own.
    fn intrinsic_weight(&self) -> f64;

    /// Weight assigned by an earlier pass, if any.
    fn stored_weight(&self) -> Option<f64> {
        None
    }

    /// Reduced chi2 of the candidate's trajectory hypothesis.
    ///
    /// # Errors
    /// Returns a [`NumericError`] if the hypothesis cannot be fitted.
    fn fit_chi2(&self) -> Result<f64, NumericError> {
        Err(NumericError::NonFinite("fit hypothesis"))
    }

    /// Feature vector in [`FEATURE_NAMES`](Self::FEATURE_NAMES) order.
    fn features(&self) -> Vec<f64>;

    /// Monte Carlo truth: `None` when no truth information is available.
    fn truth(&self) -> Option<bool> {
        None
    }
}
