//! Accept/reject weights produced by filters.

use serde::{Deserialize, Serialize};

/// Outcome of scoring a candidate or a relation.
///
/// Replaces the "NaN means not related" convention with an explicit sum
/// type. Conversion from and to raw scores keeps the same semantics:
/// any non-finite score is a rejection, and a rejection exports as NaN.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    /// Candidate is not accepted; never contributes to a chain.
    #[default]
    Rejected,
    /// Candidate is accepted with the given finite weight.
    Accepted(f64),
}

impl Weight {
    /// Converts a raw score, mapping NaN and infinities to `Rejected`.
    #[inline]
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score.is_finite() {
            Self::Accepted(score)
        } else {
            Self::Rejected
        }
    }

    /// Raw score, NaN for rejections.
    #[inline]
    #[must_use]
    pub fn to_score(self) -> f64 {
        match self {
            Self::Rejected => f64::NAN,
            Self::Accepted(w) => w,
        }
    }

    /// Returns true for accepted weights.
    #[inline]
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Returns the weight if accepted.
    #[inline]
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Rejected => None,
            Self::Accepted(w) => Some(w),
        }
    }
}

impl From<f64> for Weight {
    fn from(score: f64) -> Self {
        Self::from_score(score)
    }
}
