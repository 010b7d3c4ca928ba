//! Scoring strategies applied at every granularity of the pipeline.
//!
//! A [`Filter`] maps a [`Candidate`] to a [`Weight`]. The variant set is
//! closed ([`FilterKind`]); stages resolve it by name through the
//! [`FilterFactory`] when the pipeline is built. Only the recording variant
//! has a side effect, every other variant is a pure function of the
//! candidate.

mod candidate;
mod candidates;
mod factory;
mod model;
mod recording;

pub use candidate::Candidate;
pub use candidates::{FacetPair, HitPair, ResultPair, SegmentPair, StateCandidate, TrackPair};
pub use factory::{FilterFactory, FILTER_NAMES};
pub use model::{ClassifierModel, DenseLayer, ModelStore};
pub use recording::{Record, Recorder};

use crate::config::FilterConfig;
use crate::error::Result;
use crate::weight::Weight;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Filter variants.
#[derive(Debug, Clone)]
pub enum FilterKind {
    /// Accepts with the candidate's intrinsic weight.
    All,
    /// Rejects everything.
    None,
    /// Accepts true candidates with their intrinsic weight.
    Truth,
    /// Accepts if the reduced chi2 of the fit hypothesis passes the cut.
    Fit {
        /// Reduced chi2 cut.
        chi2_cut: f64,
    },
    /// Accepts if the classifier probability reaches the threshold.
    Learned {
        /// Classifier.
        model: Arc<ClassifierModel>,
        /// Minimum probability.
        threshold: f64,
    },
    /// Accepts with the intrinsic weight if the inner filter rejects.
    Not(Box<FilterKind>),
    /// Re-exposes the weight stored on the candidate.
    PassThrough,
    /// Records every scored candidate.
    Recording {
        /// Filter providing the weight.
        inner: Box<FilterKind>,
        /// Sample sink.
        recorder: Recorder,
        /// Weight returned instead of the inner weight.
        return_weight: Option<f64>,
    },
}

impl FilterKind {
    fn score<C: Candidate>(&self, candidate: &C) -> Weight {
        match self {
            Self::All => Weight::from_score(candidate.intrinsic_weight()),
            Self::None => Weight::Rejected,
            Self::Truth => {
                if candidate.truth() == Some(true) {
                    Weight::from_score(candidate.intrinsic_weight())
                } else {
                    Weight::Rejected
                }
            }
            Self::Fit { chi2_cut } => match candidate.fit_chi2() {
                Ok(chi2) if chi2 <= *chi2_cut => {
                    Weight::from_score(candidate.intrinsic_weight() - chi2 / chi2_cut)
                }
                Ok(_) => Weight::Rejected,
                Err(err) => {
                    log::trace!("{} rejected: {err}", C::KIND);
                    Weight::Rejected
                }
            },
            Self::Learned { model, threshold } => {
                let p = model.predict(&candidate.features());
                if p.is_finite() && p >= *threshold {
                    Weight::Accepted(p)
                } else {
                    Weight::Rejected
                }
            }
            Self::Not(inner) => {
                if inner.score(candidate).is_accepted() {
                    Weight::Rejected
                } else {
                    Weight::from_score(candidate.intrinsic_weight())
                }
            }
            Self::PassThrough => candidate
                .stored_weight()
                .map_or(Weight::Rejected, Weight::from_score),
            Self::Recording {
                inner,
                recorder,
                return_weight,
            } => {
                let weight = inner.score(candidate);
                recorder.record(Record {
                    kind: C::KIND,
                    feature_names: C::FEATURE_NAMES,
                    features: candidate.features(),
                    truth: candidate.truth(),
                    weight: weight.value(),
                });
                return_weight.map_or(weight, Weight::from_score)
            }
        }
    }
}

/// Filter for candidates of type `C`.
pub struct Filter<C> {
    kind: FilterKind,
    candidate: PhantomData<fn() -> C>,
}

impl<C> Filter<C> {
    fn from_kind(kind: FilterKind) -> Self {
        Self {
            kind,
            candidate: PhantomData,
        }
    }

    /// Constant accept with the intrinsic weight.
    #[must_use]
    pub fn all() -> Self {
        Self::from_kind(FilterKind::All)
    }

    /// Constant reject.
    #[must_use]
    pub fn none() -> Self {
        Self::from_kind(FilterKind::None)
    }

    /// Accepts true candidates only.
    #[must_use]
    pub fn truth() -> Self {
        Self::from_kind(FilterKind::Truth)
    }

    /// Re-exposes the stored weight.
    #[must_use]
    pub fn pass_through() -> Self {
        Self::from_kind(FilterKind::PassThrough)
    }

    /// Inverts `inner`.
    #[must_use]
    pub fn not(inner: Self) -> Self {
        Self::from_kind(FilterKind::Not(Box::new(inner.kind)))
    }

    /// Records every candidate scored by `inner`.
    #[must_use]
    pub fn recording(inner: Self, recorder: Recorder, return_weight: Option<f64>) -> Self {
        Self::from_kind(FilterKind::Recording {
            inner: Box::new(inner.kind),
            recorder,
            return_weight,
        })
    }

    /// The variant.
    #[must_use]
    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// Returns true for the constant reject filter.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self.kind, FilterKind::None)
    }
}

impl<C: Candidate> Filter<C> {
    /// Chi2 cut on the fit hypothesis. Only available for candidates with
    /// a fit hypothesis; the factory checks this for configured filters.
    #[must_use]
    pub fn fit(chi2_cut: f64) -> Self {
        Self::from_kind(FilterKind::Fit { chi2_cut })
    }

    /// Classifier with a probability threshold.
    #[must_use]
    pub fn learned(model: Arc<ClassifierModel>, threshold: f64) -> Self {
        Self::from_kind(FilterKind::Learned { model, threshold })
    }

    /// Scores a candidate.
    #[must_use]
    pub fn score(&self, candidate: &C) -> Weight {
        self.kind.score(candidate)
    }
}

impl<C> Clone for Filter<C> {
    fn clone(&self) -> Self {
        Self::from_kind(self.kind.clone())
    }
}

impl<C> fmt::Debug for Filter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.kind).finish()
    }
}

/// Filter selected by name at configuration time.
pub struct ChooseableFilter<C> {
    name: String,
    filter: Filter<C>,
}

impl<C: Candidate> ChooseableFilter<C> {
    /// Resolves a configured filter through the factory.
    ///
    /// # Errors
    /// Returns a configuration error for unknown names, unsupported
    /// variants and unresolvable models.
    pub fn new(factory: &FilterFactory<'_, C>, config: &FilterConfig) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            filter: factory.create(config)?,
        })
    }

    /// Configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved variant.
    #[must_use]
    pub fn filter(&self) -> &Filter<C> {
        &self.filter
    }

    /// Scores a candidate exactly like the resolved variant.
    #[must_use]
    pub fn score(&self, candidate: &C) -> Weight {
        self.filter.score(candidate)
    }

    /// Returns true for the constant reject filter.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.filter.is_none()
    }
}

impl<C> Clone for ChooseableFilter<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<C> fmt::Debug for ChooseableFilter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChooseableFilter")
            .field("name", &self.name)
            .field("filter", &self.filter.kind)
            .finish()
    }
}
