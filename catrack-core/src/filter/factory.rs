//! Name-keyed construction of filters from configuration.

use super::{Candidate, Filter, ModelStore, Recorder};
use crate::config::FilterConfig;
use crate::error::{Error, Result};
use std::marker::PhantomData;

/// Names understood by [`FilterFactory::create`].
pub const FILTER_NAMES: &[&str] = &[
    "all",
    "none",
    "truth",
    "fit",
    "mva",
    "not",
    "pass_through",
    "recording",
];

/// Resolves [`FilterConfig`]s into filters for candidates of type `C`.
pub struct FilterFactory<'a, C> {
    stage: &'static str,
    models: &'a ModelStore,
    recorder: Option<Recorder>,
    candidate: PhantomData<fn() -> C>,
}

impl<'a, C: Candidate> FilterFactory<'a, C> {
    /// Creates a factory for one stage.
    #[must_use]
    pub fn new(stage: &'static str, models: &'a ModelStore) -> Self {
        Self {
            stage,
            models,
            recorder: None,
            candidate: PhantomData,
        }
    }

    /// Sets the sink used by recording filters.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Option<Recorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Builds the filter named by `config`.
    ///
    /// # Errors
    /// - [`Error::UnknownFilter`] for names outside [`FILTER_NAMES`]
    /// - [`Error::UnsupportedFilter`] for `fit` on candidates without a fit hypothesis
    /// - [`Error::UnknownModel`] or [`Error::FeatureMismatch`] for `mva`
    /// - [`Error::Config`] for missing parameters
    pub fn create(&self, config: &FilterConfig) -> Result<Filter<C>> {
        match config.name.as_str() {
            "all" => Ok(Filter::all()),
            "none" => Ok(Filter::none()),
            "truth" => Ok(Filter::truth()),
            "pass_through" => Ok(Filter::pass_through()),
            "fit" => {
                if !C::SUPPORTS_FIT {
                    return Err(Error::UnsupportedFilter {
                        stage: self.stage,
                        name: config.name.clone(),
                        candidate: C::KIND,
                    });
                }
                if !(config.chi2_cut.is_finite() && config.chi2_cut > 0.0) {
                    return Err(Error::Config(format!(
                        "{}: chi2_cut must be positive, got {}",
                        self.stage, config.chi2_cut
                    )));
                }
                Ok(Filter::fit(config.chi2_cut))
            }
            "mva" => {
                let name = config.model.as_deref().ok_or_else(|| {
                    Error::Config(format!("{}: mva filter needs a model name", self.stage))
                })?;
                let model = self.models.get(name)?;
                let expected = model.feature_names();
                if !expected
                    .iter()
                    .map(String::as_str)
                    .eq(C::FEATURE_NAMES.iter().copied())
                {
                    return Err(Error::FeatureMismatch {
                        model: name.to_string(),
                        expected: expected.to_vec(),
                        actual: C::FEATURE_NAMES.iter().map(ToString::to_string).collect(),
                    });
                }
                Ok(Filter::learned(model, config.threshold))
            }
            "not" => Ok(Filter::not(self.create_inner(config)?)),
            "recording" => {
                let recorder = self.recorder.clone().ok_or_else(|| {
                    Error::Config(format!(
                        "{}: recording filter needs a recorder",
                        self.stage
                    ))
                })?;
                Ok(Filter::recording(
                    self.create_inner(config)?,
                    recorder,
                    config.return_weight,
                ))
            }
            _ => Err(Error::UnknownFilter {
                stage: self.stage,
                name: config.name.clone(),
            }),
        }
    }

    fn create_inner(&self, config: &FilterConfig) -> Result<Filter<C>> {
        let inner = config.inner.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "{}: filter '{}' needs an inner filter",
                self.stage, config.name
            ))
        })?;
        self.create(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ClassifierModel, HitPair};
    use crate::track::Facet;

    #[test]
    fn test_unknown_name() {
        let models = ModelStore::new();
        let factory = FilterFactory::<Facet>::new("facets", &models);
        let err = factory.create(&FilterConfig::named("bogus")).unwrap_err();
        assert!(matches!(err, Error::UnknownFilter { stage: "facets", .. }));
    }

    #[test]
    fn test_fit_needs_hypothesis() {
        let models = ModelStore::new();
        let factory = FilterFactory::<HitPair<'static>>::new("clusterizer", &models);
        assert!(matches!(
            factory.create(&FilterConfig::fit(3.0)),
            Err(Error::UnsupportedFilter {
                candidate: "hit_pair",
                ..
            })
        ));
        assert!(factory.create(&FilterConfig::all()).is_ok());
    }

    #[test]
    fn test_mva_resolution() {
        let mut models = ModelStore::new();
        models
            .insert(
                "wrong",
                ClassifierModel::Logistic {
                    feature_names: vec!["x".to_string()],
                    weights: vec![1.0],
                    bias: 0.0,
                },
            )
            .unwrap();
        let factory = FilterFactory::<Facet>::new("facets", &models);
        assert!(matches!(
            factory.create(&FilterConfig::mva("missing", 0.5)),
            Err(Error::UnknownModel(_))
        ));
        assert!(matches!(
            factory.create(&FilterConfig::mva("wrong", 0.5)),
            Err(Error::FeatureMismatch { .. })
        ));
        assert!(matches!(
            factory.create(&FilterConfig::named("mva")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_combinators_need_inner() {
        let models = ModelStore::new();
        let factory = FilterFactory::<Facet>::new("facets", &models);
        assert!(factory.create(&FilterConfig::named("not")).is_err());
        assert!(factory
            .create(&FilterConfig::recording(FilterConfig::all()))
            .is_err());

        let factory = factory.with_recorder(Some(Recorder::new()));
        assert!(factory
            .create(&FilterConfig::recording(FilterConfig::all()))
            .is_ok());
        assert!(factory
            .create(&FilterConfig::not(FilterConfig::fit(2.0)))
            .is_ok());
    }
}
