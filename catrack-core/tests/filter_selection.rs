use approx::assert_relative_eq;
use catrack_core::{
    ChooseableFilter, Facet, Filter, FilterConfig, FilterFactory, ModelStore, PipelineConfig,
    Recorder, TrackPoint, Weight,
};

fn point(hit: usize, x: f64, y: f64, particle: Option<u32>) -> TrackPoint {
    TrackPoint {
        hit,
        layer: u16::try_from(hit).unwrap(),
        x,
        y,
        variance: 0.01,
        drift_length: 0.0,
        mc_particle: particle,
    }
}

fn facets() -> Vec<Facet> {
    vec![
        Facet::new(
            [
                point(0, 0.0, 0.0, Some(1)),
                point(1, 1.0, 0.0, Some(1)),
                point(2, 2.0, 0.0, Some(1)),
            ],
            0,
        ),
        Facet::new(
            [
                point(0, 0.0, 0.0, Some(1)),
                point(1, 1.0, 0.3, Some(2)),
                point(2, 2.0, 0.0, Some(1)),
            ],
            0,
        ),
        Facet::new(
            [
                point(0, 0.0, 0.0, None),
                point(1, 1.0, 0.05, None),
                point(2, 2.0, 0.1, None),
            ],
            0,
        ),
    ]
}

const FACET_MODEL: &str = r#"{
    "kind": "logistic",
    "feature_names": ["curvature", "opening_cosine", "line_chi2", "span"],
    "weights": [0.0, 4.0, -1.0, 0.0],
    "bias": -2.0
}"#;

#[test]
fn test_chooseable_matches_direct_variant() {
    let mut models = ModelStore::new();
    models.insert_json("facet_mva", FACET_MODEL).unwrap();
    let factory = FilterFactory::<Facet>::new("facets.filter", &models);

    let pairs: Vec<(FilterConfig, Filter<Facet>)> = vec![
        (FilterConfig::all(), Filter::all()),
        (FilterConfig::none(), Filter::none()),
        (FilterConfig::truth(), Filter::truth()),
        (FilterConfig::fit(2.0), Filter::fit(2.0)),
        (FilterConfig::not(FilterConfig::fit(2.0)), Filter::not(Filter::fit(2.0))),
        (
            FilterConfig::mva("facet_mva", 0.5),
            Filter::learned(models.get("facet_mva").unwrap(), 0.5),
        ),
    ];

    for (config, direct) in pairs {
        let chosen = ChooseableFilter::new(&factory, &config).unwrap();
        assert_eq!(chosen.name(), config.name);
        for facet in facets() {
            assert_eq!(
                chosen.score(&facet),
                direct.score(&facet),
                "filter '{}' differs",
                config.name
            );
        }
    }
}

#[test]
fn test_truth_and_not_are_complementary() {
    let models = ModelStore::new();
    let factory = FilterFactory::<Facet>::new("facets.filter", &models);
    let truth = ChooseableFilter::new(&factory, &FilterConfig::truth()).unwrap();
    let not_truth =
        ChooseableFilter::new(&factory, &FilterConfig::not(FilterConfig::truth())).unwrap();

    for facet in facets() {
        assert_ne!(
            truth.score(&facet).is_accepted(),
            not_truth.score(&facet).is_accepted()
        );
    }
}

#[test]
fn test_recording_through_factory() {
    let models = ModelStore::new();
    let recorder = Recorder::new();
    let factory = FilterFactory::<Facet>::new("facets.filter", &models)
        .with_recorder(Some(recorder.clone()));
    let config = FilterConfig::recording(FilterConfig::all()).with_return_weight(0.25);
    let filter = ChooseableFilter::new(&factory, &config).unwrap();

    let scores: Vec<Weight> = facets().iter().map(|facet| filter.score(facet)).collect();
    assert!(scores.iter().all(|&w| w == Weight::Accepted(0.25)));

    let records = recorder.drain();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].truth, Some(true));
    assert_eq!(records[1].truth, Some(false));
    assert_eq!(records[2].truth, None);
    assert_relative_eq!(records[0].weight.unwrap(), 1.0);
}

#[test]
fn test_pipeline_config_from_json() {
    let json = r#"{
        "facets": {"filter": {"name": "mva", "model": "facet_mva", "threshold": 0.7}},
        "ckf": {"beam_width": 3, "direction": "outward"},
        "result_filter": {"filter": {"name": "none"}}
    }"#;
    let config = PipelineConfig::from_json(json).unwrap();
    config.validate().unwrap();
    assert_eq!(config.ckf.beam_width, 3);
    assert_eq!(config.facets.filter.model.as_deref(), Some("facet_mva"));
    assert_eq!(config.result_filter.filter.name, "none");
    assert_eq!(config.segments, PipelineConfig::default().segments);

    let stages: Vec<&str> = config.filters().into_iter().map(|(stage, _)| stage).collect();
    assert_eq!(stages.len(), 11);
    assert!(stages.contains(&"tracks.merger.filter"));

    // resolving the model name happens only when a factory builds the filter
    let models = ModelStore::new();
    let factory = FilterFactory::<Facet>::new("facets.filter", &models);
    assert!(ChooseableFilter::new(&factory, &config.facets.filter).is_err());
}
