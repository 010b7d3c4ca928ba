//! catrack-core: Core types for cellular-automaton track finding.
//!
//! This crate provides the data model shared by all pipeline stages
//! (hits, geometry, automaton cells, facets, segments, tracks, CKF states),
//! least-squares and Kalman trajectory estimation, the filter framework and
//! the pipeline configuration.
//!

pub mod cell;
pub mod ckf;
pub mod config;
pub mod error;
pub mod filter;
pub mod fit;
pub mod geometry;
pub mod hit;
pub mod kalman;
pub mod ownership;
pub mod track;
pub mod weight;

pub use cell::{AutomatonCell, HasAutomatonCell};
pub use ckf::{CkfPath, CkfResult, CkfState, PathStatus, StateArena, Termination};
pub use config::{
    CkfConfig, ClusterizerConfig, Direction, FacetConfig, FilterConfig, HitPreparerConfig,
    MergePolicy, MergerConfig, PipelineConfig, ResultFilterConfig, SegmentConfig, TrackConfig,
};
pub use error::{Error, NumericError, Result};
pub use filter::{
    Candidate, ChooseableFilter, ClassifierModel, FacetPair, Filter, FilterFactory, FilterKind,
    HitPair, ModelStore, Record, Recorder, ResultPair, SegmentPair, StateCandidate, TrackPair,
};
pub use fit::TrajectoryFit;
pub use geometry::{LayerGeometry, LayerKind, PlanarLayout, Subdetector, WireGeometry, WireId};
pub use hit::{Event, Hit, RawHit, TrackPoint, WireHit};
pub use kalman::KalmanState;
pub use ownership::{HitOwnership, Owner};
pub use track::{Facet, Segment, Track};
pub use weight::Weight;
