//! catrack-algorithms: Track finding stages for wire and strip detectors.
//!
//! The stages run in order on one event:
//! - **Hit preparation** - geometry lookup and hit filtering
//! - **Clustering** - union-find over adjacent wires
//! - **Facets** - filtered hit triplets, the cells of the first automaton
//! - **Segments** - longest facet chains inside a super-layer
//! - **Tracks** - longest segment chains across super-layers, then merging
//! - **CKF** - beam-search Kalman extension into a further sub-system
//! - **Result filter** - greedy resolution of overlapping extensions
//!
//! [`TrackFinder`] wires them together and processes events in parallel.
//!
#![warn(missing_docs)]

pub mod adjacency;
pub mod automaton;
pub mod ckf;
mod clusterizer;
mod facet_creator;
mod hit_preparer;
mod processing;
mod result_filter;
mod segment_extractor;
pub mod spatial;
mod track_linker;
mod track_merger;

pub use adjacency::WireAdjacency;
pub use automaton::{CellularAutomaton, Extraction, WeightedNeighborhood, WeightedRelation};
pub use ckf::{select_beam, Budget, CandidateIndex, CkfExtrapolator, CkfSearch, CkfStats};
pub use clusterizer::{Clusterizer, Clusters};
pub use facet_creator::{FacetCreator, Facets};
pub use hit_preparer::{HitPreparer, PreparedHits};
pub use processing::{EventDiagnostics, EventResult, TrackFinder};
pub use result_filter::ResultFilter;
pub use segment_extractor::{SegmentExtractor, Segments};
pub use spatial::SpatialGrid;
pub use track_linker::{LinkedTracks, TrackLinker};
pub use track_merger::{MergedTracks, TrackMerger};
