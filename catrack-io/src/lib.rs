//! catrack-io: File input and output for catrack.
//!
//! Inputs (events, geometry tables, pipeline configuration and classifier
//! models) are JSON files read through memory maps via memmap2. Outputs are
//! reconstruction results as one JSON document and recorded training samples
//! as JSON lines.
//!

mod error;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use reader::{read_config, read_events, read_geometry, read_models, MappedFileReader};
pub use writer::{read_results, RecordWriter, ResultWriter, ResultsFile};
