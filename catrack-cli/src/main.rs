//! catrack command-line interface.
//!
//! Runs the track finding chain over event files and inspects geometries
//! and configurations.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use catrack_algorithms::{EventDiagnostics, TrackFinder};
use catrack_core::{ModelStore, PipelineConfig, PlanarLayout, Recorder, Subdetector, WireGeometry};
use catrack_io::{read_config, read_events, read_geometry, read_models, RecordWriter, ResultWriter};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] catrack_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] catrack_core::Error),
}

/// Cellular-automaton track finding for wire and strip detectors.
#[derive(Parser)]
#[command(name = "catrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct tracks in event files
    Reconstruct {
        /// Input event file(s), JSON array or one event per line
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Geometry table; a built-in planar detector is used when absent
        #[arg(short, long)]
        geometry: Option<PathBuf>,

        /// Pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of classifier models
        #[arg(short, long)]
        models: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Write samples of recording filters to this file (JSON lines)
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Show geometry statistics and validate a configuration
    Inspect {
        /// Geometry table; a built-in planar detector is used when absent
        #[arg(short, long)]
        geometry: Option<PathBuf>,

        /// Pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory of classifier models
        #[arg(short, long)]
        models: Option<PathBuf>,
    },
}

/// Inputs shared by both subcommands.
struct Setup {
    geometry: Arc<WireGeometry>,
    config: PipelineConfig,
    models: ModelStore,
}

fn load(
    geometry: Option<&Path>,
    config: Option<&Path>,
    models: Option<&Path>,
) -> Result<Setup> {
    let geometry = match geometry {
        Some(path) => read_geometry(path)?,
        None => {
            log::info!("no geometry given, using the built-in strip and drift layout");
            WireGeometry::planar(&[PlanarLayout::strip(4, 2.0, 2.0), PlanarLayout::default()])?
        }
    };
    let config = config.map(read_config).transpose()?.unwrap_or_default();
    let models = models.map(read_models).transpose()?.unwrap_or_default();
    Ok(Setup {
        geometry: Arc::new(geometry),
        config,
        models,
    })
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(cli.command) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Reconstruct {
            input,
            geometry,
            config,
            models,
            output,
            record,
        } => {
            let setup = load(geometry.as_deref(), config.as_deref(), models.as_deref())?;
            let recorder = record.as_ref().map(|_| Recorder::new());
            let finder =
                TrackFinder::new(setup.config, setup.geometry, &setup.models, recorder.clone())?;

            let start = Instant::now();
            let mut results = Vec::new();
            for path in &input {
                log::info!("Reading: {}", path.display());
                let events = read_events(path)?;
                results.extend(finder.process_events(&events));
            }
            let elapsed = start.elapsed();

            let summary = ResultWriter::create(&output)?.write_results(&results)?;
            print_summary(results.len(), &summary, elapsed.as_secs_f64());
            println!("Results written to: {}", output.display());

            if let (Some(path), Some(recorder)) = (record, recorder) {
                let mut writer = RecordWriter::create(&path)?;
                writer.write_records(&recorder.drain())?;
                writer.flush()?;
                println!("{} samples written to: {}", writer.written(), path.display());
            }
        }

        Commands::Inspect {
            geometry,
            config,
            models,
        } => {
            let setup = load(geometry.as_deref(), config.as_deref(), models.as_deref())?;
            let geometry = &setup.geometry;

            println!("Geometry");
            println!("  Layers: {}", geometry.layers().len());
            println!("  Wires:  {}", geometry.n_wires());
            for subdetector in [Subdetector::Drift, Subdetector::Strip] {
                let layers: Vec<_> = geometry.layers_of(subdetector).collect();
                if let (Some(first), Some(last)) = (layers.first(), layers.last()) {
                    println!(
                        "  {:?}: {} layers, x = {:.2} .. {:.2}",
                        subdetector,
                        layers.len(),
                        first.x,
                        last.x
                    );
                }
            }

            println!("Models: {}", setup.models.len());
            for name in setup.models.names() {
                println!("  {}", name);
            }

            println!("Filters");
            for (stage, filter) in setup.config.filters() {
                println!("  {:<26} {}", stage, filter.name);
            }

            let recorder = Some(Recorder::new());
            let finder = TrackFinder::new(
                setup.config,
                Arc::clone(&setup.geometry),
                &setup.models,
                recorder,
            )?;
            let adjacency = finder.adjacency();
            println!(
                "Adjacency: {} neighbour pairs over {} wires (radius {})",
                adjacency.n_pairs(),
                adjacency.n_wires(),
                adjacency.radius()
            );
            println!("Configuration is valid");
        }
    }
    Ok(())
}

fn print_summary(n_events: usize, summary: &EventDiagnostics, seconds: f64) {
    println!("Processed {} events in {:.3}s", n_events, seconds);
    if seconds > 0.0 {
        println!("  Rate:            {:.1} events/s", n_events as f64 / seconds);
    }
    println!(
        "  Hits:            {} ({} dropped, {} rejected, {} background)",
        summary.n_hits, summary.dropped_hits, summary.rejected_hits, summary.background_hits
    );
    println!(
        "  Facets:          {} ({} over cap)",
        summary.facets, summary.facet_overflow
    );
    println!("  Segments:        {}", summary.segments);
    println!(
        "  Tracks:          {} ({} merges, {} outlier hits removed)",
        summary.tracks, summary.merges, summary.removed_outliers
    );
    println!(
        "  CKF extensions:  {} of {} ({} expansions, {} pruned)",
        summary.results_after, summary.results_before, summary.ckf_expansions, summary.ckf_pruned
    );
    if summary.numeric_failures > 0 {
        println!("  Numeric failures: {}", summary.numeric_failures);
    }
    if summary.budget_exhausted {
        println!("  CKF budget exhausted in at least one event");
    }
}
