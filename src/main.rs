use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use geo::{Centroid, Point};
use log::{info, warn};

use taxisnap::config::SnapConfig;
use taxisnap::harness::{self, SnapContext};
use taxisnap::matcher::MatchThreshold;
use taxisnap::report::ReportWriter;
use taxisnap::runway;
use taxisnap::spatial_index::EdgeGrid;

/// Snap aircraft ground traces onto an airport taxiway graph
#[derive(Debug, Parser)]
#[command(name = "taxisnap", version)]
struct Args {
    /// Airport graph (JSON)
    #[arg(long)]
    graph: PathBuf,

    /// Aircraft traces (JSON)
    #[arg(long)]
    traces: PathBuf,

    /// Matched movements, one JSON object per line
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Per-edge traversal times (tab separated)
    #[arg(long)]
    times: Option<PathBuf>,

    /// Tuning parameters (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads
    #[arg(long, short = 'j')]
    workers: Option<usize>,

    /// Accept a first attempt with the relaxed candidate threshold
    #[arg(long)]
    relaxed: bool,

    /// Drop nodes and edges outside the largest connected component
    #[arg(long)]
    prune: bool,

    /// Ignore and do not write the binary graph cache
    #[arg(long)]
    no_cache: bool,

    /// Seed for the random tie-break
    #[arg(long)]
    seed: Option<u64>,

    /// Hide the progress bar
    #[arg(long, short = 'q')]
    quiet: bool,

    /// More logging; repeat for more
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
    info!("Starting taxisnap");

    let mut config = match &args.config {
        Some(path) => SnapConfig::from_file(path)?,
        None => SnapConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }
    if let Some(seed) = args.seed {
        config.matcher.tie_break_seed = seed;
    }
    config.validate()?;

    let mut graph = taxisnap::io::load_graph(&args.graph, !args.no_cache)?;
    if args.prune {
        graph = graph.retain_largest_component()?;
    }
    let runways = runway::locate_runways(&graph);
    if runways.is_empty() {
        warn!("No runways found in graph");
    }
    let index = EdgeGrid::build(&graph, &config.index)?;

    let airport: Point<f64> = match config.airport {
        Some(airport) => airport.position(),
        None => {
            let Some(centre) = graph.bounding_rect().map(|r| r.centroid()) else {
                bail!("Cannot place the airport: graph has no extent");
            };
            info!("Using graph centre {:.5}, {:.5} as airport position", centre.y(), centre.x());
            centre
        }
    };

    let (tracks, intervals_explicit) = taxisnap::io::load_traces(&args.traces, airport, &config.loader)?;

    let routes = File::create(&args.output).with_context(|| format!("Failed to create {}", args.output.display()))?;
    let times = match &args.times {
        Some(path) => Some(File::create(path).with_context(|| format!("Failed to create {}", path.display()))?),
        None => None,
    };
    let report = ReportWriter::new(BufWriter::new(routes), times.map(BufWriter::new));

    let ctx = SnapContext {
        graph: &graph,
        index: &index,
        runways: &runways,
        config: &config,
        airport,
        intervals_explicit,
        threshold: if args.relaxed {
            MatchThreshold::Relaxed
        } else {
            MatchThreshold::Harsh
        },
    };
    let workers = harness::worker_count(config.workers, tracks.len());
    harness::run(&ctx, &tracks, config.matcher.tie_break_seed, workers, &report, !args.quiet)?;
    report.finish()?;

    info!("Wrote matched movements to {}", args.output.display());
    Ok(())
}
