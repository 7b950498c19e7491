use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use geo::Point;
use log::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::graph::{EdgeRole, Graph, GraphBuilder, NodeRole};
use crate::track::{MovementDirection, TimeCoordinate, Track};

pub(crate) mod airport_graph {
    use serde::Deserialize;

    use crate::graph::{EdgeRole, NodeRole};

    #[derive(Debug, Deserialize)]
    pub struct GraphFile {
        pub nodes: Vec<NodeEntry>,
        pub edges: Vec<EdgeEntry>,
    }

    #[derive(Debug, Deserialize)]
    pub struct NodeEntry {
        pub id: String,
        pub lat: f64,
        pub lon: f64,
        pub role: NodeRole,
        #[serde(default)]
        pub label: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct EdgeEntry {
        pub from: String,
        pub to: String,
        pub role: EdgeRole,
        #[serde(default)]
        pub label: Option<String>,
        /// Metres, measured from the endpoints when absent
        #[serde(default)]
        pub length: Option<f64>,
        #[serde(default)]
        pub time_samples: Vec<f64>,
    }
}

pub(crate) mod flight_traces {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct TraceFile {
        /// Whether each point carries its own interval; otherwise fixes are one second apart
        #[serde(default)]
        pub intervals_explicit: bool,
        /// Whether points are listed latest first
        #[serde(default)]
        pub reverse_chronological: bool,
        pub aircraft: Vec<AircraftEntry>,
    }

    #[derive(Debug, Deserialize)]
    pub struct AircraftEntry {
        pub id: String,
        #[serde(default)]
        pub origin: Option<String>,
        #[serde(default)]
        pub destination: Option<String>,
        /// Seconds since the Unix epoch, the reference the first interval counts from
        pub first_timestamp: i64,
        pub points: Vec<PointEntry>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct PointEntry {
        pub lat: f64,
        pub lon: f64,
        #[serde(default)]
        pub altitude: f64,
        /// Seconds since the preceding fix in time
        #[serde(default)]
        pub interval: f64,
    }
}

use airport_graph::GraphFile;
use flight_traces::{AircraftEntry, PointEntry, TraceFile};

/// Builds the surface graph from its JSON description.
pub fn parse_graph(file: GraphFile) -> Result<Graph> {
    if file.nodes.is_empty() {
        bail!("Graph has no nodes");
    }

    let mut builder = GraphBuilder::new();
    let mut ids = HashMap::with_capacity(file.nodes.len());
    for node in file.nodes {
        let id = builder.add_node(Point::new(node.lon, node.lat), node.role, node.label);
        if ids.insert(node.id.clone(), id).is_some() {
            bail!("Duplicate node id {}", node.id);
        }
    }

    for edge in file.edges {
        let from = *ids
            .get(&edge.from)
            .ok_or_else(|| anyhow!("Edge references unknown node {}", edge.from))?;
        let to = *ids
            .get(&edge.to)
            .ok_or_else(|| anyhow!("Edge references unknown node {}", edge.to))?;
        let id = builder.add_edge(from, to, edge.role, edge.label, edge.length)?;
        if !edge.time_samples.is_empty() {
            builder.set_time_samples(id, edge.time_samples);
        }
    }

    let graph = builder.build();
    let stands = graph.nodes().filter(|n| n.role == NodeRole::Stand).count();
    let runway_edges = graph.edges().filter(|e| e.role == EdgeRole::Runway).count();
    info!(
        "Built graph with {} nodes ({} stands) and {} edges ({} runway)",
        graph.node_count(),
        stands,
        graph.edge_count(),
        runway_edges
    );
    if stands == 0 {
        warn!("Graph has no stands, no trace can be matched");
    }
    Ok(graph)
}

fn cache_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".bin");
    PathBuf::from(name)
}

fn cache_is_fresh(input: &Path, cache: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(input), modified(cache)) {
        (Some(input), Some(cache)) => cache >= input,
        _ => false,
    }
}

fn read_cache(cache: &Path) -> Result<Graph> {
    let bytes = fs::read(cache).with_context(|| format!("Failed to read graph cache {}", cache.display()))?;
    let config = bincode::config::standard();
    let (graph, _): (Graph, _) = bincode::serde::decode_from_slice(&bytes, config)
        .map_err(|e| anyhow!("Invalid graph cache {}: {}", cache.display(), e))?;
    Ok(graph)
}

fn write_cache(graph: &Graph, cache: &Path) -> Result<()> {
    let file = File::create(cache)?;
    let mut writer = BufWriter::new(file);
    let config = bincode::config::standard();
    bincode::serde::encode_into_std_write(graph, &mut writer, config)?;
    Ok(())
}

/// Loads the graph, reusing the binary cache next to the input when it is newer.
pub fn load_graph(path: &Path, use_cache: bool) -> Result<Graph> {
    let cache = cache_path(path);
    if use_cache && cache_is_fresh(path, &cache) {
        match read_cache(&cache) {
            Ok(graph) => {
                info!("Loaded graph from cache {}", cache.display());
                return Ok(graph);
            }
            Err(e) => warn!("Ignoring graph cache: {}", e),
        }
    }

    let file = File::open(path).with_context(|| format!("Failed to open graph {}", path.display()))?;
    let parsed: GraphFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse graph {}", path.display()))?;
    let graph = parse_graph(parsed)?;

    if use_cache {
        match write_cache(&graph, &cache) {
            Ok(()) => debug!("Wrote graph cache {}", cache.display()),
            Err(e) => warn!("Could not write graph cache {}: {}", cache.display(), e),
        }
    }
    Ok(graph)
}

fn near_airport(point: &PointEntry, airport: Point<f64>, box_deg: f64) -> bool {
    (point.lat - airport.y()).abs() <= box_deg && (point.lon - airport.x()).abs() <= box_deg
}

/// Cuts one aircraft's points into ground movements at the airport.
///
/// A new movement starts after a gap longer than `split_gap_s` or whenever the aircraft
/// returns to the airport surface after leaving it.
fn split_movements(
    entry: &AircraftEntry,
    points: &[PointEntry],
    intervals_explicit: bool,
    airport: Point<f64>,
    config: &LoaderConfig,
) -> Vec<Vec<TimeCoordinate>> {
    let mut movements: Vec<Vec<TimeCoordinate>> = Vec::new();
    let mut away = true;
    let mut timestamp_ms = entry.first_timestamp * 1000;

    for point in points {
        let interval_s = if intervals_explicit { point.interval.abs() } else { 1.0 };
        timestamp_ms += (interval_s * 1000.0).round() as i64;

        if interval_s > config.split_gap_s {
            movements.push(Vec::new());
            away = false;
        }

        if point.altitude == 0.0 && near_airport(point, airport, config.airport_box_deg) {
            if away {
                movements.push(Vec::new());
                away = false;
            }
            if let Some(current) = movements.last_mut() {
                current.push(TimeCoordinate {
                    position: Point::new(point.lon, point.lat),
                    timestamp_ms,
                    interval_s,
                    altitude_m: point.altitude,
                });
            }
        } else {
            away = true;
        }
    }
    movements
}

fn infer_direction(points: &[PointEntry], airport: Point<f64>, box_deg: f64) -> MovementDirection {
    match (points.first(), points.last()) {
        (_, Some(last)) if near_airport(last, airport, box_deg) => MovementDirection::Inbound,
        (Some(first), _) if near_airport(first, airport, box_deg) => MovementDirection::Outbound,
        _ => MovementDirection::Stopoff,
    }
}

/// Turns raw aircraft records into chronological ground tracks at one airport.
pub fn parse_traces(file: TraceFile, airport: Point<f64>, config: &LoaderConfig) -> Vec<Track> {
    let mut tracks = Vec::new();
    let mut dropped = 0;

    for entry in &file.aircraft {
        let mut points = entry.points.clone();
        if file.reverse_chronological {
            points.reverse();
        }

        let direction = infer_direction(&points, airport, config.airport_box_deg);
        let movements = split_movements(entry, &points, file.intervals_explicit, airport, config);
        if movements.len() > 1 {
            debug!("{} has {} separate ground movements", entry.id, movements.len());
        }

        for (i, movement) in movements.into_iter().enumerate() {
            if movement.len() < config.min_points {
                dropped += 1;
                continue;
            }
            tracks.push(Track {
                id: format!("{}-{}", entry.id, i),
                origin: entry.origin.clone(),
                destination: entry.destination.clone(),
                direction,
                points: movement,
            });
        }
    }

    info!(
        "Loaded {} ground tracks from {} aircraft ({} too short)",
        tracks.len(),
        file.aircraft.len(),
        dropped
    );
    tracks
}

/// Reads the trace file; returns the tracks and whether intervals were explicit.
pub fn load_traces(path: &Path, airport: Point<f64>, config: &LoaderConfig) -> Result<(Vec<Track>, bool)> {
    let file = File::open(path).with_context(|| format!("Failed to open traces {}", path.display()))?;
    let parsed: TraceFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse traces {}", path.display()))?;
    let explicit = parsed.intervals_explicit;
    Ok((parse_traces(parsed, airport, config), explicit))
}
