use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::displacement::Displacement;
use crate::graph::{Graph, NodeId};
use crate::route::{Route, TimeStatus};
use crate::runway::Runway;
use crate::track::{MovementDirection, Track};

fn format_ms(ms: Option<i64>) -> Option<String> {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Serialize)]
pub struct StepRecord {
    pub edge: usize,
    pub label: Option<String>,
    /// Travelled in the edge's from→to direction
    pub forward: bool,
    pub runway: Option<String>,
    pub seconds: Option<f64>,
    #[serde(rename = "in")]
    pub in_time: Option<String>,
    #[serde(rename = "out")]
    pub out_time: Option<String>,
    pub status: TimeStatus,
}

/// A runway entrance used by the movement.
#[derive(Debug, Serialize)]
pub struct EntranceRecord {
    pub node: usize,
    pub label: Option<String>,
    pub runway: Option<String>,
    pub direction: Option<String>,
    /// Metres from the threshold of `direction`
    pub distance_m: Option<f64>,
}

/// One matched ground movement, written as a JSON line.
#[derive(Debug, Serialize)]
pub struct RouteRecord {
    pub aircraft: String,
    pub sub_route: usize,
    pub direction: MovementDirection,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub stand: Option<String>,
    pub runway: Option<String>,
    pub steps: Vec<StepRecord>,
    pub visited_stands: Vec<String>,
    pub runway_entrances: Vec<EntranceRecord>,
    pub displacement: Option<Displacement>,
}

fn entrance_record(graph: &Graph, runways: &BTreeMap<String, Runway>, node: NodeId) -> EntranceRecord {
    let found = runways.values().find_map(|runway| {
        runway
            .entrances
            .iter()
            .zip(&runway.designators)
            .find_map(|(entrances, designator)| {
                entrances
                    .iter()
                    .find(|e| e.node == node)
                    .map(|e| (runway.name.clone(), designator.clone(), e.distance))
            })
    });
    let (runway, direction, distance_m) = match found {
        Some((runway, direction, distance)) => (Some(runway), Some(direction), Some(distance)),
        None => (None, None, None),
    };
    EntranceRecord {
        node: node.0,
        label: graph[node].label.clone(),
        runway,
        direction,
        distance_m,
    }
}

impl RouteRecord {
    pub fn new(
        graph: &Graph,
        runways: &BTreeMap<String, Runway>,
        track: &Track,
        sub_route: usize,
        route: &Route,
        displacement: Option<Displacement>,
    ) -> Self {
        let steps = route
            .steps
            .iter()
            .map(|step| StepRecord {
                edge: step.edge().0,
                label: graph[step.edge()].label.clone(),
                forward: step.forward,
                runway: step.runway.clone(),
                seconds: step.time.seconds,
                in_time: format_ms(step.time.in_ms),
                out_time: format_ms(step.time.out_ms),
                status: step.time.status,
            })
            .collect();

        let visited_stands = route
            .visited_stands(graph)
            .into_iter()
            .map(|n| graph[n].label.clone().unwrap_or_else(|| n.to_string()))
            .collect();

        let runway_entrances = route
            .runway_entrances(graph)
            .into_iter()
            .map(|n| entrance_record(graph, runways, n))
            .collect();

        Self {
            aircraft: track.id.clone(),
            sub_route,
            direction: track.direction,
            origin: track.origin.clone(),
            destination: track.destination.clone(),
            stand: route.stand_name(graph),
            runway: route.runway_used.clone(),
            steps,
            visited_stands,
            runway_entrances,
            displacement,
        }
    }
}

/// Per-edge traversal time, one tab-separated row per interior step.
#[derive(Debug, Serialize, PartialEq)]
pub struct EdgeTimeRow {
    pub aircraft: String,
    pub sub_route: usize,
    pub step: usize,
    pub edge: usize,
    pub label: String,
    pub length_m: f64,
    pub seconds: Option<f64>,
    pub cumulative_m: f64,
    pub cumulative_s: f64,
    /// The edge was never observed directly, its times come from neighbours
    pub estimated: bool,
    pub status: TimeStatus,
}

pub fn edge_time_rows(graph: &Graph, track: &Track, sub_route: usize, route: &Route) -> Vec<EdgeTimeRow> {
    let n = route.steps.len();
    if n <= 2 {
        return Vec::new();
    }

    let mut cumulative_m = 0.0;
    let mut cumulative_s = 0.0;
    let mut rows = Vec::with_capacity(n - 2);
    for (i, step) in route.steps.iter().enumerate().take(n - 1).skip(1) {
        let edge = &graph[step.edge()];
        cumulative_m += edge.length;
        cumulative_s += step.time.seconds.unwrap_or(0.0);
        rows.push(EdgeTimeRow {
            aircraft: track.id.clone(),
            sub_route,
            step: i,
            edge: edge.id.0,
            label: edge.label.clone().unwrap_or_default(),
            length_m: edge.length,
            seconds: step.time.seconds,
            cumulative_m,
            cumulative_s,
            estimated: step.snapping.synthetic,
            status: step.time.status,
        });
    }
    rows
}

/// Shared sinks for matched routes and edge times, safe to write from several workers.
pub struct ReportWriter<R: Write, T: Write> {
    routes: Mutex<R>,
    times: Option<Mutex<csv::Writer<T>>>,
}

impl<R: Write, T: Write> ReportWriter<R, T> {
    pub fn new(routes: R, times: Option<T>) -> Self {
        Self {
            routes: Mutex::new(routes),
            times: times.map(|w| Mutex::new(csv::WriterBuilder::new().delimiter(b'\t').from_writer(w))),
        }
    }

    pub fn write_route(&self, record: &RouteRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut routes = self.routes.lock().map_err(|_| anyhow!("Route writer lock poisoned"))?;
        writeln!(routes, "{}", line)?;
        Ok(())
    }

    pub fn write_times(&self, rows: &[EdgeTimeRow]) -> Result<()> {
        let Some(times) = &self.times else {
            return Ok(());
        };
        let mut times = times.lock().map_err(|_| anyhow!("Edge time writer lock poisoned"))?;
        for row in rows {
            times.serialize(row)?;
        }
        Ok(())
    }

    /// Flushes both sinks and hands them back.
    pub fn finish(self) -> Result<(R, Option<T>)> {
        let mut routes = self
            .routes
            .into_inner()
            .map_err(|_| anyhow!("Route writer lock poisoned"))?;
        routes.flush()?;
        let times = match self.times {
            Some(times) => {
                let writer = times
                    .into_inner()
                    .map_err(|_| anyhow!("Edge time writer lock poisoned"))?;
                Some(writer.into_inner().map_err(|e| anyhow!("Failed to flush edge times: {}", e))?)
            }
            None => None,
        };
        Ok((routes, times))
    }
}
