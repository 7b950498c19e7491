use log::{debug, trace, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;

use crate::geometry;
use crate::graph::{EdgeId, EdgeRole, Graph};
use crate::paths::{self, EndpointPairing};
use crate::route::Route;
use crate::snapping::{CandidateSets, Snapping};
use crate::spatial_index::EdgeGrid;
use crate::track::TimeCoordinate;

/// Why a trace could not be matched onto the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("trace has no points")]
    EmptyTrace,
    #[error("only {matched} of {total} points lie within snapping distance of the graph")]
    TooFewCandidates { matched: usize, total: usize },
    #[error("no stand candidate anywhere along the trace")]
    NoStand,
    #[error("no path connects edges {0} and {1}")]
    Disconnected(EdgeId, EdgeId),
    #[error("trace exhausted while trimming unanchored ends")]
    NoTermini,
    #[error("matched edges lack a stand or a runway touch")]
    MissingStandOrRunway,
    #[error("no steps survived trimming")]
    EmptyRoute,
    #[error("route holds no stand-to-runway movement")]
    NoMovement,
}

/// Share of trace points that must lie near the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchThreshold {
    Harsh,
    Relaxed,
}

/// Configuration for map matching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Maximum distance from a fix to a candidate edge (metres)
    pub snap_distance_m: f64,
    /// Fraction of points needing candidates under the harsh threshold
    pub harsh_fraction: f64,
    /// Fraction of points needing candidates under the relaxed threshold
    pub relaxed_fraction: f64,
    /// Number of alternative paths tried between resolved points
    pub k_paths: usize,
    /// Out-and-back excursions within this distance of a stand or runway survive (metres)
    pub branch_trim_m: f64,
    /// Seed for the random tie-break
    pub tie_break_seed: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            snap_distance_m: 10.0,
            harsh_fraction: 0.8,
            relaxed_fraction: 0.5,
            k_paths: 10,
            branch_trim_m: 30.0,
            tie_break_seed: 0,
        }
    }
}

impl MatcherConfig {
    pub fn fraction(&self, threshold: MatchThreshold) -> f64 {
        match threshold {
            MatchThreshold::Harsh => self.harsh_fraction,
            MatchThreshold::Relaxed => self.relaxed_fraction,
        }
    }
}

/// Picks one of several equally good candidates.
pub trait TieBreak {
    fn choose(&mut self, candidates: &[Snapping]) -> usize;
}

/// Always the first candidate, in edge order.
pub struct FirstCandidate;

impl TieBreak for FirstCandidate {
    fn choose(&mut self, _candidates: &[Snapping]) -> usize {
        0
    }
}

/// Uniformly random, reproducible for a given seed.
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl TieBreak for SeededRandom {
    fn choose(&mut self, candidates: &[Snapping]) -> usize {
        if candidates.is_empty() {
            return 0;
        }
        self.rng.random_range(0..candidates.len())
    }
}

/// Snaps each fix onto every nearby edge, dropping fixes with no edge in reach.
pub fn generate_candidates(
    graph: &Graph,
    index: &EdgeGrid,
    points: &[TimeCoordinate],
    snap_distance_m: f64,
) -> CandidateSets {
    let mut sets = Vec::with_capacity(points.len());
    for point in points {
        let mut set = Vec::new();
        for edge in index.edges_near(point.position) {
            let e = &graph[edge];
            let (snapped, distance) =
                geometry::nearest_on_segment(point.position, graph[e.from].position, graph[e.to].position);
            if distance < snap_distance_m {
                set.push(Snapping::from_fix(graph, edge, point, snapped, distance));
            }
        }
        if !set.is_empty() {
            sets.push(set);
        }
    }
    sets
}

fn nearest(candidates: &[Snapping], filter: impl Fn(&Snapping) -> bool) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, s)| filter(*s))
        .min_by_key(|(_, s)| OrderedFloat(s.distance))
        .map(|(i, _)| i)
}

fn resolve_end(graph: &Graph, set: &mut Vec<Snapping>) {
    let stand = nearest(set, |s| graph.role(s.edge) == EdgeRole::StandConnection);
    let runway = nearest(set, |s| {
        graph.role(s.edge) == EdgeRole::Runway || graph.touches_runway_crossing(s.edge)
    });
    if stand.is_none() && runway.is_none() {
        return;
    }
    let keep: Vec<usize> = [stand, runway].into_iter().flatten().collect();
    let mut i = 0;
    set.retain(|_| {
        let kept = keep.contains(&i);
        i += 1;
        kept
    });
}

/// At the trace ends only a stand connection or a runway approach is plausible.
pub fn resolve_endpoints(graph: &Graph, mut sets: CandidateSets) -> CandidateSets {
    let last = sets.len().saturating_sub(1);
    if let Some(first) = sets.first_mut() {
        resolve_end(graph, first);
    }
    if last > 0 {
        resolve_end(graph, &mut sets[last]);
    }
    sets
}

fn stand_key(graph: &Graph, edge: EdgeId) -> String {
    graph
        .stand_name(edge)
        .map(str::to_string)
        .unwrap_or_else(|| edge.to_string())
}

/// Chooses the one stand the aircraft used and removes every other stand's candidates.
pub fn disambiguate_stands(graph: &Graph, mut sets: CandidateSets) -> Result<CandidateSets, Rejection> {
    let is_stand = |s: &Snapping| graph.role(s.edge) == EdgeRole::StandConnection;
    let last = sets.len().saturating_sub(1);

    // Points whose only candidate is a stand connection
    let dedicated: Vec<(usize, &Snapping)> = sets
        .iter()
        .enumerate()
        .filter(|(_, set)| set.len() == 1 && is_stand(&set[0]))
        .map(|(i, set)| (i, &set[0]))
        .collect();

    let mut dedicated_stands: Vec<String> = dedicated.iter().map(|(_, s)| stand_key(graph, s.edge)).collect();
    dedicated_stands.sort();
    dedicated_stands.dedup();

    let winner = if dedicated_stands.len() == 1 {
        dedicated_stands.pop()
    } else if let Some((_, at_end)) = dedicated.iter().find(|(i, _)| *i == 0 || *i == last) {
        Some(stand_key(graph, at_end.edge))
    } else if let Some((_, closest)) = dedicated.iter().min_by_key(|(_, s)| OrderedFloat(s.distance)) {
        Some(stand_key(graph, closest.edge))
    } else {
        sets.iter()
            .flatten()
            .filter(|s| is_stand(*s))
            .min_by_key(|s| OrderedFloat(s.distance))
            .map(|s| stand_key(graph, s.edge))
    };

    let Some(winner) = winner else {
        return Err(Rejection::NoStand);
    };
    debug!("Stand {} chosen", winner);

    for set in &mut sets {
        set.retain(|s| !is_stand(s) || stand_key(graph, s.edge) == winner);
    }
    Ok(sets)
}

/// Collapses each candidate set onto the earliest edge it shares with what is left of `path`.
fn reduce_to_path(sets: &[Vec<Snapping>], path: &[EdgeId]) -> Vec<Vec<Snapping>> {
    let mut remaining = path;
    let mut reduced = Vec::with_capacity(sets.len());
    for set in sets {
        let hit = set
            .iter()
            .enumerate()
            .filter_map(|(ci, s)| remaining.iter().position(|&e| e == s.edge).map(|p| (p, ci)))
            .min();
        match hit {
            Some((position, candidate)) => {
                reduced.push(vec![set[candidate].clone()]);
                remaining = &remaining[position..];
            }
            None => reduced.push(set.clone()),
        }
    }
    reduced
}

fn find_left(sets: &CandidateSets, from: usize) -> Option<usize> {
    (from..sets.len().saturating_sub(1)).find(|&i| sets[i].len() == 1 && sets[i + 1].len() > 1)
}

fn find_right(sets: &CandidateSets, from: usize) -> Option<usize> {
    (from..sets.len()).find(|&i| sets[i].len() == 1 && (i + 1 == sets.len() || sets[i + 1].len() > 1))
}

/// Resolves runs of ambiguous points between two resolved ones using the shortest paths
/// joining them.
pub fn reduce_along_paths(graph: &Graph, mut sets: CandidateSets, k: usize) -> Result<CandidateSets, Rejection> {
    let mut left = find_left(&sets, 0);
    while let Some(l) = left {
        let Some(r) = find_right(&sets, l + 1) else {
            break;
        };
        let (left_edge, right_edge) = (sets[l][0].edge, sets[r][0].edge);

        if !graph.are_adjacent(left_edge, right_edge) {
            let Some(pairing) = paths::nearest_endpoint_pairing(graph, left_edge, right_edge) else {
                warn!("No path between {} and {}", left_edge, right_edge);
                return Err(Rejection::Disconnected(left_edge, right_edge));
            };
            let candidates = paths::k_shortest_paths(graph, pairing.path.start(), pairing.path.end(), k);

            let mut best: Option<(usize, Vec<Vec<Snapping>>)> = None;
            for path in &candidates {
                let reduced = reduce_to_path(&sets[l + 1..r], &path.edges);
                let resolved = reduced.iter().filter(|s| s.len() == 1).count();
                if best.as_ref().is_none_or(|(count, _)| resolved > *count) {
                    best = Some((resolved, reduced));
                }
            }
            if let Some((resolved, reduced)) = best {
                trace!("Resolved {} points between {} and {}", resolved, l, r);
                for (offset, set) in reduced.into_iter().enumerate() {
                    sets[l + 1 + offset] = set;
                }
            }
        }

        left = Some(r).filter(|&r| r + 1 < sets.len());
    }
    Ok(sets)
}

/// Settles every remaining ambiguity: nearest first, then taxiways, then the strategy.
pub fn break_ties(graph: &Graph, sets: CandidateSets, tie_break: &mut dyn TieBreak) -> Vec<Option<Snapping>> {
    sets.into_iter()
        .map(|mut set| {
            if set.len() <= 1 {
                return set.pop();
            }
            let closest = set.iter().map(|s| OrderedFloat(s.distance)).min()?;
            set.retain(|s| OrderedFloat(s.distance) <= closest);

            if set.len() > 1 && set.iter().any(|s| graph.role(s.edge) == EdgeRole::Taxiway) {
                set.retain(|s| graph.role(s.edge) == EdgeRole::Taxiway);
            }
            if set.len() > 1 {
                let i = tie_break.choose(&set).min(set.len() - 1);
                return Some(set.swap_remove(i));
            }
            set.pop()
        })
        .collect()
}

/// Drops unanchored ends and checks the remaining edges include a stand and a runway touch.
pub fn validate_ends(graph: &Graph, mut chosen: Vec<Option<Snapping>>) -> Result<Vec<Snapping>, Rejection> {
    let unanchored = |c: &Option<Snapping>| c.as_ref().is_none_or(|s| graph.role(s.edge) == EdgeRole::Taxiway);

    let mut start = 0;
    let mut end = chosen.len();
    if chosen.first().is_some_and(Option::is_none) {
        while start < end && unanchored(&chosen[start]) {
            start += 1;
        }
    }
    if end > start && chosen[end - 1].is_none() {
        while end > start && unanchored(&chosen[end - 1]) {
            end -= 1;
        }
    }
    if start >= end {
        return Err(Rejection::NoTermini);
    }

    let kept: Vec<Snapping> = chosen.drain(start..end).flatten().collect();
    let has_stand = kept.iter().any(|s| graph.role(s.edge) == EdgeRole::StandConnection);
    let has_runway = kept.iter().any(|s| graph.role(s.edge) == EdgeRole::Runway)
        || kept.first().is_some_and(|s| graph.touches_runway_crossing(s.edge))
        || kept.last().is_some_and(|s| graph.touches_runway_crossing(s.edge));
    if !(has_stand && has_runway) {
        return Err(Rejection::MissingStandOrRunway);
    }
    Ok(kept)
}

/// Synthetic visits to the edges of `pairing`, timed by sharing the gap in proportion to length.
fn splice(graph: &Graph, previous: &Snapping, current: &Snapping, pairing: &EndpointPairing) -> Vec<Snapping> {
    let previous_len = graph[previous.edge].length;
    let current_len = graph[current.edge].length;
    let latest = previous.latest();
    let earliest = current.earliest();

    let travelled_on_previous = previous_len * if pairing.leaves_via_to { latest.fraction } else { 1.0 - latest.fraction };
    let remaining_on_previous = previous_len - travelled_on_previous;
    let travelled_on_current =
        current_len * if pairing.enters_via_from { earliest.fraction } else { 1.0 - earliest.fraction };

    let middle: Vec<EdgeId> = pairing
        .path
        .edges
        .iter()
        .copied()
        .filter(|&e| e != previous.edge && e != current.edge)
        .collect();
    let total_length: f64 =
        remaining_on_previous + travelled_on_current + middle.iter().map(|&e| graph[e].length).sum::<f64>();
    let total_time = (earliest.time_ms - latest.time_ms) as f64;

    let start = latest.time_ms as f64;
    if total_length <= 0.0 {
        return middle
            .into_iter()
            .map(|e| Snapping::synthetic(graph, e, latest.time_ms))
            .collect();
    }

    let mut current_time = start + total_time * remaining_on_previous / total_length;
    middle
        .into_iter()
        .map(|e| {
            let share = total_time * graph[e].length / total_length;
            let at = current_time + 0.5 * share;
            current_time += share;
            Snapping::synthetic(graph, e, at.round() as i64)
        })
        .collect()
}

/// Merges repeated edges and fills gaps between non-adjacent edges with the shortest path.
pub fn interpolate(graph: &Graph, chosen: Vec<Snapping>) -> Result<Vec<Snapping>, Rejection> {
    let mut out: Vec<Snapping> = Vec::with_capacity(chosen.len());
    for current in chosen {
        let Some(previous) = out.last_mut() else {
            out.push(current);
            continue;
        };
        if previous.edge == current.edge {
            previous.merge_times(current);
            continue;
        }
        if graph.are_adjacent(previous.edge, current.edge) {
            out.push(current);
            continue;
        }

        let Some(pairing) = paths::nearest_endpoint_pairing(graph, previous.edge, current.edge) else {
            warn!("No path between {} and {}", previous.edge, current.edge);
            return Err(Rejection::Disconnected(previous.edge, current.edge));
        };
        let spliced = splice(graph, previous, &current, &pairing);
        trace!("Interpolated {} edges between {} and {}", spliced.len(), previous.edge, current.edge);
        out.extend(spliced);
        out.push(current);
    }
    Ok(out)
}

/// Cuts the route back to its outermost runway or stand-connection edges.
pub fn trim_route_ends(graph: &Graph, snappings: Vec<Snapping>) -> Vec<Snapping> {
    let anchored = |s: &Snapping| matches!(graph.role(s.edge), EdgeRole::Runway | EdgeRole::StandConnection);
    let Some(start) = snappings.iter().position(anchored) else {
        return Vec::new();
    };
    let end = snappings.iter().rposition(anchored).map_or(start, |e| e.max(start));
    snappings.into_iter().skip(start).take(end - start + 1).collect()
}

pub struct MapMatcher<'a> {
    graph: &'a Graph,
    index: &'a EdgeGrid,
    config: &'a MatcherConfig,
}

impl<'a> MapMatcher<'a> {
    pub fn new(graph: &'a Graph, index: &'a EdgeGrid, config: &'a MatcherConfig) -> Self {
        Self { graph, index, config }
    }

    /// Matches a cleaned trace onto the graph, returning the route with runway steps removed.
    pub fn match_track(
        &self,
        points: &[TimeCoordinate],
        threshold: MatchThreshold,
        tie_break: &mut dyn TieBreak,
        intervals_explicit: bool,
    ) -> Result<Route, Rejection> {
        if points.is_empty() {
            return Err(Rejection::EmptyTrace);
        }
        let graph = self.graph;

        let sets = generate_candidates(graph, self.index, points, self.config.snap_distance_m);
        let required = self.config.fraction(threshold) * points.len() as f64;
        if (sets.len() as f64) < required {
            return Err(Rejection::TooFewCandidates {
                matched: sets.len(),
                total: points.len(),
            });
        }

        let sets = resolve_endpoints(graph, sets);
        let sets = disambiguate_stands(graph, sets)?;
        let sets = reduce_along_paths(graph, sets, self.config.k_paths)?;
        let chosen = break_ties(graph, sets, tie_break);
        let chosen = validate_ends(graph, chosen)?;
        let snapped = interpolate(graph, chosen)?;
        let snapped = trim_route_ends(graph, snapped);
        if snapped.is_empty() {
            return Err(Rejection::EmptyRoute);
        }

        let mut route = Route::from_snappings(graph, snapped);
        route.trim_branches(graph, self.config.branch_trim_m);
        route.assign_runway_directions(graph);
        route.estimate_times(graph, intervals_explicit);
        route.remove_runway_steps(graph);
        if route.is_empty() {
            return Err(Rejection::EmptyRoute);
        }

        debug!(
            "Matched {} points onto {} steps (runways {:?} / {:?})",
            points.len(),
            route.steps.len(),
            route.first_runway,
            route.last_runway
        );
        Ok(route)
    }
}
