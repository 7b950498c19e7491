use log::{debug, trace, warn};
use serde::Serialize;

use crate::geometry;
use crate::graph::{EdgeId, EdgeRole, Graph, NodeId, NodeRole};
use crate::runway;
use crate::snapping::Snapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeStatus {
    #[default]
    NotEstimated,
    Ok,
    /// The edge was entered and left through the same neighbour
    UTurn,
    /// Interpolation put the exit before the entry
    Negative,
}

/// Estimated traversal of one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeTime {
    pub seconds: Option<f64>,
    pub in_ms: Option<i64>,
    pub out_ms: Option<i64>,
    pub status: TimeStatus,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub snapping: Snapping,
    /// Travelled from→to
    pub forward: bool,
    pub time: EdgeTime,
    /// Runway direction flown on this step, for runway edges
    pub runway: Option<String>,
}

impl Step {
    fn new(snapping: Snapping, forward: bool) -> Self {
        Self {
            snapping,
            forward,
            time: EdgeTime::default(),
            runway: None,
        }
    }

    pub fn edge(&self) -> EdgeId {
        self.snapping.edge
    }
}

#[derive(Debug, Clone, Default)]
pub struct Route {
    pub steps: Vec<Step>,
    pub first_runway: Option<String>,
    pub last_runway: Option<String>,
    /// Runway direction used by this single movement, once split
    pub runway_used: Option<String>,
}

impl Route {
    /// Orders snapped edges into traversal steps, inserting a reversed step wherever the
    /// aircraft doubles back along the previous edge.
    pub fn from_snappings(graph: &Graph, snappings: Vec<Snapping>) -> Route {
        let mut snappings = snappings.into_iter();
        let Some(first) = snappings.next() else {
            return Route::default();
        };
        let rest: Vec<Snapping> = snappings.collect();

        let first_edge = &graph[first.edge];
        let start = match rest.first() {
            Some(second) if !graph[second.edge].has_node(first_edge.from) => first_edge.from,
            Some(_) => first_edge.to,
            None => first_edge.from,
        };
        let forward = first_edge.from == start;
        let mut node = if forward { first_edge.to } else { first_edge.from };
        let mut steps = vec![Step::new(first, forward)];

        for snapping in rest {
            let Some(previous) = steps.last() else {
                break;
            };
            let previous_edge = &graph[previous.edge()];
            let edge = &graph[snapping.edge];

            if edge.is_adjacent_to(previous_edge) && !edge.has_node(node) {
                trace!("Doubling back along {} to reach {}", previous_edge.id, edge.id);
                let reversed = Step::new(previous.snapping.clone(), !previous.forward);
                steps.push(reversed);
                let forward = previous_edge.has_node(edge.from);
                node = if forward { edge.to } else { edge.from };
                steps.push(Step::new(snapping, forward));
            } else if edge.from == node {
                node = edge.to;
                steps.push(Step::new(snapping, true));
            } else if edge.to == node {
                node = edge.from;
                steps.push(Step::new(snapping, false));
            } else {
                warn!("Route is disconnected between {} and {}", previous_edge.id, edge.id);
                let here = graph[node].position;
                let forward =
                    geometry::distance(here, graph[edge.from].position) <= geometry::distance(here, graph[edge.to].position);
                node = if forward { edge.to } else { edge.from };
                steps.push(Step::new(snapping, forward));
            }
        }

        Route {
            steps,
            ..Route::default()
        }
    }

    pub fn edges(&self) -> Vec<EdgeId> {
        self.steps.iter().map(Step::edge).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Walks from `start` accumulating edge length, looking for a stand connection or a
    /// runway-touching edge before `threshold_m` is used up.
    fn near_stand_or_runway(&self, graph: &Graph, start: usize, forwards: bool, threshold_m: f64) -> bool {
        let mut travelled = 0.0;
        let mut position = Some(start);
        while let Some(i) = position.filter(|&i| i < self.steps.len()) {
            if travelled >= threshold_m {
                break;
            }
            let edge = self.steps[i].edge();
            travelled += graph[edge].length;
            if graph.role(edge) == EdgeRole::StandConnection || graph.touches_runway(edge) {
                return true;
            }
            position = if forwards { Some(i + 1) } else { i.checked_sub(1) };
        }
        false
    }

    /// Removes out-and-back excursions that do not lead towards a stand or runway.
    pub fn trim_branches(&mut self, graph: &Graph, threshold_m: f64) {
        let n = self.steps.len();
        if n < 2 {
            return;
        }

        let mut removed = vec![false; n];
        let mut previous = 0;
        let mut index = 0;
        while index + 1 < n {
            index += 1;
            if self.steps[previous].edge() != self.steps[index].edge() {
                previous = index;
                continue;
            }

            let mut back = Some(previous);
            let mut forward = index;
            let mut unwound = Vec::new();
            let keep = loop {
                match back {
                    Some(b) if forward < n => {
                        let edge = self.steps[b].edge();
                        if edge != self.steps[forward].edge() {
                            break self.near_stand_or_runway(graph, b, false, threshold_m)
                                || self.near_stand_or_runway(graph, forward, true, threshold_m);
                        }
                        if graph.role(edge) == EdgeRole::StandConnection || graph.touches_runway(edge) {
                            break true;
                        }
                        unwound.push(b);
                        unwound.push(forward);
                        forward += 1;
                        back = (0..b).rev().find(|&i| !removed[i]);
                    }
                    Some(b) => break self.near_stand_or_runway(graph, b, false, threshold_m),
                    None if forward < n => break self.near_stand_or_runway(graph, forward, true, threshold_m),
                    None => break false,
                }
            };

            if keep {
                previous = index;
            } else {
                debug!("Trimming branch of {} steps at step {}", unwound.len(), index);
                for i in unwound {
                    removed[i] = true;
                }
                index = forward;
                previous = forward;
            }
        }

        let mut flags = removed.into_iter();
        self.steps.retain(|_| !flags.next().unwrap_or(false));
    }

    /// Labels each runway step with the designator it was flown towards.
    pub fn assign_runway_directions(&mut self, graph: &Graph) {
        for step in &mut self.steps {
            let edge = &graph[step.edge()];
            if edge.role != EdgeRole::Runway {
                continue;
            }
            let Some(name) = edge.label.as_deref() else {
                continue;
            };
            let mut bearing = graph.edge_bearing(edge.id);
            if !step.forward {
                bearing = (bearing + 180.0) % 360.0;
            }
            step.runway = runway::direction_for_bearing(name, bearing);
        }

        let mut directions = self.steps.iter().filter_map(|s| s.runway.clone());
        self.first_runway = directions.next();
        self.last_runway = directions.last().or_else(|| self.first_runway.clone());
    }

    /// Estimates when each step was entered and left from the neighbouring samples.
    pub fn estimate_times(&mut self, graph: &Graph, intervals_explicit: bool) {
        for step in &mut self.steps {
            step.time = EdgeTime::default();
        }
        let n = self.steps.len();
        if !intervals_explicit || n <= 2 {
            return;
        }

        let fraction = |a: f64, total: f64| if total > 0.0 { a / total } else { 0.0 };

        let mut times = vec![EdgeTime::default(); n];
        for j in 1..n - 1 {
            let (prev, cur, next) = (&self.steps[j - 1], &self.steps[j], &self.steps[j + 1]);
            if prev.edge() == cur.edge() || cur.edge() == next.edge() {
                times[j].status = TimeStatus::UTurn;
                continue;
            }

            let prev_len = graph[prev.edge()].length;
            let cur_len = graph[cur.edge()].length;
            let next_len = graph[next.edge()].length;

            let prev_latest = prev.snapping.latest();
            let cur_earliest = cur.snapping.earliest();
            let cur_latest = cur.snapping.latest();
            let next_earliest = next.snapping.earliest();

            let remaining_on_prev =
                prev_len * if prev.forward { 1.0 - prev_latest.fraction } else { prev_latest.fraction };
            let entered_to_first =
                cur_len * if cur.forward { cur_earliest.fraction } else { 1.0 - cur_earliest.fraction };
            let last_to_exit = cur_len * if cur.forward { 1.0 - cur_latest.fraction } else { cur_latest.fraction };
            let into_next =
                next_len * if next.forward { next_earliest.fraction } else { 1.0 - next_earliest.fraction };

            let in_fraction = fraction(remaining_on_prev, remaining_on_prev + entered_to_first);
            let out_fraction = fraction(last_to_exit, last_to_exit + into_next);

            // Whole milliseconds, truncated
            let in_ms = prev_latest.time_ms + (in_fraction * (cur_earliest.time_ms - prev_latest.time_ms) as f64) as i64;
            let out_ms = cur_latest.time_ms + (out_fraction * (next_earliest.time_ms - cur_latest.time_ms) as f64) as i64;
            let seconds = (out_ms - in_ms) as f64 / 1000.0;

            times[j] = if seconds < 0.0 {
                EdgeTime {
                    seconds: None,
                    in_ms: Some(in_ms),
                    out_ms: Some(out_ms),
                    status: TimeStatus::Negative,
                }
            } else {
                EdgeTime {
                    seconds: Some(seconds),
                    in_ms: Some(in_ms),
                    out_ms: Some(out_ms),
                    status: TimeStatus::Ok,
                }
            };
        }
        times[n - 1].in_ms = times[n - 2].out_ms;

        for i in 0..n - 1 {
            if times[i].in_ms.is_none() && i > 0 && self.steps[i - 1].edge() != self.steps[i].edge() {
                times[i].in_ms = times[i - 1].out_ms;
            }
            if times[i].out_ms.is_none() && self.steps[i + 1].edge() != self.steps[i].edge() {
                times[i].out_ms = times[i + 1].in_ms;
            }
        }

        for (step, time) in self.steps.iter_mut().zip(times) {
            step.time = time;
        }
    }

    pub fn remove_runway_steps(&mut self, graph: &Graph) {
        self.steps.retain(|s| graph.role(s.edge()) != EdgeRole::Runway);
    }

    fn is_stand(graph: &Graph, step: &Step) -> bool {
        graph.role(step.edge()) == EdgeRole::StandConnection
    }

    /// Splits a route into single stand-to-runway or runway-to-stand movements.
    pub fn split(self, graph: &Graph) -> Vec<Route> {
        let mut stands = Vec::new();
        let mut runways: Vec<usize> = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            if Self::is_stand(graph, step) {
                stands.push(i);
            } else if graph.touches_runway(step.edge()) {
                runways.push(i);
            }
        }

        // Adjacent runway touches are a crossing, not a movement end
        let mut i = runways.len();
        while i >= 2 {
            let (a, b) = (runways[i - 2], runways[i - 1]);
            if graph.are_adjacent(self.steps[a].edge(), self.steps[b].edge()) {
                runways.drain(i - 2..i);
                i = i.saturating_sub(2);
            } else {
                i -= 1;
            }
        }

        let mut touches: Vec<usize> = stands.into_iter().chain(runways).collect();
        touches.sort_unstable();

        let touches_runway = |step: &Step| graph.touches_runway(step.edge());
        let mut routes = Vec::new();
        for pair in touches.chunks_exact(2) {
            let sub: Vec<Step> = self.steps[pair[0]..=pair[1]].to_vec();
            let (Some(first), Some(last)) = (sub.first(), sub.last()) else {
                continue;
            };
            let valid = (Self::is_stand(graph, first) && touches_runway(last))
                || (Self::is_stand(graph, last) && touches_runway(first));
            if !valid {
                trace!("Dropping sub-route {}..={}", pair[0], pair[1]);
                continue;
            }
            routes.push(Route {
                steps: sub,
                first_runway: self.first_runway.clone(),
                last_runway: self.last_runway.clone(),
                runway_used: None,
            });
        }

        match routes.len() {
            0 => {}
            1 => {
                let route = &mut routes[0];
                if route.steps.first().is_some_and(|s| touches_runway(s)) {
                    route.runway_used = self.first_runway.clone();
                } else if route.steps.last().is_some_and(|s| touches_runway(s)) {
                    route.runway_used = self.last_runway.clone();
                }
            }
            n => {
                routes[0].runway_used = self.first_runway.clone();
                routes[n - 1].runway_used = self.last_runway.clone();
            }
        }
        routes
    }

    /// Name of the first stand the route visits.
    pub fn stand_name(&self, graph: &Graph) -> Option<String> {
        self.steps
            .iter()
            .find(|s| Self::is_stand(graph, s))
            .and_then(|s| graph.stand_name(s.edge()))
            .map(str::to_string)
    }

    /// Stand nodes visited, in order, without immediate repeats.
    pub fn visited_stands(&self, graph: &Graph) -> Vec<NodeId> {
        let mut stands: Vec<NodeId> = self
            .steps
            .iter()
            .filter(|s| Self::is_stand(graph, s))
            .filter_map(|s| graph.stand_node(s.edge()))
            .collect();
        stands.dedup();
        stands
    }

    /// Runway-crossing nodes through which the route joined or left a runway.
    pub fn runway_entrances(&self, graph: &Graph) -> Vec<NodeId> {
        let touches: Vec<usize> = (0..self.steps.len())
            .filter(|&i| graph.touches_runway_crossing(self.steps[i].edge()))
            .collect();

        let mut entrances = Vec::new();
        let mut i = 0;
        while i < touches.len() {
            let crossing = i + 1 < touches.len()
                && touches[i + 1] == touches[i] + 1
                && graph.are_adjacent(self.steps[touches[i]].edge(), self.steps[touches[i + 1]].edge());
            if crossing {
                i += 2;
                continue;
            }
            let e = &graph[self.steps[touches[i]].edge()];
            if let Some(node) = [e.from, e.to]
                .into_iter()
                .find(|&n| graph[n].role == NodeRole::RunwayCrossing)
            {
                entrances.push(node);
            }
            i += 1;
        }
        entrances
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::displace;
    use crate::graph::fixtures::{origin, strip};
    use crate::graph::GraphBuilder;

    pub fn snap(graph: &Graph, edge: EdgeId, time_ms: i64, fraction: f64) -> Snapping {
        let e = &graph[edge];
        let a = graph[e.from].position;
        let b = graph[e.to].position;
        let point = geo::Point::new(a.x() + (b.x() - a.x()) * fraction, a.y() + (b.y() - a.y()) * fraction);
        let fix = crate::track::TimeCoordinate {
            position: point,
            timestamp_ms: time_ms,
            interval_s: 1.0,
            altitude_m: 0.0,
        };
        Snapping::from_fix(graph, edge, &fix, point, 0.0)
    }

    /// Stand P, then T of `approach_m`, a dead-end spur X-Y off the end of T, and an exit U:
    /// s -P- a -T- b -X- c -Y- d, b -U- e
    fn spur_airport(approach_m: f64) -> (Graph, [EdgeId; 5]) {
        let mut g = GraphBuilder::new();
        let o = origin();
        let s = g.add_node(o, NodeRole::Stand, Some("B7".into()));
        let a = g.add_node(displace(o, 20.0, 0.0), NodeRole::Intersection, None);
        let b = g.add_node(displace(o, 20.0 + approach_m, 0.0), NodeRole::Intersection, None);
        let c = g.add_node(displace(o, 20.0 + approach_m, 40.0), NodeRole::Intermediate, None);
        let d = g.add_node(displace(o, 20.0 + approach_m, 80.0), NodeRole::Intermediate, None);
        let e = g.add_node(displace(o, 70.0 + approach_m, 0.0), NodeRole::Intersection, None);
        let p = g.add_edge(s, a, EdgeRole::StandConnection, None, None).unwrap();
        let t = g.add_edge(a, b, EdgeRole::Taxiway, None, None).unwrap();
        let x = g.add_edge(b, c, EdgeRole::Taxiway, None, None).unwrap();
        let y = g.add_edge(c, d, EdgeRole::Taxiway, None, None).unwrap();
        let u = g.add_edge(b, e, EdgeRole::Taxiway, None, None).unwrap();
        (g.build(), [p, t, x, y, u])
    }

    fn spur_route(graph: &Graph, edges: [EdgeId; 5]) -> Route {
        let [p, t, x, y, u] = edges;
        let snappings = [p, t, x, y, x, u]
            .iter()
            .enumerate()
            .map(|(i, &e)| snap(graph, e, 1000 * i as i64, 0.5))
            .collect();
        Route::from_snappings(graph, snappings)
    }

    #[test]
    fn test_double_back_inserts_reversed_step() {
        let (graph, edges) = spur_airport(25.0);
        let [p, t, x, y, u] = edges;
        let route = spur_route(&graph, edges);
        assert_eq!(route.edges(), vec![p, t, x, y, y, x, u]);
        let directions: Vec<bool> = route.steps.iter().map(|s| s.forward).collect();
        assert_eq!(directions, vec![true, true, true, true, false, false, true]);
    }

    #[test]
    fn test_reverse_direction_from_shared_node() {
        let s = strip();
        let [sc, t1, t2, _] = s.edges;
        let snappings = [t2, t1, sc].iter().map(|&e| snap(&s.graph, e, 0, 0.5)).collect();
        let route = Route::from_snappings(&s.graph, snappings);
        assert!(route.steps.iter().all(|s| !s.forward));
    }

    #[test]
    fn test_branch_near_stand_is_kept() {
        let (graph, edges) = spur_airport(25.0);
        let mut route = spur_route(&graph, edges);
        route.trim_branches(&graph, 30.0);
        assert_eq!(route.steps.len(), 7);
    }

    #[test]
    fn test_branch_far_from_stand_is_trimmed() {
        let (graph, edges) = spur_airport(40.0);
        let [p, t, _, _, u] = edges;
        let mut route = spur_route(&graph, edges);
        route.trim_branches(&graph, 30.0);
        assert_eq!(route.edges(), vec![p, t, u]);
    }

    #[test]
    fn test_branch_near_runway_ahead_is_kept() {
        // Same spur, but the exit leads straight onto a runway
        let mut g = GraphBuilder::new();
        let o = origin();
        let a = g.add_node(o, NodeRole::Intersection, None);
        let b = g.add_node(displace(o, 60.0, 0.0), NodeRole::Intersection, None);
        let c = g.add_node(displace(o, 60.0, 40.0), NodeRole::Intermediate, None);
        let r = g.add_node(displace(o, 80.0, 0.0), NodeRole::Runway, None);
        let r2 = g.add_node(displace(o, 500.0, 0.0), NodeRole::Runway, None);
        let t = g.add_edge(a, b, EdgeRole::Taxiway, None, None).unwrap();
        let x = g.add_edge(b, c, EdgeRole::Taxiway, None, None).unwrap();
        let u = g.add_edge(b, r, EdgeRole::Taxiway, None, None).unwrap();
        g.add_edge(r, r2, EdgeRole::Runway, Some("09/27".into()), None).unwrap();
        let graph = g.build();

        let snappings = [t, x, x, u].iter().map(|&e| snap(&graph, e, 0, 0.5)).collect();
        let mut route = Route::from_snappings(&graph, snappings);
        // from_snappings merges nothing, so the repeated x shows up as a spike
        assert_eq!(route.edges(), vec![t, x, x, u]);
        route.trim_branches(&graph, 30.0);
        assert_eq!(route.edges(), vec![t, x, x, u]);
    }

    #[test]
    fn test_runway_direction_follows_travel() {
        let s = strip();
        let [sc, t1, t2, r] = s.edges;
        let snappings = [sc, t1, t2, r].iter().map(|&e| snap(&s.graph, e, 0, 0.5)).collect();
        let mut route = Route::from_snappings(&s.graph, snappings);
        route.assign_runway_directions(&s.graph);
        assert_eq!(route.first_runway.as_deref(), Some("09"));
        assert_eq!(route.steps[3].runway.as_deref(), Some("09"));

        let backwards = [r, t2, t1, sc].iter().map(|&e| snap(&s.graph, e, 0, 0.5)).collect();
        let mut route = Route::from_snappings(&s.graph, backwards);
        route.assign_runway_directions(&s.graph);
        assert_eq!(route.last_runway.as_deref(), Some("27"));
    }

    #[test]
    fn test_time_estimates_at_edge_boundaries() {
        let s = strip();
        let [sc, t1, t2, r] = s.edges;
        // Sampled at each edge's midpoint, ten seconds apart
        let snappings = [sc, t1, t2, r]
            .iter()
            .enumerate()
            .map(|(i, &e)| snap(&s.graph, e, 10_000 * i as i64, 0.5))
            .collect();
        let mut route = Route::from_snappings(&s.graph, snappings);
        route.estimate_times(&s.graph, true);

        let t1_time = &route.steps[1].time;
        assert_eq!(t1_time.status, TimeStatus::Ok);
        assert_eq!(t1_time.in_ms, Some(5_000));
        assert_eq!(t1_time.out_ms, Some(15_000));
        assert_eq!(t1_time.seconds, Some(10.0));

        assert_eq!(route.steps[0].time.seconds, None);
        assert_eq!(route.steps[0].time.out_ms, Some(5_000));
        assert_eq!(route.steps[3].time.in_ms, Some(25_000));
        assert_eq!(route.steps[3].time.seconds, None);
    }

    #[test]
    fn test_interpolated_times_truncate_to_whole_ms() {
        let s = strip();
        let snappings = s
            .edges
            .iter()
            .enumerate()
            .map(|(i, &e)| snap(&s.graph, e, 999 * i as i64, 0.5))
            .collect();
        let mut route = Route::from_snappings(&s.graph, snappings);
        route.estimate_times(&s.graph, true);

        // Halfway between samples 999 ms apart lands on x.5 ms
        assert_eq!(route.steps[1].time.in_ms, Some(499));
        assert_eq!(route.steps[1].time.out_ms, Some(1498));
        assert_eq!(route.steps[1].time.seconds, Some(0.999));
    }

    #[test]
    fn test_times_absent_without_explicit_intervals() {
        let s = strip();
        let snappings = s.edges.iter().map(|&e| snap(&s.graph, e, 0, 0.5)).collect();
        let mut route = Route::from_snappings(&s.graph, snappings);
        route.estimate_times(&s.graph, false);
        assert!(route.steps.iter().all(|s| s.time == EdgeTime::default()));
    }

    #[test]
    fn test_u_turn_has_no_time() {
        let (graph, edges) = spur_airport(40.0);
        let mut route = spur_route(&graph, edges);
        route.estimate_times(&graph, true);
        assert_eq!(route.steps[3].time.status, TimeStatus::UTurn);
        assert_eq!(route.steps[4].time.status, TimeStatus::UTurn);
        assert_eq!(route.steps[2].time.status, TimeStatus::Ok);
    }

    /// Stand A, out to a runway, back off it and into stand B:
    /// A -sa- n1 -t1- rc1 =R= rc2 -t2- n2 -sb- B
    fn round_trip() -> (Graph, [EdgeId; 5]) {
        let mut g = GraphBuilder::new();
        let o = origin();
        let stand_a = g.add_node(o, NodeRole::Stand, Some("A".into()));
        let n1 = g.add_node(displace(o, 40.0, 0.0), NodeRole::Intersection, None);
        let rc1 = g.add_node(displace(o, 40.0, 200.0), NodeRole::Runway, None);
        let rc2 = g.add_node(displace(o, 1040.0, 200.0), NodeRole::Runway, None);
        let n2 = g.add_node(displace(o, 1040.0, 0.0), NodeRole::Intersection, None);
        let stand_b = g.add_node(displace(o, 1080.0, 0.0), NodeRole::Stand, Some("B".into()));
        let sa = g.add_edge(stand_a, n1, EdgeRole::StandConnection, None, None).unwrap();
        let t1 = g.add_edge(n1, rc1, EdgeRole::Taxiway, None, None).unwrap();
        let rw = g.add_edge(rc1, rc2, EdgeRole::Runway, Some("09/27".into()), None).unwrap();
        let t2 = g.add_edge(rc2, n2, EdgeRole::Taxiway, None, None).unwrap();
        let sb = g.add_edge(n2, stand_b, EdgeRole::StandConnection, None, None).unwrap();
        (g.build(), [sa, t1, rw, t2, sb])
    }

    #[test]
    fn test_split_stand_runway_stand() {
        let (graph, edges) = round_trip();
        let [sa, t1, _, t2, sb] = edges;
        let snappings = edges.iter().map(|&e| snap(&graph, e, 0, 0.5)).collect();
        let mut route = Route::from_snappings(&graph, snappings);
        route.assign_runway_directions(&graph);
        route.remove_runway_steps(&graph);

        let routes = route.split(&graph);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].edges(), vec![sa, t1]);
        assert_eq!(routes[1].edges(), vec![t2, sb]);
        assert_eq!(routes[0].runway_used.as_deref(), Some("09"));
        assert_eq!(routes[1].runway_used.as_deref(), Some("09"));
        assert_eq!(routes[0].stand_name(&graph).as_deref(), Some("A"));
        assert_eq!(routes[1].stand_name(&graph).as_deref(), Some("B"));
    }

    #[test]
    fn test_single_departure_uses_last_runway() {
        let s = strip();
        let snappings = s.edges.iter().map(|&e| snap(&s.graph, e, 0, 0.5)).collect();
        let mut route = Route::from_snappings(&s.graph, snappings);
        route.assign_runway_directions(&s.graph);
        route.remove_runway_steps(&s.graph);

        let routes = route.split(&s.graph);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].edges(), s.edges[..3].to_vec());
        assert_eq!(routes[0].runway_used.as_deref(), Some("09"));
        assert_eq!(routes[0].visited_stands(&s.graph), vec![s.nodes[0]]);
        assert_eq!(routes[0].runway_entrances(&s.graph), vec![s.nodes[3]]);
    }

    #[test]
    fn test_route_without_stand_splits_to_nothing() {
        let s = strip();
        let snappings = s.edges[1..3].iter().map(|&e| snap(&s.graph, e, 0, 0.5)).collect();
        let route = Route::from_snappings(&s.graph, snappings);
        assert!(route.split(&s.graph).is_empty());
    }
}
