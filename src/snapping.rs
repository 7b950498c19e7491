use geo::Point;

use crate::geometry;
use crate::graph::{EdgeId, Graph};
use crate::track::TimeCoordinate;

/// When a point was seen on an edge, and how far along it.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordTime {
    pub time_ms: i64,
    /// Position along the edge from its `from` node, 0..=1
    pub fraction: f64,
    /// The raw fix, absent for interpolated samples
    pub original: Option<Point<f64>>,
}

/// An association of trace samples with one edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapping {
    pub edge: EdgeId,
    pub snapped: Point<f64>,
    /// Distance from the raw fix to the edge in metres
    pub distance: f64,
    first: CoordTime,
    rest: Vec<CoordTime>,
    pub synthetic: bool,
}

impl Snapping {
    /// Snaps a fix onto an edge at `snapped`, already known to be `distance` away.
    pub fn from_fix(graph: &Graph, edge: EdgeId, fix: &TimeCoordinate, snapped: Point<f64>, distance: f64) -> Self {
        let e = &graph[edge];
        let from = graph[e.from].position;
        let fraction = if e.length > 0.0 {
            (geometry::distance(from, snapped) / e.length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            edge,
            snapped,
            distance,
            first: CoordTime {
                time_ms: fix.timestamp_ms,
                fraction,
                original: Some(fix.position),
            },
            rest: Vec::new(),
            synthetic: false,
        }
    }

    /// An interpolated visit to the midpoint of an edge at `time_ms`.
    pub fn synthetic(graph: &Graph, edge: EdgeId, time_ms: i64) -> Self {
        let e = &graph[edge];
        let from = graph[e.from].position;
        let to = graph[e.to].position;
        Self {
            edge,
            snapped: Point::new((from.x() + to.x()) / 2.0, (from.y() + to.y()) / 2.0),
            distance: 0.0,
            first: CoordTime {
                time_ms,
                fraction: 0.5,
                original: None,
            },
            rest: Vec::new(),
            synthetic: true,
        }
    }

    pub fn times(&self) -> impl Iterator<Item = &CoordTime> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    pub fn merge_times(&mut self, other: Snapping) {
        self.rest.push(other.first);
        self.rest.extend(other.rest);
    }

    /// Earliest sample; the first seen wins ties.
    pub fn earliest(&self) -> &CoordTime {
        self.rest
            .iter()
            .fold(&self.first, |best, t| if t.time_ms < best.time_ms { t } else { best })
    }

    /// Latest sample; the first seen wins ties.
    pub fn latest(&self) -> &CoordTime {
        self.rest
            .iter()
            .fold(&self.first, |best, t| if t.time_ms > best.time_ms { t } else { best })
    }
}

/// Candidate snappings for each retained trace point, in trace order.
pub type CandidateSets = Vec<Vec<Snapping>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::displace;
    use crate::graph::fixtures::{origin, strip};

    fn fix_at(east: f64, timestamp_ms: i64) -> TimeCoordinate {
        TimeCoordinate {
            position: displace(origin(), east, 3.0),
            timestamp_ms,
            interval_s: 1.0,
            altitude_m: 0.0,
        }
    }

    #[test]
    fn test_fraction_along_edge() {
        let s = strip();
        let fix = fix_at(62.5, 0);
        let snapped = displace(origin(), 62.5, 0.0);
        let snapping = Snapping::from_fix(&s.graph, s.edges[1], &fix, snapped, 3.0);
        assert!((snapping.earliest().fraction - 0.25).abs() < 0.01);
        assert!(!snapping.synthetic);
    }

    #[test]
    fn test_earliest_and_latest_after_merge() {
        let s = strip();
        let edge = s.edges[1];
        let mut a = Snapping::from_fix(&s.graph, edge, &fix_at(60.0, 2000), displace(origin(), 60.0, 0.0), 3.0);
        let b = Snapping::from_fix(&s.graph, edge, &fix_at(70.0, 1000), displace(origin(), 70.0, 0.0), 3.0);
        let c = Snapping::from_fix(&s.graph, edge, &fix_at(80.0, 3000), displace(origin(), 80.0, 0.0), 3.0);
        a.merge_times(b);
        a.merge_times(c);

        assert_eq!(a.times().count(), 3);
        assert_eq!(a.earliest().time_ms, 1000);
        assert_eq!(a.latest().time_ms, 3000);
    }

    #[test]
    fn test_synthetic_midpoint() {
        let s = strip();
        let snapping = Snapping::synthetic(&s.graph, s.edges[2], 5000);
        assert!(snapping.synthetic);
        assert_eq!(snapping.distance, 0.0);
        assert_eq!(snapping.earliest().fraction, 0.5);
        assert!(snapping.earliest().original.is_none());
    }
}
