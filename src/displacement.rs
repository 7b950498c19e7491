use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::matcher::{MapMatcher, MatchThreshold, TieBreak};
use crate::route::Route;
use crate::track::{self, TimeCoordinate};

/// Configuration for the displacement retry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplacementConfig {
    /// Distance between neighbouring offsets (metres)
    pub step_m: f64,
    /// Number of rings walked around the original position
    pub rings: usize,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            step_m: 10.0,
            rings: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub ring: usize,
    pub east_m: f64,
    pub north_m: f64,
}

/// Offsets on a square spiral: the origin, then each ring's top, right, bottom and left sides.
///
/// Yields `(2n + 1)^2` offsets for `n` rings.
pub struct SpiralOffsets {
    step_m: f64,
    rings: i64,
    ring: i64,
    side: u8,
    position: i64,
    started: bool,
}

impl SpiralOffsets {
    pub fn new(config: &DisplacementConfig) -> Self {
        Self {
            step_m: config.step_m,
            rings: config.rings as i64,
            ring: 1,
            side: 0,
            position: 0,
            started: false,
        }
    }
}

impl Iterator for SpiralOffsets {
    type Item = Offset;

    fn next(&mut self) -> Option<Offset> {
        if !self.started {
            self.started = true;
            return Some(Offset {
                ring: 0,
                east_m: 0.0,
                north_m: 0.0,
            });
        }

        loop {
            if self.ring > self.rings {
                return None;
            }
            if self.position > self.ring {
                self.side += 1;
                if self.side == 4 {
                    self.side = 0;
                    self.ring += 1;
                }
                self.position = 1 - self.ring;
                continue;
            }

            let (r, p) = (self.ring, self.position);
            let (x, y) = match self.side {
                0 => (p, r),
                1 => (r, -p),
                2 => (-p, -r),
                _ => (-r, p),
            };
            self.position += 1;
            return Some(Offset {
                ring: r as usize,
                east_m: x as f64 * self.step_m,
                north_m: y as f64 * self.step_m,
            });
        }
    }
}

/// The shift that let a trace match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Displacement {
    pub ring: usize,
    pub east_m: f64,
    pub north_m: f64,
    pub delta_lat: f64,
    pub delta_lon: f64,
}

/// Walks the spiral, skipping the unshifted trace, until a shifted copy matches under the
/// harsh threshold.
pub fn match_displaced(
    matcher: &MapMatcher<'_>,
    points: &[TimeCoordinate],
    config: &DisplacementConfig,
    tie_break: &mut dyn TieBreak,
    intervals_explicit: bool,
) -> Option<(Route, Displacement)> {
    let first = points.first()?;

    for offset in SpiralOffsets::new(config).skip(1) {
        let moved = track::displaced(points, offset.east_m, offset.north_m);
        match matcher.match_track(&moved, MatchThreshold::Harsh, tie_break, intervals_explicit) {
            Ok(route) => {
                let shifted = moved[0].position;
                let displacement = Displacement {
                    ring: offset.ring,
                    east_m: offset.east_m,
                    north_m: offset.north_m,
                    delta_lat: shifted.y() - first.position.y(),
                    delta_lon: shifted.x() - first.position.x(),
                };
                debug!(
                    "Matched after displacing by {:.0} m east, {:.0} m north",
                    offset.east_m, offset.north_m
                );
                return Some((route, displacement));
            }
            Err(rejection) => trace!("Offset {:?} rejected: {}", offset, rejection),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::displace;
    use crate::graph::fixtures::{origin, strip};
    use crate::matcher::{FirstCandidate, MatcherConfig};
    use crate::spatial_index::{EdgeGrid, IndexConfig};
    use std::collections::HashSet;

    #[test]
    fn test_spiral_size_and_uniqueness() {
        let config = DisplacementConfig { step_m: 1.0, rings: 4 };
        let offsets: Vec<Offset> = SpiralOffsets::new(&config).collect();
        assert_eq!(offsets.len(), 81);
        assert_eq!(offsets[0], Offset { ring: 0, east_m: 0.0, north_m: 0.0 });

        let distinct: HashSet<(i64, i64)> = offsets.iter().map(|o| (o.east_m as i64, o.north_m as i64)).collect();
        assert_eq!(distinct.len(), 81);
        for o in &offsets {
            assert_eq!(o.ring as i64, (o.east_m as i64).abs().max((o.north_m as i64).abs()));
        }
    }

    #[test]
    fn test_first_ring_order() {
        let config = DisplacementConfig { step_m: 10.0, rings: 1 };
        let ring: Vec<(f64, f64)> = SpiralOffsets::new(&config).skip(1).map(|o| (o.east_m, o.north_m)).collect();
        assert_eq!(
            ring,
            vec![
                (0.0, 10.0),
                (10.0, 10.0),
                (10.0, 0.0),
                (10.0, -10.0),
                (0.0, -10.0),
                (-10.0, -10.0),
                (-10.0, 0.0),
                (-10.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_offset_trace_matches_at_inverse_ring() {
        let s = strip();
        let grid = EdgeGrid::build(&s.graph, &IndexConfig::default()).unwrap();
        let matcher_config = MatcherConfig::default();
        let matcher = MapMatcher::new(&s.graph, &grid, &matcher_config);

        // A systematic 35 m northward bias puts every fix out of snapping range
        let points: Vec<TimeCoordinate> = (0..9)
            .map(|i| TimeCoordinate {
                position: displace(origin(), 25.0 * i as f64, 35.0),
                timestamp_ms: 1000 * i as i64,
                interval_s: 1.0,
                altitude_m: 0.0,
            })
            .collect();
        assert!(
            matcher
                .match_track(&points, MatchThreshold::Harsh, &mut FirstCandidate, true)
                .is_err()
        );

        let (route, displacement) =
            match_displaced(&matcher, &points, &DisplacementConfig::default(), &mut FirstCandidate, true).unwrap();
        assert_eq!(displacement.ring, 3);
        assert_eq!(displacement.north_m, -30.0);
        assert!(displacement.delta_lat < 0.0);
        assert_eq!(route.edges(), s.edges[..3].to_vec());
    }

    #[test]
    fn test_default_search_reaches_500_m() {
        let config = DisplacementConfig::default();
        let last = SpiralOffsets::new(&config).last().unwrap();
        assert_eq!(last.ring, 50);
        assert_eq!(last.east_m.abs().max(last.north_m.abs()), 500.0);
    }

    #[test]
    fn test_large_bias_recovered_with_defaults() {
        let s = strip();
        let grid = EdgeGrid::build(&s.graph, &IndexConfig::default()).unwrap();
        let matcher_config = MatcherConfig::default();
        let matcher = MapMatcher::new(&s.graph, &grid, &matcher_config);

        let points: Vec<TimeCoordinate> = (0..9)
            .map(|i| TimeCoordinate {
                position: displace(origin(), 25.0 * i as f64, 120.0),
                timestamp_ms: 1000 * i as i64,
                interval_s: 1.0,
                altitude_m: 0.0,
            })
            .collect();

        let (_, displacement) =
            match_displaced(&matcher, &points, &DisplacementConfig::default(), &mut FirstCandidate, true).unwrap();
        assert_eq!(displacement.ring, 12);
        assert_eq!(displacement.north_m, -120.0);
    }
}
