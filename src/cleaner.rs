use geo::Point;
use itertools::Itertools;
use log::{debug, trace};
use serde::Deserialize;
use std::collections::HashMap;

use crate::geometry::{self, LocalFrame};
use crate::track::TimeCoordinate;

/// A turn sharper than `angle_deg` taken faster than `speed_mps` marks a fix as bad.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TurnSpeedLimit {
    pub angle_deg: f64,
    pub speed_mps: f64,
}

/// Calibration data: turn angle and ground speed pairs no taxiing aircraft reaches.
pub const DEFAULT_TURN_SPEED_LIMITS: [TurnSpeedLimit; 6] = [
    TurnSpeedLimit { angle_deg: 90.0, speed_mps: 30.0 },
    TurnSpeedLimit { angle_deg: 60.0, speed_mps: 50.0 },
    TurnSpeedLimit { angle_deg: 150.0, speed_mps: 10.0 },
    TurnSpeedLimit { angle_deg: 120.0, speed_mps: 20.0 },
    TurnSpeedLimit { angle_deg: 130.0, speed_mps: 16.7 },
    TurnSpeedLimit { angle_deg: 140.0, speed_mps: 13.3 },
];

/// Configuration for outlier removal
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Fixes further than this from the airport are dropped (metres)
    pub radius_m: f64,
    /// Fixes at or above this altitude are dropped (metres)
    pub max_altitude_m: f64,
    /// Give up once this share of the trace is flagged
    pub max_bad_fraction: f64,
    /// Give up once this many fixes are flagged. The subset search grows as 2^n in the
    /// flagged count, so unbounded (`None`) is only safe for short traces.
    pub max_bad_count: Option<usize>,
    pub turn_speed_limits: Vec<TurnSpeedLimit>,
    /// A jump longer than this, also `jump_ratio` times the skipped chord, is an outlier (metres)
    pub jump_m: f64,
    pub jump_ratio: f64,
    /// A leg longer than `isolated_far_m` next to one shorter than `isolated_near_m` is an outlier
    pub isolated_far_m: f64,
    pub isolated_near_m: f64,
    /// First and last fixes further than this from their neighbour are suspect (metres)
    pub endpoint_jump_m: f64,
    pub endpoint_ratio: f64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            radius_m: 10_000.0,
            max_altitude_m: 2000.0,
            max_bad_fraction: 0.8,
            max_bad_count: Some(30),
            turn_speed_limits: DEFAULT_TURN_SPEED_LIMITS.to_vec(),
            jump_m: 100.0,
            jump_ratio: 5.0,
            isolated_far_m: 250.0,
            isolated_near_m: 10.0,
            endpoint_jump_m: 100.0,
            endpoint_ratio: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CleanOutcome {
    /// Nothing was flagged
    Unchanged(Vec<TimeCoordinate>),
    /// Outliers were removed
    Cleaned {
        points: Vec<TimeCoordinate>,
        removed: usize,
    },
    /// Too many fixes were flagged to trust the trace
    Discarded { flagged: usize },
}

impl CleanOutcome {
    pub fn points(self) -> Option<Vec<TimeCoordinate>> {
        match self {
            CleanOutcome::Unchanged(points) | CleanOutcome::Cleaned { points, .. } => Some(points),
            CleanOutcome::Discarded { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Fix {
    original: usize,
    point: TimeCoordinate,
}

pub struct TrackCleaner<'a> {
    config: &'a CleanerConfig,
    airport: Point<f64>,
    // Decisions for interior triples, keyed by original indices
    memo: HashMap<(usize, usize, usize), bool>,
}

impl<'a> TrackCleaner<'a> {
    pub fn new(config: &'a CleanerConfig, airport: Point<f64>) -> Self {
        Self {
            config,
            airport,
            memo: HashMap::new(),
        }
    }

    pub fn clean(&mut self, points: &[TimeCoordinate]) -> CleanOutcome {
        self.memo.clear();

        let (base, dropped) = self.drop_remote(points);
        let mut base = base;
        let mut bad = self.flag(&base);
        if bad.is_empty() {
            if dropped == 0 {
                return CleanOutcome::Unchanged(points.to_vec());
            }
            return CleanOutcome::Cleaned {
                points: base.into_iter().map(|f| f.point).collect(),
                removed: dropped,
            };
        }

        loop {
            let cap = self
                .config
                .max_bad_count
                .map_or(f64::INFINITY, |c| c as f64)
                .min(base.len() as f64 * self.config.max_bad_fraction);
            if bad.len() as f64 >= cap {
                debug!("Discarding trace with {} flagged of {} fixes", bad.len(), base.len());
                return CleanOutcome::Discarded { flagged: bad.len() };
            }

            let mut fallback = None;
            'depth: for k in 1..=bad.len() {
                for subset in bad.iter().copied().combinations(k) {
                    let candidate = remove_folding(&base, &subset);
                    let still_bad = self.flag(&candidate);
                    if still_bad.is_empty() {
                        let removed = points.len() - candidate.len();
                        trace!("Removing {} fixes cleaned the trace", removed);
                        return CleanOutcome::Cleaned {
                            points: candidate.into_iter().map(|f| f.point).collect(),
                            removed,
                        };
                    }
                    if k == bad.len() {
                        fallback = Some((candidate, still_bad));
                        break 'depth;
                    }
                }
            }

            let Some((next_base, next_bad)) = fallback else {
                return CleanOutcome::Discarded { flagged: bad.len() };
            };
            base = next_base;
            bad = next_bad;
        }
    }

    /// Drops fixes far from the airport or airborne, folding their intervals forward.
    fn drop_remote(&self, points: &[TimeCoordinate]) -> (Vec<Fix>, usize) {
        let mut kept = Vec::with_capacity(points.len());
        let mut pending = 0.0;
        for (original, point) in points.iter().enumerate() {
            let remote = geometry::distance(point.position, self.airport) > self.config.radius_m;
            if remote || point.altitude_m >= self.config.max_altitude_m {
                pending += point.interval_s;
                continue;
            }
            let mut point = point.clone();
            point.interval_s += pending;
            pending = 0.0;
            kept.push(Fix { original, point });
        }
        let dropped = points.len() - kept.len();
        (kept, dropped)
    }

    /// Positions in `fixes` of every point failing a test.
    fn flag(&mut self, fixes: &[Fix]) -> Vec<usize> {
        let n = fixes.len();
        if n < 3 {
            return Vec::new();
        }

        let mut bad = Vec::new();
        if self.endpoint_is_bad(&fixes[0], &fixes[1], &fixes[2]) {
            bad.push(0);
        }
        for i in 1..n - 1 {
            let key = (fixes[i - 1].original, fixes[i].original, fixes[i + 1].original);
            let is_bad = match self.memo.get(&key) {
                Some(&decision) => decision,
                None => {
                    let decision = self.interior_is_bad(&fixes[i - 1], &fixes[i], &fixes[i + 1]);
                    self.memo.insert(key, decision);
                    decision
                }
            };
            if is_bad {
                bad.push(i);
            }
        }
        if self.endpoint_is_bad(&fixes[n - 1], &fixes[n - 2], &fixes[n - 3]) {
            bad.push(n - 1);
        }
        bad
    }

    /// Like the interior tests, only judged when all three fixes are on the ground.
    fn endpoint_is_bad(&self, end: &Fix, near: &Fix, beyond: &Fix) -> bool {
        if !(end.point.on_ground() && near.point.on_ground() && beyond.point.on_ground()) {
            return false;
        }
        let jump = geometry::distance(end.point.position, near.point.position);
        let next = geometry::distance(near.point.position, beyond.point.position);
        jump > self.config.endpoint_jump_m && jump > self.config.endpoint_ratio * next
    }

    fn interior_is_bad(&self, prev: &Fix, cur: &Fix, next: &Fix) -> bool {
        if !(prev.point.on_ground() && cur.point.on_ground() && next.point.on_ground()) {
            return false;
        }
        let (p, c, n) = (prev.point.position, cur.point.position, next.point.position);
        let d1 = geometry::distance(p, c);
        let d2 = geometry::distance(c, n);
        let chord = geometry::distance(p, n);

        let angle = geometry::turn_angle_in(&LocalFrame::new(c), p, c, n);
        let speed = (d1 + d2) / (cur.point.interval_s + next.point.interval_s);
        if self
            .config
            .turn_speed_limits
            .iter()
            .any(|limit| angle > limit.angle_deg && speed > limit.speed_mps)
        {
            return true;
        }

        let config = self.config;
        let jump = d1 > config.jump_m && d1 > config.jump_ratio * chord && d2 > config.jump_ratio * chord;
        let isolated = (d1 > config.isolated_far_m && d2 < config.isolated_near_m)
            || (d1 < config.isolated_near_m && d2 > config.isolated_far_m);
        jump || isolated
    }
}

/// Removes the fixes at `positions`, adding each removed interval to the next kept fix.
fn remove_folding(fixes: &[Fix], positions: &[usize]) -> Vec<Fix> {
    let mut kept = Vec::with_capacity(fixes.len() - positions.len());
    let mut pending = 0.0;
    for (i, fix) in fixes.iter().enumerate() {
        if positions.contains(&i) {
            pending += fix.point.interval_s;
            continue;
        }
        let mut fix = fix.clone();
        fix.point.interval_s += pending;
        pending = 0.0;
        kept.push(fix);
    }
    kept
}
