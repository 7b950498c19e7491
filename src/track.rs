use geo::Point;
use serde::Serialize;

use crate::geometry;

/// A single fix of a ground trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCoordinate {
    pub position: Point<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Seconds since the previous fix
    pub interval_s: f64,
    pub altitude_m: f64,
}

impl TimeCoordinate {
    pub fn on_ground(&self) -> bool {
        self.altitude_m == 0.0
    }
}

/// Which way a flight used the airport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    Inbound,
    Outbound,
    Stopoff,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub direction: MovementDirection,
    pub points: Vec<TimeCoordinate>,
}

impl Track {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Moves every fix by the same offset, keeping times and altitudes.
pub fn displaced(points: &[TimeCoordinate], east_m: f64, north_m: f64) -> Vec<TimeCoordinate> {
    points
        .iter()
        .map(|p| TimeCoordinate {
            position: geometry::displace(p.position, east_m, north_m),
            ..p.clone()
        })
        .collect()
}
