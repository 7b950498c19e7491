use geo::{Bearing, Destination, Distance, Haversine, Point};

/// Distances shorter than this are treated as zero.
pub const DISTANCE_ZERO_THRESHOLD_M: f64 = 0.1;

const EARTH_RADIUS_M: f64 = 6_371_008.8;
const METRES_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Great-circle distance in metres, collapsing anything under 10 cm to zero.
pub fn distance(a: Point<f64>, b: Point<f64>) -> f64 {
    let d = Haversine.distance(a, b);
    if d < DISTANCE_ZERO_THRESHOLD_M { 0.0 } else { d }
}

/// Compass bearing in degrees, normalised to [0, 360).
pub fn bearing(from: Point<f64>, to: Point<f64>) -> f64 {
    Haversine.bearing(from, to).rem_euclid(360.0)
}

/// Smallest absolute difference between two compass bearings, in [0, 180].
pub fn bearing_difference(a: f64, b: f64) -> f64 {
    180.0 - ((a - b).abs() - 180.0).abs()
}

/// Equirectangular projection around a reference point, in metres.
///
/// Airports fit comfortably inside the region where this agrees with a
/// transverse Mercator zone to well below GPS noise.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Point<f64>,
    metres_per_degree_lon: f64,
}

impl LocalFrame {
    pub fn new(origin: Point<f64>) -> Self {
        Self {
            origin,
            metres_per_degree_lon: METRES_PER_DEGREE * origin.y().to_radians().cos(),
        }
    }

    pub fn to_xy(&self, p: Point<f64>) -> (f64, f64) {
        (
            (p.x() - self.origin.x()) * self.metres_per_degree_lon,
            (p.y() - self.origin.y()) * METRES_PER_DEGREE,
        )
    }

    pub fn to_point(&self, x: f64, y: f64) -> Point<f64> {
        Point::new(
            self.origin.x() + x / self.metres_per_degree_lon,
            self.origin.y() + y / METRES_PER_DEGREE,
        )
    }
}

/// Angle in degrees, in [0, 180], by which a path turns at `cur`.
///
/// A zero-length leg on either side yields 0.
pub fn turn_angle(prev: Point<f64>, cur: Point<f64>, next: Point<f64>) -> f64 {
    turn_angle_in(&LocalFrame::new(cur), prev, cur, next)
}

pub(crate) fn turn_angle_in(
    frame: &LocalFrame,
    prev: Point<f64>,
    cur: Point<f64>,
    next: Point<f64>,
) -> f64 {
    if distance(prev, cur) == 0.0 || distance(cur, next) == 0.0 {
        return 0.0;
    }

    let (px, py) = frame.to_xy(prev);
    let (cx, cy) = frame.to_xy(cur);
    let (nx, ny) = frame.to_xy(next);

    let incoming = (cy - py).atan2(cx - px);
    let outgoing = (ny - cy).atan2(nx - cx);

    let deg = (incoming - outgoing).to_degrees().abs();
    if deg > 180.0 { 360.0 - deg } else { deg }
}

/// Foot of the perpendicular from a point onto the line through a segment.
#[derive(Debug, Clone, Copy)]
pub struct LineProjection {
    pub point: Point<f64>,
    /// Position along the segment: 0 at `a`, 1 at `b`.
    pub t: f64,
}

impl LineProjection {
    /// True when the foot is not strictly inside the segment.
    pub fn beyond_segment(&self) -> bool {
        self.t <= 0.0 || self.t >= 1.0
    }
}

/// Projects `p` onto the infinite line through `a` and `b`.
pub fn project_onto_line(p: Point<f64>, a: Point<f64>, b: Point<f64>) -> LineProjection {
    let frame = LocalFrame::new(a);
    let (bx, by) = frame.to_xy(b);
    let (px, py) = frame.to_xy(p);

    let len_sq = bx * bx + by * by;
    if len_sq == 0.0 {
        return LineProjection { point: a, t: 0.0 };
    }

    let t = (px * bx + py * by) / len_sq;
    LineProjection {
        point: frame.to_point(t * bx, t * by),
        t,
    }
}

/// Nearest point of segment `a`-`b` to `p` and its distance.
///
/// Projections falling outside the segment are replaced by the nearer end.
pub fn nearest_on_segment(p: Point<f64>, a: Point<f64>, b: Point<f64>) -> (Point<f64>, f64) {
    let projection = project_onto_line(p, a, b);
    if projection.beyond_segment() {
        let to_a = distance(p, a);
        let to_b = distance(p, b);
        if to_a < to_b { (a, to_a) } else { (b, to_b) }
    } else {
        (projection.point, distance(p, projection.point))
    }
}

/// Moves a point rigidly by `east_m` and `north_m` metres.
pub fn displace(p: Point<f64>, east_m: f64, north_m: f64) -> Point<f64> {
    let offset = east_m.hypot(north_m);
    if offset == 0.0 {
        return p;
    }
    let heading = east_m.atan2(north_m).to_degrees().rem_euclid(360.0);
    Haversine.destination(p, heading, offset)
}

/// Metres covered by one degree of latitude and of longitude at `p`.
pub fn metres_per_degree(p: Point<f64>) -> (f64, f64) {
    const STEP: f64 = 0.01;
    let lat = Haversine.distance(p, Point::new(p.x(), p.y() + STEP)) / STEP;
    let lon = Haversine.distance(p, Point::new(p.x() + STEP, p.y())) / STEP;
    (lat, lon)
}
