//! Fixed-point coordinates and great-circle math.
//!
//! Coordinates are stored as micro-degrees in `i32`; equality is bitwise.
//! All distances are meters, all bearings are degrees clockwise from north.

use serde::{Deserialize, Serialize};

/// Fixed-point scaling factor: 1e6 micro-degrees per degree.
pub const COORDINATE_PRECISION: f64 = 1e6;

const EARTH_RADIUS_M: f64 = 6_372_797.560856;

/// A WGS84 location in fixed-point micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: i32,
    pub lat: i32,
}

impl Coordinate {
    pub const INVALID: Coordinate = Coordinate {
        lon: i32::MIN,
        lat: i32::MIN,
    };

    pub fn new(lon: i32, lat: i32) -> Self {
        Self { lon, lat }
    }

    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self {
            lon: (lon * COORDINATE_PRECISION).round() as i32,
            lat: (lat * COORDINATE_PRECISION).round() as i32,
        }
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / COORDINATE_PRECISION
    }

    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / COORDINATE_PRECISION
    }

    pub fn is_valid(&self) -> bool {
        self.lat.abs() <= 90_000_000 && self.lon.abs() <= 180_000_000
    }
}

/// Great-circle distance in meters.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat_degrees().to_radians();
    let lat2 = b.lat_degrees().to_radians();
    let dlat = (b.lat_degrees() - a.lat_degrees()).to_radians();
    let dlon = (b.lon_degrees() - a.lon_degrees()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `from` to `to` in degrees [0, 360).
pub fn bearing(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat_degrees().to_radians();
    let lat2 = to.lat_degrees().to_radians();
    let dlon = (to.lon_degrees() - from.lon_degrees()).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let deg = y.atan2(x).to_degrees();
    (deg + 360.0) % 360.0
}

/// The bearing of the same segment traversed in the opposite direction.
pub fn reverse_bearing(b: f64) -> f64 {
    (b + 180.0) % 360.0
}

/// Absolute deviation between two angles, in [0, 180].
pub fn angular_deviation(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

/// Turn angle on the normal turn circle given entry and exit bearings.
///
/// 180 is straight ahead, < 180 turns right, > 180 turns left, 0/360 is a
/// full reversal.
pub fn turn_angle(entry_bearing: f64, exit_bearing: f64) -> f64 {
    let offset = 360.0 - entry_bearing;
    let rotated_exit = {
        let b = exit_bearing + offset;
        if b > 360.0 {
            b - 360.0
        } else {
            b
        }
    };
    let angle = 540.0 - rotated_exit;
    if angle >= 360.0 {
        angle - 360.0
    } else {
        angle
    }
}

/// Angle at `via` formed by `first -> via -> third`, in [0, 360).
/// 180 means the three points are collinear (going straight).
pub fn compute_angle(first: Coordinate, via: Coordinate, third: Coordinate) -> f64 {
    turn_angle(reverse_bearing(bearing(via, first)), bearing(via, third))
}

/// Perpendicular projection of `point` onto the segment `a -> b`.
///
/// Returns the clamped ratio along the segment and the projected location.
/// Uses an equirectangular local approximation, which is accurate at segment
/// scale.
pub fn project_onto_segment(a: Coordinate, b: Coordinate, point: Coordinate) -> (f64, Coordinate) {
    let lat_scale = point.lat_degrees().to_radians().cos();

    let ax = a.lon_degrees() * lat_scale;
    let ay = a.lat_degrees();
    let bx = b.lon_degrees() * lat_scale;
    let by = b.lat_degrees();
    let px = point.lon_degrees() * lat_scale;
    let py = point.lat_degrees();

    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;

    let ratio = if len2 > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let lon = a.lon_degrees() + (b.lon_degrees() - a.lon_degrees()) * ratio;
    let lat = ay + dy * ratio;
    (ratio, Coordinate::from_degrees(lon, lat))
}
