//! # Geographic Utilities
//!
//! Length helpers for the geometry carried on route segments.
//!
//! Mileposts drive every reconciliation stage; geometry is only passed
//! through. These helpers give the geometric length of a segment so it can be
//! reported next to its milepost length (the `shape_len_mi` column of the
//! crash layer).
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance_mi`] | Great-circle distance between two coordinates, in miles |
//! | [`polyline_length_mi`] | Total length of a line string, in miles |
//!
//! All functions expect WGS84 longitude/latitude coordinates (EPSG:4326).

use geo::{Coord, Distance, Haversine, LineString, Point};

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.344;

/// Great-circle distance between two `(lng, lat)` coordinates, in miles.
///
/// # Example
///
/// ```rust
/// use geo::Coord;
/// use nc_crash_rebin::geo_utils;
///
/// // Raleigh to Durham, roughly 21 miles
/// let raleigh = Coord { x: -78.6382, y: 35.7796 };
/// let durham = Coord { x: -78.8986, y: 35.9940 };
/// let miles = geo_utils::haversine_distance_mi(raleigh, durham);
/// assert!((miles - 20.8).abs() < 1.5);
/// ```
#[inline]
pub fn haversine_distance_mi(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Haversine::distance(Point::from(a), Point::from(b)) / METERS_PER_MILE
}

/// Total haversine length of a line string, in miles.
///
/// Empty and single-point lines have length 0.
pub fn polyline_length_mi(line: &LineString<f64>) -> f64 {
    line.0
        .windows(2)
        .map(|w| haversine_distance_mi(w[0], w[1]))
        .sum()
}
