//! Record-level error types.
//!
//! None of these abort a run. The ingest and merge stages collect them into
//! their reports so one malformed record never blocks the rest of a dataset.

use thiserror::Error;

/// A raw AADT or crash record that could not become a [`crate::RouteSegment`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("route id `{raw}` is not {expected} digits long")]
    RouteIdLength { raw: String, expected: usize },
    #[error("route id `{raw}` contains non-numeric characters")]
    RouteIdNonNumeric { raw: String },
    #[error("record on route `{route}` is missing required field `{field}`")]
    MissingField { route: String, field: &'static str },
    #[error("field `{field}` on route `{route}` is not numeric: `{value}`")]
    NonNumeric {
        route: String,
        field: &'static str,
        value: String,
    },
    #[error("field `{field}` on route `{route}` is not finite")]
    NonFinite { route: String, field: &'static str },
    #[error("field `{field}` on route `{route}` is negative: {value}")]
    NegativeValue {
        route: String,
        field: &'static str,
        value: f64,
    },
    #[error("segment on route `{route}` has end milepost {end} <= start milepost {start}")]
    NonPositiveLength { route: String, start: f64, end: f64 },
    #[error("county {found} on route `{route}` does not match route id county {expected}")]
    CountyMismatch {
        route: String,
        expected: u16,
        found: u16,
    },
}

/// A (crash segment, AADT interval) pair that fits none of the overlap cases.
///
/// Only reachable when a non-intersecting pair slips past binning or when a
/// bound is not finite.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApportionError {
    #[error(
        "crash segment [{crash_start}, {crash_end}) on route `{route}` does not intersect \
         AADT interval [{interval_left}, {interval_right})"
    )]
    NoIntersection {
        route: String,
        crash_start: f64,
        crash_end: f64,
        interval_left: f64,
        interval_right: f64,
    },
    #[error("non-finite milepost on route `{route}`")]
    NonFiniteBounds { route: String },
}
