//! # Overlap Apportioner
//!
//! Splits a crash segment's counts across the AADT intervals it overlaps.
//!
//! Crashes are assumed uniformly distributed along the crash segment, so the
//! share attributed to an AADT interval is the overlap length divided by the
//! crash segment length. For crash segment `[cs, ce)` and AADT interval
//! `[as, ae)`:
//!
//! | category | condition | length in interval |
//! |---|---|---|
//! | `left_extra_len` | `cs < as`, `ce <= ae` | `(ce - cs) - (as - cs)` |
//! | `left_right_extra_len` | `cs < as`, `ce > ae` | `ae - as` |
//! | `no_extra_len` | `cs >= as`, `ce <= ae` | `ce - cs` |
//! | `right_extra_len` | `cs >= as`, `ce > ae` | `(ce - cs) - (ce - ae)` |

use std::fmt;

use log::warn;

use crate::binning::CrashBin;
use crate::error::ApportionError;
use crate::intervals::MilepostInterval;
use crate::segment::{CrashCounts, RouteId};

/// Where a crash segment sits relative to an AADT interval it overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverlapCategory {
    /// Starts before the interval, ends inside it
    LeftExtra,
    /// Spans the whole interval and beyond on both sides
    LeftRightExtra,
    /// Lies entirely inside the interval
    NoExtra,
    /// Starts inside the interval, ends after it
    RightExtra,
}

impl OverlapCategory {
    /// Column label used in exported tables.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeftExtra => "left_extra_len",
            Self::LeftRightExtra => "left_right_extra_len",
            Self::NoExtra => "no_extra_len",
            Self::RightExtra => "right_extra_len",
        }
    }

    /// Length of `crash` that falls inside `aadt` under this category.
    pub fn apportioned_len(self, crash: &MilepostInterval, aadt: &MilepostInterval) -> f64 {
        let crash_len = crash.len();
        match self {
            Self::LeftExtra => crash_len - (aadt.left - crash.left),
            Self::LeftRightExtra => aadt.right - aadt.left,
            Self::NoExtra => crash_len,
            Self::RightExtra => crash_len - (crash.right - aadt.right),
        }
    }
}

impl fmt::Display for OverlapCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an intersecting (crash segment, AADT interval) pair.
///
/// Returns `None` when the ranges do not intersect or a bound is not finite;
/// for every intersecting pair exactly one category applies.
pub fn classify_overlap(crash: &MilepostInterval, aadt: &MilepostInterval) -> Option<OverlapCategory> {
    let finite = [crash.left, crash.right, aadt.left, aadt.right]
        .iter()
        .all(|v| v.is_finite());
    if !finite || !crash.overlaps(aadt) {
        return None;
    }

    let starts_before = crash.left < aadt.left;
    let ends_after = crash.right > aadt.right;
    Some(match (starts_before, ends_after) {
        (true, false) => OverlapCategory::LeftExtra,
        (true, true) => OverlapCategory::LeftRightExtra,
        (false, false) => OverlapCategory::NoExtra,
        (false, true) => OverlapCategory::RightExtra,
    })
}

/// A crash segment's share of one AADT interval.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ApportionedFragment {
    pub route: RouteId,
    /// Position of the AADT interval in the route's corrected partition
    pub interval_index: usize,
    pub interval: MilepostInterval,
    pub crash_start_mp: f64,
    pub crash_end_mp: f64,
    pub category: OverlapCategory,
    /// Length of the crash segment inside the interval
    pub seg_len_in_interval: f64,
    /// `seg_len_in_interval / crash segment length`, in `(0, 1]`
    pub ratio_len_in_interval: f64,
    /// Crash counts scaled by the ratio
    pub counts: CrashCounts,
}

impl ApportionedFragment {
    /// Milepost length of the originating crash segment.
    pub fn crash_len(&self) -> f64 {
        self.crash_end_mp - self.crash_start_mp
    }
}

/// Apportion one binned pair.
///
/// # Example
/// ```
/// use nc_crash_rebin::{apportion_overlap, CrashCounts, MilepostInterval, OverlapCategory, RouteId};
///
/// let route = RouteId::parse("10000040092").unwrap();
/// let fragment = apportion_overlap(
///     &route,
///     0,
///     &MilepostInterval::new(1.0, 3.0),
///     &CrashCounts::new(2.0, 4.0, 10.0, 16.0),
///     &MilepostInterval::new(0.0, 2.0),
/// )
/// .unwrap();
///
/// assert_eq!(fragment.category, OverlapCategory::RightExtra);
/// assert_eq!(fragment.ratio_len_in_interval, 0.5);
/// assert_eq!(fragment.counts, CrashCounts::new(1.0, 2.0, 5.0, 8.0));
/// ```
pub fn apportion_overlap(
    route: &RouteId,
    interval_index: usize,
    crash: &MilepostInterval,
    counts: &CrashCounts,
    aadt: &MilepostInterval,
) -> Result<ApportionedFragment, ApportionError> {
    let category = classify_overlap(crash, aadt).ok_or_else(|| {
        let finite = [crash.left, crash.right, aadt.left, aadt.right]
            .iter()
            .all(|v| v.is_finite());
        if finite {
            ApportionError::NoIntersection {
                route: route.to_string(),
                crash_start: crash.left,
                crash_end: crash.right,
                interval_left: aadt.left,
                interval_right: aadt.right,
            }
        } else {
            ApportionError::NonFiniteBounds {
                route: route.to_string(),
            }
        }
    })?;

    let seg_len_in_interval = category.apportioned_len(crash, aadt);
    let ratio_len_in_interval = seg_len_in_interval / crash.len();

    Ok(ApportionedFragment {
        route: route.clone(),
        interval_index,
        interval: *aadt,
        crash_start_mp: crash.left,
        crash_end_mp: crash.right,
        category,
        seg_len_in_interval,
        ratio_len_in_interval,
        counts: counts.scaled(ratio_len_in_interval),
    })
}

/// Apportion a binned pair, logging failures.
pub fn apportion(bin: &CrashBin<'_>) -> Result<ApportionedFragment, ApportionError> {
    let crash = bin.crash;
    apportion_overlap(
        &crash.route,
        bin.interval_index,
        &crash.interval(),
        &crash.attributes,
        &bin.interval,
    )
    .map_err(|err| {
        warn!("[Apportion] {}", err);
        err
    })
}
