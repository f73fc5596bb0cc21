//! # Interval Binner
//!
//! Matches each crash segment on a route to every corrected AADT interval it
//! overlaps, producing a long table with one row per (crash segment, AADT
//! interval) pair.
//!
//! Short routes are scanned linearly. Routes with many AADT intervals are
//! indexed in an R-tree, with each interval stored as a flat box on the
//! milepost axis; the tree only pre-filters, and the half-open overlap test
//! decides.

use log::debug;
use rstar::{RTree, RTreeObject, AABB};

use crate::intervals::{AadtInterval, MilepostInterval};
use crate::segment::CrashSegment;

/// One (crash segment, AADT interval) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashBin<'a> {
    /// Position of the crash segment in the input slice
    pub crash_index: usize,
    pub crash: &'a CrashSegment,
    /// Position of the AADT interval in the corrected partition
    pub interval_index: usize,
    pub interval: MilepostInterval,
}

/// Binning output for a single route.
#[derive(Debug, Clone, Default)]
pub struct BinnedRoute<'a> {
    /// Pairs ordered by crash start milepost, then AADT interval order
    pub bins: Vec<CrashBin<'a>>,
    /// Input positions of crash segments that overlap no AADT interval
    pub unbinned: Vec<usize>,
}

// =============================================================================
// R-tree Indexed Interval
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct IndexedInterval {
    index: usize,
    left: f64,
    right: f64,
}

impl RTreeObject for IndexedInterval {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.left, 0.0], [self.right, 0.0])
    }
}

enum IntervalLookup<'i> {
    Scan(&'i [AadtInterval]),
    Tree(&'i [AadtInterval], RTree<IndexedInterval>),
}

impl<'i> IntervalLookup<'i> {
    fn build(intervals: &'i [AadtInterval], index_min_intervals: usize) -> Self {
        if intervals.len() < index_min_intervals {
            return Self::Scan(intervals);
        }
        let entries: Vec<IndexedInterval> = intervals
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.interval.is_empty())
            .map(|(index, i)| IndexedInterval {
                index,
                left: i.interval.left,
                right: i.interval.right,
            })
            .collect();
        Self::Tree(intervals, RTree::bulk_load(entries))
    }

    /// Indices of every interval overlapping `query`, ascending.
    fn overlapping(&self, query: &MilepostInterval) -> Vec<usize> {
        match self {
            Self::Scan(intervals) => intervals
                .iter()
                .enumerate()
                .filter(|(_, i)| i.interval.overlaps(query))
                .map(|(index, _)| index)
                .collect(),
            Self::Tree(intervals, tree) => {
                let envelope = AABB::from_corners([query.left, 0.0], [query.right, 0.0]);
                let mut hits: Vec<usize> = tree
                    .locate_in_envelope_intersecting(&envelope)
                    .map(|entry| entry.index)
                    .filter(|&index| intervals[index].interval.overlaps(query))
                    .collect();
                hits.sort_unstable();
                hits
            }
        }
    }
}

// =============================================================================
// Binning
// =============================================================================

/// Bin one route's crash segments against its corrected AADT partition.
///
/// `intervals` must come from [`crate::correct_aadt_intervals`]. Overlap is
/// tested with half-open semantics, so a crash segment ending exactly where
/// an AADT interval starts does not land in it. Crash segments with no
/// overlap are listed in [`BinnedRoute::unbinned`] rather than dropped
/// silently.
///
/// An R-tree is built when the route has at least `index_min_intervals`
/// AADT intervals.
pub fn bin_crash_segments<'a>(
    intervals: &[AadtInterval],
    crashes: &'a [CrashSegment],
    index_min_intervals: usize,
) -> BinnedRoute<'a> {
    let lookup = IntervalLookup::build(intervals, index_min_intervals);

    let mut order: Vec<usize> = (0..crashes.len()).collect();
    order.sort_by(|&a, &b| crashes[a].start_mp.total_cmp(&crashes[b].start_mp));

    let mut binned = BinnedRoute::default();
    for crash_index in order {
        let crash = &crashes[crash_index];
        let hits = lookup.overlapping(&crash.interval());
        if hits.is_empty() {
            debug!(
                "[Binning] Route {}: crash segment [{}, {}) overlaps no AADT interval",
                crash.route, crash.start_mp, crash.end_mp
            );
            binned.unbinned.push(crash_index);
            continue;
        }
        binned.bins.extend(hits.into_iter().map(|interval_index| CrashBin {
            crash_index,
            crash,
            interval_index,
            interval: intervals[interval_index].interval,
        }));
    }

    binned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::correct_aadt_intervals;
    use crate::segment::{AadtAttributes, CrashCounts, RouteId, RouteSegment};

    fn route() -> RouteId {
        RouteId::parse("20000070092").unwrap()
    }

    fn partition(bounds: &[(f64, f64)]) -> Vec<AadtInterval> {
        let segments = bounds
            .iter()
            .map(|&(s, e)| RouteSegment::new(route(), s, e, AadtAttributes::new(9000.0)).unwrap())
            .collect();
        correct_aadt_intervals(segments).0
    }

    fn crash(start: f64, end: f64) -> CrashSegment {
        RouteSegment::new(route(), start, end, CrashCounts::new(1.0, 1.0, 1.0, 3.0)).unwrap()
    }

    fn pairs(binned: &BinnedRoute) -> Vec<(usize, usize)> {
        binned
            .bins
            .iter()
            .map(|b| (b.crash_index, b.interval_index))
            .collect()
    }

    #[test]
    fn test_straddling_segment_hits_both_intervals() {
        let intervals = partition(&[(0.0, 2.0), (2.0, 4.0), (4.0, 6.0)]);
        let crashes = vec![crash(1.0, 3.0)];
        let binned = bin_crash_segments(&intervals, &crashes, usize::MAX);
        assert_eq!(pairs(&binned), vec![(0, 0), (0, 1)]);
        assert!(binned.unbinned.is_empty());
    }

    #[test]
    fn test_touching_endpoint_is_not_overlap() {
        let intervals = partition(&[(0.0, 2.0), (2.0, 4.0)]);
        let crashes = vec![crash(1.0, 2.0)];
        let binned = bin_crash_segments(&intervals, &crashes, usize::MAX);
        assert_eq!(pairs(&binned), vec![(0, 0)]);
    }

    #[test]
    fn test_uncovered_segment_is_reported() {
        let intervals = partition(&[(0.0, 2.0)]);
        let crashes = vec![crash(5.0, 6.0), crash(0.5, 1.0)];
        let binned = bin_crash_segments(&intervals, &crashes, usize::MAX);
        assert_eq!(pairs(&binned), vec![(1, 0)]);
        assert_eq!(binned.unbinned, vec![0]);
    }

    #[test]
    fn test_output_ordered_by_crash_start() {
        let intervals = partition(&[(0.0, 1.0), (1.0, 2.0)]);
        let crashes = vec![crash(1.2, 1.8), crash(0.1, 0.4)];
        let binned = bin_crash_segments(&intervals, &crashes, usize::MAX);
        assert_eq!(pairs(&binned), vec![(1, 0), (0, 1)]);
    }

    #[test]
    fn test_rtree_matches_linear_scan() {
        let bounds: Vec<(f64, f64)> = (0..200).map(|i| (i as f64 * 0.5, i as f64 * 0.5 + 0.5)).collect();
        let intervals = partition(&bounds);
        let crashes = vec![
            crash(0.25, 3.1),
            crash(10.0, 10.5),
            crash(49.9, 120.0),
            crash(100.0, 101.0),
        ];

        let scanned = bin_crash_segments(&intervals, &crashes, usize::MAX);
        let indexed = bin_crash_segments(&intervals, &crashes, 1);

        assert_eq!(pairs(&scanned), pairs(&indexed));
        assert_eq!(scanned.unbinned, vec![3]);
        assert_eq!(indexed.unbinned, vec![3]);
    }

    #[test]
    fn test_empty_interval_never_matches() {
        let intervals = partition(&[(0.0, 2.0), (0.0, 1.0)]);
        assert!(intervals[0].interval.is_empty());
        let crashes = vec![crash(0.0, 0.5)];
        for threshold in [1, usize::MAX] {
            let binned = bin_crash_segments(&intervals, &crashes, threshold);
            assert_eq!(pairs(&binned), vec![(0, 1)]);
        }
    }
}
