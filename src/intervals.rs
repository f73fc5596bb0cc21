//! # Milepost Intervals
//!
//! Half-open milepost intervals and the correction that turns a route's AADT
//! segments into an ordered, non-overlapping partition.
//!
//! AADT layers occasionally contain segments that run past the start of the
//! next segment. That is input noise, not a fatal defect: the overlapping
//! segment's end is clipped to the next start and the clip is logged and
//! returned as an [`OverlapCorrection`].

use log::warn;

use crate::segment::{AadtSegment, RouteId};

/// A left-closed, right-open milepost range `[left, right)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MilepostInterval {
    pub left: f64,
    pub right: f64,
}

impl MilepostInterval {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn len(&self) -> f64 {
        self.right - self.left
    }

    /// True when the interval holds no milepost (`right <= left`).
    pub fn is_empty(&self) -> bool {
        !(self.right > self.left)
    }

    /// `left <= mp < right`
    pub fn contains(&self, mp: f64) -> bool {
        self.left <= mp && mp < self.right
    }

    /// True when the two ranges share at least one milepost.
    ///
    /// Touching endpoints do not overlap: `[0, 1)` and `[1, 2)` are disjoint.
    pub fn overlaps(&self, other: &MilepostInterval) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
    }

    /// Length of the shared range, 0 when disjoint.
    pub fn intersection_len(&self, other: &MilepostInterval) -> f64 {
        if !self.overlaps(other) {
            return 0.0;
        }
        self.right.min(other.right) - self.left.max(other.left)
    }
}

/// An AADT segment placed on its route's corrected partition.
#[derive(Debug, Clone, PartialEq)]
pub struct AadtInterval {
    /// The segment as parsed, original end milepost intact
    pub segment: AadtSegment,
    /// `[start_mp, corrected end)`
    pub interval: MilepostInterval,
    /// True when the end was clipped to the next segment's start
    pub corrected: bool,
}

/// One clipped AADT segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OverlapCorrection {
    pub route: RouteId,
    pub start_mp: f64,
    pub original_end_mp: f64,
    pub corrected_end_mp: f64,
    /// Start milepost of the following segment that forced the clip
    pub next_start_mp: f64,
}

/// Sort one route's AADT segments and clip overlaps.
///
/// Segments are ordered by start milepost (then end milepost, stable for
/// ties). Each segment's end becomes `min(end, next.start)`; the last segment
/// keeps its end. The result is ordered with `right <= next.left` for every
/// adjacent pair. Running the correction again on the non-empty intervals
/// changes nothing.
///
/// Two segments sharing a start milepost leave the first one empty
/// (`[s, s)`). It stays in this output, with its [`OverlapCorrection`], but
/// can never match a crash segment and cannot be rebuilt through
/// [`RouteSegment::new`](crate::RouteSegment::new), so a second pass only
/// applies to the remaining intervals. The merge drops empty intervals from
/// its rows.
///
/// # Example
/// ```
/// use nc_crash_rebin::{correct_aadt_intervals, AadtAttributes, RouteId, RouteSegment};
///
/// let route = RouteId::parse("10000040092").unwrap();
/// let segments = vec![
///     RouteSegment::new(route.clone(), 1.5, 3.0, AadtAttributes::new(41000.0)).unwrap(),
///     RouteSegment::new(route.clone(), 0.0, 2.0, AadtAttributes::new(38000.0)).unwrap(),
/// ];
///
/// let (intervals, corrections) = correct_aadt_intervals(segments);
/// assert_eq!(intervals[0].interval.right, 1.5);
/// assert_eq!(corrections.len(), 1);
/// ```
pub fn correct_aadt_intervals(mut segments: Vec<AadtSegment>) -> (Vec<AadtInterval>, Vec<OverlapCorrection>) {
    segments.sort_by(|a, b| {
        a.start_mp
            .total_cmp(&b.start_mp)
            .then(a.end_mp.total_cmp(&b.end_mp))
    });

    let next_starts: Vec<Option<f64>> = segments
        .iter()
        .skip(1)
        .map(|s| Some(s.start_mp))
        .chain(std::iter::once(None))
        .collect();

    let mut corrections = Vec::new();
    let intervals = segments
        .into_iter()
        .zip(next_starts)
        .map(|(segment, next_start)| {
            let next_start = next_start.unwrap_or(segment.end_mp);
            let corrected = next_start < segment.end_mp;
            let right = if corrected { next_start } else { segment.end_mp };

            if corrected {
                warn!(
                    "[Overlap] Route {}: interval [{}, {}) overlaps next start {}; clipped to [{}, {})",
                    segment.route, segment.start_mp, segment.end_mp, next_start, segment.start_mp, right
                );
                corrections.push(OverlapCorrection {
                    route: segment.route.clone(),
                    start_mp: segment.start_mp,
                    original_end_mp: segment.end_mp,
                    corrected_end_mp: right,
                    next_start_mp: next_start,
                });
            }

            AadtInterval {
                interval: MilepostInterval::new(segment.start_mp, right),
                segment,
                corrected,
            }
        })
        .collect();

    (intervals, corrections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{AadtAttributes, RouteSegment};

    fn route() -> RouteId {
        RouteId::parse("10000040092").unwrap()
    }

    fn aadt(start: f64, end: f64) -> AadtSegment {
        RouteSegment::new(route(), start, end, AadtAttributes::new(20000.0)).unwrap()
    }

    fn bounds(intervals: &[AadtInterval]) -> Vec<(f64, f64)> {
        intervals
            .iter()
            .map(|i| (i.interval.left, i.interval.right))
            .collect()
    }

    #[test]
    fn test_half_open_overlap() {
        let a = MilepostInterval::new(0.0, 1.0);
        assert!(!a.overlaps(&MilepostInterval::new(1.0, 2.0)));
        assert!(a.overlaps(&MilepostInterval::new(0.5, 2.0)));
        assert!(a.contains(0.0));
        assert!(!a.contains(1.0));
        assert_eq!(a.intersection_len(&MilepostInterval::new(0.25, 3.0)), 0.75);
    }

    #[test]
    fn test_empty_interval_overlaps_nothing() {
        let empty = MilepostInterval::new(2.0, 2.0);
        assert!(empty.is_empty());
        assert!(!empty.overlaps(&MilepostInterval::new(1.0, 3.0)));
        assert!(!MilepostInterval::new(1.0, 3.0).overlaps(&empty));
    }

    #[test]
    fn test_clean_partition_untouched() {
        let (intervals, corrections) = correct_aadt_intervals(vec![aadt(1.0, 2.5), aadt(0.0, 1.0)]);
        assert!(corrections.is_empty());
        assert_eq!(bounds(&intervals), vec![(0.0, 1.0), (1.0, 2.5)]);
        assert!(intervals.iter().all(|i| !i.corrected));
    }

    #[test]
    fn test_overlap_is_clipped_and_reported() {
        let (intervals, corrections) =
            correct_aadt_intervals(vec![aadt(0.0, 1.2), aadt(1.0, 2.0), aadt(2.0, 3.0)]);
        assert_eq!(bounds(&intervals), vec![(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].original_end_mp, 1.2);
        assert_eq!(corrections[0].corrected_end_mp, 1.0);
        assert!(intervals[0].corrected);
        // Original end is preserved on the segment itself
        assert_eq!(intervals[0].segment.end_mp, 1.2);
    }

    #[test]
    fn test_corrected_partition_is_ordered() {
        let (intervals, _) = correct_aadt_intervals(vec![
            aadt(5.0, 9.0),
            aadt(0.0, 10.0),
            aadt(2.0, 3.0),
            aadt(2.5, 6.0),
        ]);
        for pair in intervals.windows(2) {
            assert!(pair[0].interval.left < pair[1].interval.left);
            assert!(pair[0].interval.right <= pair[1].interval.left);
        }
    }

    #[test]
    fn test_correction_is_idempotent() {
        let (first, _) = correct_aadt_intervals(vec![aadt(0.0, 1.5), aadt(1.0, 3.0), aadt(2.0, 2.5)]);
        let reclipped: Vec<AadtSegment> = first
            .iter()
            .map(|i| aadt(i.interval.left, i.interval.right))
            .collect();
        let (second, corrections) = correct_aadt_intervals(reclipped);
        assert!(corrections.is_empty());
        assert_eq!(bounds(&first), bounds(&second));
    }

    #[test]
    fn test_shared_start_leaves_empty_interval() {
        let (intervals, corrections) = correct_aadt_intervals(vec![aadt(0.0, 2.0), aadt(0.0, 1.0)]);
        assert_eq!(bounds(&intervals), vec![(0.0, 0.0), (0.0, 2.0)]);
        assert!(intervals[0].interval.is_empty());
        assert_eq!(corrections.len(), 1);

        // The empty interval cannot be refed; the rest is already a partition
        let refed: Vec<AadtSegment> = intervals
            .iter()
            .filter_map(|iv| RouteSegment::new(iv.segment.route.clone(), iv.interval.left, iv.interval.right, AadtAttributes::new(1.0)).ok())
            .collect();
        assert_eq!(refed.len(), 1);
        let (again, corrections) = correct_aadt_intervals(refed);
        assert_eq!(bounds(&again), vec![(0.0, 2.0)]);
        assert!(corrections.is_empty());
    }
}
