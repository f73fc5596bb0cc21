//! # Merge Driver
//!
//! Runs the per-route pipeline over every route and joins the crash totals
//! back onto the AADT partition.
//!
//! ## Algorithm
//! 1. Partition AADT and crash segments by route id
//! 2. Per AADT route: sort and clip overlapping intervals
//! 3. Bin the route's crash segments against the corrected intervals
//! 4. Apportion each (crash segment, interval) pair by overlap length
//! 5. Aggregate the fragments per interval
//! 6. Left-join intervals to aggregates and sort by route, then milepost
//!
//! Steps 2-5 are a pure function of one route's segments ([`process_route`]),
//! so routes can be processed in any order or in parallel; the join and sort
//! run once every route is done.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use geo::LineString;
use log::{debug, info, warn};

use crate::aggregate::{aggregate_fragments, AggregatedInterval, SeverityWeights};
use crate::apportion::apportion;
use crate::binning::bin_crash_segments;
use crate::error::ApportionError;
use crate::intervals::{correct_aadt_intervals, AadtInterval, MilepostInterval, OverlapCorrection};
use crate::segment::{AadtAttributes, AadtSegment, CrashCounts, CrashSegment, RouteId, RouteSegment};

/// Configuration for the merge.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeConfig {
    /// Severity index weights. Default: 76.8 / 8.4 / 1.0
    pub severity_weights: SeverityWeights,

    /// Routes with at least this many AADT intervals are binned through an
    /// R-tree instead of a linear scan.
    /// Default: 64
    pub spatial_index_min_intervals: usize,

    /// Emit AADT rows (with no crash fields) for routes that have no crash
    /// data at all. Those routes are listed as unmatched either way.
    /// Default: false
    pub keep_routes_without_crash_data: bool,

    /// Keep a single fragment per (route, interval, crash start milepost).
    /// Default: true
    pub drop_duplicate_fragments: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            severity_weights: SeverityWeights::default(),
            spatial_index_min_intervals: 64,
            keep_routes_without_crash_data: false,
            drop_duplicate_fragments: true,
        }
    }
}

// ============================================================================
// Per-route Processing
// ============================================================================

/// How a route's crash data lined up with its AADT data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RouteStatus {
    /// At least one AADT interval received crash counts
    Matched,
    /// The crash layer has no segments for this route
    NoCrashData,
    /// Crash segments exist but none produced an aggregated interval
    NoCrashAfterBinning,
}

impl RouteStatus {
    pub fn is_unmatched(self) -> bool {
        !matches!(self, Self::Matched)
    }
}

/// Everything the pipeline produced for one route.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub route: RouteId,
    pub status: RouteStatus,
    pub intervals: Vec<AadtInterval>,
    pub aggregated: Vec<AggregatedInterval>,
    pub corrections: Vec<OverlapCorrection>,
    pub apportion_errors: Vec<ApportionError>,
    /// Crash segments that overlapped no AADT interval
    pub unbinned_crash_segments: usize,
    pub duplicate_fragments: usize,
}

/// Run correction, binning, apportionment and aggregation for one route.
///
/// `crashes` is `None` when the crash layer has no segments for the route.
pub fn process_route(
    route: &RouteId,
    aadt: Vec<AadtSegment>,
    crashes: Option<&[CrashSegment]>,
    config: &MergeConfig,
) -> RouteOutcome {
    let (intervals, corrections) = correct_aadt_intervals(aadt);

    let mut outcome = RouteOutcome {
        route: route.clone(),
        status: RouteStatus::NoCrashData,
        intervals,
        aggregated: Vec::new(),
        corrections,
        apportion_errors: Vec::new(),
        unbinned_crash_segments: 0,
        duplicate_fragments: 0,
    };

    let Some(crashes) = crashes.filter(|c| !c.is_empty()) else {
        debug!("[Merge] No crash data for route {}", route);
        return outcome;
    };

    let binned = bin_crash_segments(&outcome.intervals, crashes, config.spatial_index_min_intervals);
    outcome.unbinned_crash_segments = binned.unbinned.len();

    let mut seen: HashSet<(usize, u64)> = HashSet::new();
    let mut fragments = Vec::with_capacity(binned.bins.len());
    for bin in &binned.bins {
        if config.drop_duplicate_fragments && !seen.insert((bin.interval_index, bin.crash.start_mp.to_bits())) {
            outcome.duplicate_fragments += 1;
            continue;
        }
        match apportion(bin) {
            Ok(fragment) => fragments.push(fragment),
            Err(err) => outcome.apportion_errors.push(err),
        }
    }

    outcome.aggregated = aggregate_fragments(&fragments, &config.severity_weights);
    outcome.status = if outcome.aggregated.is_empty() {
        RouteStatus::NoCrashAfterBinning
    } else {
        RouteStatus::Matched
    };

    debug!(
        "[Merge] Route {}: {} intervals, {} crash segments, {} fragments, {} aggregated",
        route,
        outcome.intervals.len(),
        crashes.len(),
        fragments.len(),
        outcome.aggregated.len()
    );

    outcome
}

// ============================================================================
// Merged Output
// ============================================================================

/// One corrected AADT interval with its crash totals, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub route: RouteId,
    /// Start milepost of the AADT segment (also the interval's left bound)
    pub aadt_start_mp: f64,
    /// End milepost of the AADT segment before overlap correction
    pub aadt_end_mp: f64,
    /// Corrected AADT interval
    pub interval: MilepostInterval,
    pub interval_corrected: bool,
    pub aadt: f64,
    pub source: Option<String>,
    pub geometry: Option<LineString<f64>>,
    /// `None` when no crash fragment fell in this interval
    pub crash: Option<AggregatedInterval>,
}

impl MergedRow {
    fn from_interval(interval: AadtInterval, crash: Option<AggregatedInterval>) -> Self {
        let AadtInterval {
            segment,
            interval,
            corrected,
        } = interval;
        let RouteSegment {
            route,
            start_mp,
            end_mp,
            attributes,
            geometry,
        } = segment;
        Self {
            route,
            aadt_start_mp: start_mp,
            aadt_end_mp: end_mp,
            interval,
            interval_corrected: corrected,
            aadt: attributes.aadt,
            source: attributes.source,
            geometry,
            crash,
        }
    }

    /// Uncorrected AADT segment length.
    pub fn aadt_len(&self) -> f64 {
        self.aadt_end_mp - self.aadt_start_mp
    }

    /// Severity index, `None` without crash data or when it is undefined.
    pub fn severity_index(&self) -> Option<f64> {
        self.crash
            .as_ref()
            .map(|c| c.severity_index)
            .filter(|si| !si.is_nan())
    }

    /// Haversine length of the AADT geometry in miles, if any.
    pub fn geometry_len_mi(&self) -> Option<f64> {
        self.geometry.as_ref().map(crate::geo_utils::polyline_length_mi)
    }
}

/// Diagnostics collected over a whole merge.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub routes_processed: usize,
    pub overlap_corrections: Vec<OverlapCorrection>,
    pub apportion_errors: Vec<ApportionError>,
    pub unbinned_crash_segments: usize,
    pub duplicate_fragments: usize,
    /// Intervals left empty by overlap correction and left out of the rows
    pub empty_intervals: usize,
    /// AADT routes with no crash data, or none left after binning
    pub unmatched_routes: BTreeSet<RouteId>,
    /// Crash routes with no AADT data
    pub crash_only_routes: BTreeSet<RouteId>,
}

/// Output of [`merge_aadt_crash`].
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Merged table sorted by route, then interval start
    pub rows: Vec<MergedRow>,
    /// Every aggregated interval, sorted by route, then interval start
    pub aggregated: Vec<AggregatedInterval>,
    pub report: MergeReport,
}

impl MergeResult {
    pub fn unmatched_routes(&self) -> &BTreeSet<RouteId> {
        &self.report.unmatched_routes
    }
}

// ============================================================================
// Drivers
// ============================================================================

/// Partition segments by route, keeping input order within a route.
pub fn group_by_route<A>(segments: Vec<RouteSegment<A>>) -> BTreeMap<RouteId, Vec<RouteSegment<A>>> {
    let mut groups: BTreeMap<RouteId, Vec<RouteSegment<A>>> = BTreeMap::new();
    for segment in segments {
        groups.entry(segment.route.clone()).or_default().push(segment);
    }
    groups
}

/// Merge AADT and crash layers.
///
/// # Example
/// ```
/// use nc_crash_rebin::{merge_aadt_crash, AadtAttributes, CrashCounts, MergeConfig, RouteId, RouteSegment};
///
/// let route = RouteId::parse("10000040092").unwrap();
/// let aadt = vec![
///     RouteSegment::new(route.clone(), 0.0, 2.0, AadtAttributes::new(50000.0)).unwrap(),
///     RouteSegment::new(route.clone(), 2.0, 4.0, AadtAttributes::new(62000.0)).unwrap(),
/// ];
/// let crashes = vec![
///     RouteSegment::new(route.clone(), 1.0, 3.0, CrashCounts::new(2.0, 4.0, 10.0, 16.0)).unwrap(),
/// ];
///
/// let result = merge_aadt_crash(aadt, crashes, &MergeConfig::default());
/// assert_eq!(result.rows.len(), 2);
/// assert_eq!(result.rows[0].crash.as_ref().unwrap().counts.total, 8.0);
/// assert!(result.unmatched_routes().is_empty());
/// ```
pub fn merge_aadt_crash(aadt: Vec<AadtSegment>, crashes: Vec<CrashSegment>, config: &MergeConfig) -> MergeResult {
    let start = std::time::Instant::now();
    let (aadt_groups, crash_groups, crash_only) = partition(aadt, crashes);

    let outcomes: Vec<RouteOutcome> = aadt_groups
        .into_iter()
        .map(|(route, segments)| {
            let crashes = crash_groups.get(&route).map(Vec::as_slice);
            process_route(&route, segments, crashes, config)
        })
        .collect();

    let result = assemble(outcomes, crash_only, config);
    log_summary(&result, start.elapsed());
    result
}

/// Merge using parallel per-route processing.
///
/// Same output as [`merge_aadt_crash`]; routes are processed on the rayon
/// pool and joined after all of them finish.
#[cfg(feature = "parallel")]
pub fn merge_aadt_crash_parallel(
    aadt: Vec<AadtSegment>,
    crashes: Vec<CrashSegment>,
    config: &MergeConfig,
) -> MergeResult {
    use rayon::prelude::*;

    let start = std::time::Instant::now();
    let (aadt_groups, crash_groups, crash_only) = partition(aadt, crashes);
    let groups: Vec<(RouteId, Vec<AadtSegment>)> = aadt_groups.into_iter().collect();

    let outcomes: Vec<RouteOutcome> = groups
        .into_par_iter()
        .map(|(route, segments)| {
            let crashes = crash_groups.get(&route).map(Vec::as_slice);
            process_route(&route, segments, crashes, config)
        })
        .collect();

    let result = assemble(outcomes, crash_only, config);
    log_summary(&result, start.elapsed());
    result
}

type RouteGroups<A> = BTreeMap<RouteId, Vec<RouteSegment<A>>>;

fn partition(
    aadt: Vec<AadtSegment>,
    crashes: Vec<CrashSegment>,
) -> (RouteGroups<AadtAttributes>, RouteGroups<CrashCounts>, BTreeSet<RouteId>) {
    let aadt_groups = group_by_route(aadt);
    let crash_groups = group_by_route(crashes);
    let crash_only: BTreeSet<RouteId> = crash_groups
        .keys()
        .filter(|route| !aadt_groups.contains_key(*route))
        .cloned()
        .collect();
    (aadt_groups, crash_groups, crash_only)
}

/// Join every route's intervals to its aggregates and build the report.
fn assemble(outcomes: Vec<RouteOutcome>, crash_only: BTreeSet<RouteId>, config: &MergeConfig) -> MergeResult {
    let mut result = MergeResult::default();
    result.report.crash_only_routes = crash_only;

    for outcome in outcomes {
        let report = &mut result.report;
        report.routes_processed += 1;
        report.overlap_corrections.extend(outcome.corrections);
        report.apportion_errors.extend(outcome.apportion_errors);
        report.unbinned_crash_segments += outcome.unbinned_crash_segments;
        report.duplicate_fragments += outcome.duplicate_fragments;

        if outcome.status.is_unmatched() {
            report.unmatched_routes.insert(outcome.route.clone());
        }
        if outcome.status == RouteStatus::NoCrashData && !config.keep_routes_without_crash_data {
            continue;
        }

        let mut by_interval: HashMap<usize, AggregatedInterval> = outcome
            .aggregated
            .iter()
            .map(|agg| (agg.interval_index, agg.clone()))
            .collect();
        result.aggregated.extend(outcome.aggregated);

        for (index, interval) in outcome.intervals.into_iter().enumerate() {
            // A shared start milepost clips the earlier segment to [s, s)
            if interval.interval.is_empty() {
                report.empty_intervals += 1;
                continue;
            }
            let crash = by_interval.remove(&index);
            result.rows.push(MergedRow::from_interval(interval, crash));
        }
    }

    result.rows.sort_by(|a, b| {
        a.route
            .cmp(&b.route)
            .then(a.interval.left.total_cmp(&b.interval.left))
    });
    result.aggregated.sort_by(|a, b| {
        a.route
            .cmp(&b.route)
            .then(a.interval.left.total_cmp(&b.interval.left))
    });

    result
}

fn log_summary(result: &MergeResult, elapsed: std::time::Duration) {
    let report = &result.report;
    info!(
        "[Merge] Processed {} routes into {} rows ({} intervals with crashes) in {:?}",
        report.routes_processed,
        result.rows.len(),
        result.aggregated.len(),
        elapsed
    );
    info!(
        "[Merge] {} overlap corrections, {} unbinned crash segments, {} duplicate fragments dropped",
        report.overlap_corrections.len(),
        report.unbinned_crash_segments,
        report.duplicate_fragments
    );
    if report.empty_intervals > 0 {
        debug!("[Merge] {} empty AADT intervals left out of the rows", report.empty_intervals);
    }
    if !report.unmatched_routes.is_empty() {
        info!("[Merge] {} AADT routes without matched crash data", report.unmatched_routes.len());
    }
    if !report.crash_only_routes.is_empty() {
        info!("[Merge] {} crash routes without AADT data", report.crash_only_routes.len());
    }
    if !report.apportion_errors.is_empty() {
        warn!(
            "[Merge] {} crash/AADT pairs could not be apportioned and were excluded",
            report.apportion_errors.len()
        );
    }
}

// ============================================================================
// Missing-data Subsets
// ============================================================================

fn segments_on_routes<'a, A>(segments: &'a [RouteSegment<A>], routes: &BTreeSet<RouteId>) -> Vec<&'a RouteSegment<A>> {
    let mut subset: Vec<&RouteSegment<A>> = segments.iter().filter(|s| routes.contains(&s.route)).collect();
    subset.sort_by(|a, b| a.route.cmp(&b.route).then(a.start_mp.total_cmp(&b.start_mp)));
    subset
}

/// AADT segments on the given (typically unmatched) routes, sorted by route and milepost.
pub fn missing_aadt<'a>(aadt: &'a [AadtSegment], unmatched: &BTreeSet<RouteId>) -> Vec<&'a AadtSegment> {
    segments_on_routes(aadt, unmatched)
}

/// Crash segments on the given (typically unmatched) routes, sorted by route and milepost.
pub fn missing_crash<'a>(crashes: &'a [CrashSegment], unmatched: &BTreeSet<RouteId>) -> Vec<&'a CrashSegment> {
    segments_on_routes(crashes, unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(raw: &str) -> RouteId {
        RouteId::parse(raw).unwrap()
    }

    fn aadt(r: &str, start: f64, end: f64, volume: f64) -> AadtSegment {
        RouteSegment::new(route(r), start, end, AadtAttributes::new(volume)).unwrap()
    }

    fn crash(r: &str, start: f64, end: f64, counts: CrashCounts) -> CrashSegment {
        RouteSegment::new(route(r), start, end, counts).unwrap()
    }

    const I40: &str = "10000040092";
    const US70: &str = "20000070092";
    const NC54: &str = "30000054068";

    fn row_bounds(result: &MergeResult) -> Vec<(&str, f64, f64)> {
        result
            .rows
            .iter()
            .map(|r| (r.route.as_str(), r.interval.left, r.interval.right))
            .collect()
    }

    #[test]
    fn test_straddling_crash_split_across_intervals() {
        let result = merge_aadt_crash(
            vec![aadt(I40, 2.0, 4.0, 60000.0), aadt(I40, 0.0, 2.0, 50000.0)],
            vec![crash(I40, 1.0, 3.0, CrashCounts::new(2.0, 4.0, 10.0, 16.0))],
            &MergeConfig::default(),
        );

        assert_eq!(row_bounds(&result), vec![(I40, 0.0, 2.0), (I40, 2.0, 4.0)]);
        for row in &result.rows {
            let agg = row.crash.as_ref().unwrap();
            assert_eq!(agg.counts, CrashCounts::new(1.0, 2.0, 5.0, 8.0));
            assert_eq!(agg.seg_len_in_interval, 1.0);
            assert_eq!(agg.crash_rate_per_mile, 8.0);
        }
        assert!(result.unmatched_routes().is_empty());
    }

    #[test]
    fn test_interval_without_crashes_keeps_null_fields() {
        let result = merge_aadt_crash(
            vec![aadt(I40, 0.0, 2.0, 50000.0), aadt(I40, 2.0, 4.0, 60000.0)],
            vec![crash(I40, 0.5, 1.5, CrashCounts::new(0.0, 1.0, 3.0, 4.0))],
            &MergeConfig::default(),
        );
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows[0].crash.is_some());
        assert!(result.rows[1].crash.is_none());
        assert_eq!(result.rows[1].severity_index(), None);
        assert!(result.unmatched_routes().is_empty());
    }

    #[test]
    fn test_route_without_crash_data_is_unmatched() {
        let aadt_rows = vec![aadt(I40, 0.0, 1.0, 50000.0), aadt(US70, 0.0, 1.0, 12000.0)];
        let crashes = vec![crash(I40, 0.0, 1.0, CrashCounts::new(0.0, 0.0, 1.0, 1.0))];

        let result = merge_aadt_crash(aadt_rows.clone(), crashes.clone(), &MergeConfig::default());
        assert_eq!(row_bounds(&result), vec![(I40, 0.0, 1.0)]);
        assert!(result.unmatched_routes().contains(&route(US70)));

        let keep = MergeConfig {
            keep_routes_without_crash_data: true,
            ..MergeConfig::default()
        };
        let kept = merge_aadt_crash(aadt_rows, crashes, &keep);
        assert_eq!(row_bounds(&kept), vec![(I40, 0.0, 1.0), (US70, 0.0, 1.0)]);
        assert!(kept.rows[1].crash.is_none());
        assert!(kept.unmatched_routes().contains(&route(US70)));
    }

    #[test]
    fn test_route_with_no_binned_crashes_is_unmatched_but_kept() {
        let result = merge_aadt_crash(
            vec![aadt(US70, 0.0, 1.0, 12000.0), aadt(US70, 1.0, 2.0, 13000.0)],
            vec![crash(US70, 5.0, 6.0, CrashCounts::new(1.0, 1.0, 1.0, 3.0))],
            &MergeConfig::default(),
        );
        assert!(result.unmatched_routes().contains(&route(US70)));
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows.iter().all(|r| r.crash.is_none()));
        assert_eq!(result.report.unbinned_crash_segments, 1);
    }

    #[test]
    fn test_overlapping_aadt_corrected_before_binning() {
        let result = merge_aadt_crash(
            vec![aadt(I40, 0.0, 2.5, 50000.0), aadt(I40, 2.0, 4.0, 60000.0)],
            vec![crash(I40, 2.0, 2.5, CrashCounts::new(0.0, 0.0, 2.0, 2.0))],
            &MergeConfig::default(),
        );
        assert_eq!(row_bounds(&result), vec![(I40, 0.0, 2.0), (I40, 2.0, 4.0)]);
        assert_eq!(result.report.overlap_corrections.len(), 1);
        assert!(result.rows[0].interval_corrected);
        assert_eq!(result.rows[0].aadt_end_mp, 2.5);
        assert_eq!(result.rows[0].aadt_len(), 2.5);
        // Only the second interval receives the crash after clipping
        assert!(result.rows[0].crash.is_none());
        assert_eq!(result.rows[1].crash.as_ref().unwrap().counts.total, 2.0);
    }

    #[test]
    fn test_shared_start_keeps_correction_but_drops_empty_row() {
        let result = merge_aadt_crash(
            vec![aadt(I40, 0.0, 2.0, 50000.0), aadt(I40, 0.0, 1.0, 48000.0), aadt(I40, 2.0, 3.0, 52000.0)],
            vec![crash(I40, 0.0, 3.0, CrashCounts::new(0.0, 3.0, 3.0, 6.0))],
            &MergeConfig::default(),
        );
        assert_eq!(row_bounds(&result), vec![(I40, 0.0, 2.0), (I40, 2.0, 3.0)]);
        assert_eq!(result.report.empty_intervals, 1);
        assert_eq!(result.report.overlap_corrections.len(), 1);
        assert_eq!(result.report.overlap_corrections[0].corrected_end_mp, 0.0);

        // Every row can be rebuilt as a segment
        for row in &result.rows {
            assert!(RouteSegment::new(row.route.clone(), row.interval.left, row.interval.right, ()).is_ok());
        }
        let total: f64 = result.aggregated.iter().map(|a| a.counts.total).sum();
        assert!((total - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_geometry_carried_to_merged_rows() {
        let line = LineString::from(vec![(-78.70, 35.78), (-78.69, 35.78)]);
        let result = merge_aadt_crash(
            vec![
                aadt(I40, 0.0, 0.6, 50000.0).with_geometry(line.clone()),
                aadt(I40, 0.6, 1.2, 52000.0),
            ],
            vec![crash(I40, 0.0, 1.2, CrashCounts::new(0.0, 1.0, 2.0, 3.0))],
            &MergeConfig::default(),
        );

        assert_eq!(result.rows[0].geometry, Some(line));
        let len = result.rows[0].geometry_len_mi().unwrap();
        assert!((len - 0.56).abs() < 0.01, "got {}", len);
        assert!(result.rows[1].geometry.is_none());
        assert_eq!(result.rows[1].geometry_len_mi(), None);
    }

    #[test]
    fn test_duplicate_crash_start_counted_once() {
        let counts = CrashCounts::new(0.0, 0.0, 4.0, 4.0);
        let crashes = vec![crash(I40, 0.0, 1.0, counts), crash(I40, 0.0, 1.0, counts)];
        let aadt_rows = vec![aadt(I40, 0.0, 2.0, 50000.0)];

        let result = merge_aadt_crash(aadt_rows.clone(), crashes.clone(), &MergeConfig::default());
        assert_eq!(result.report.duplicate_fragments, 1);
        assert_eq!(result.rows[0].crash.as_ref().unwrap().counts.total, 4.0);

        let keep_all = MergeConfig {
            drop_duplicate_fragments: false,
            ..MergeConfig::default()
        };
        let result = merge_aadt_crash(aadt_rows, crashes, &keep_all);
        assert_eq!(result.rows[0].crash.as_ref().unwrap().counts.total, 8.0);
    }

    #[test]
    fn test_crash_only_routes_reported() {
        let result = merge_aadt_crash(
            vec![aadt(I40, 0.0, 1.0, 50000.0)],
            vec![
                crash(I40, 0.0, 1.0, CrashCounts::new(0.0, 0.0, 1.0, 1.0)),
                crash(NC54, 0.0, 1.0, CrashCounts::new(0.0, 0.0, 1.0, 1.0)),
            ],
            &MergeConfig::default(),
        );
        assert_eq!(result.report.crash_only_routes.len(), 1);
        assert!(result.report.crash_only_routes.contains(&route(NC54)));
    }

    #[test]
    fn test_output_sorted_by_route_and_milepost() {
        let result = merge_aadt_crash(
            vec![
                aadt(US70, 3.0, 4.0, 1.0),
                aadt(I40, 1.0, 2.0, 1.0),
                aadt(US70, 0.0, 3.0, 1.0),
                aadt(I40, 0.0, 1.0, 1.0),
            ],
            vec![
                crash(I40, 0.0, 2.0, CrashCounts::new(0.0, 0.0, 2.0, 2.0)),
                crash(US70, 0.0, 4.0, CrashCounts::new(0.0, 0.0, 4.0, 4.0)),
            ],
            &MergeConfig::default(),
        );
        assert_eq!(
            row_bounds(&result),
            vec![(I40, 0.0, 1.0), (I40, 1.0, 2.0), (US70, 0.0, 3.0), (US70, 3.0, 4.0)]
        );
        let aggregated: Vec<(&str, f64)> = result
            .aggregated
            .iter()
            .map(|a| (a.route.as_str(), a.interval.left))
            .collect();
        assert_eq!(aggregated, vec![(I40, 0.0), (I40, 1.0), (US70, 0.0), (US70, 3.0)]);
    }

    #[test]
    fn test_rtree_path_matches_scan_path() {
        let aadt_rows: Vec<AadtSegment> = (0..100)
            .map(|i| aadt(I40, i as f64, i as f64 + 1.0, 40000.0))
            .collect();
        let crashes: Vec<CrashSegment> = (0..40)
            .map(|i| crash(I40, i as f64 * 2.5, i as f64 * 2.5 + 1.75, CrashCounts::new(1.0, 2.0, 3.0, 6.0)))
            .collect();

        let scan = merge_aadt_crash(
            aadt_rows.clone(),
            crashes.clone(),
            &MergeConfig {
                spatial_index_min_intervals: usize::MAX,
                ..MergeConfig::default()
            },
        );
        let tree = merge_aadt_crash(
            aadt_rows,
            crashes,
            &MergeConfig {
                spatial_index_min_intervals: 1,
                ..MergeConfig::default()
            },
        );
        assert_eq!(scan.rows, tree.rows);

        let total: f64 = scan.aggregated.iter().map(|a| a.counts.total).sum();
        assert!((total - 40.0 * 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_subsets() {
        let aadt_rows = vec![
            aadt(US70, 1.0, 2.0, 1.0),
            aadt(I40, 0.0, 1.0, 1.0),
            aadt(US70, 0.0, 1.0, 1.0),
        ];
        let crashes = vec![crash(US70, 0.0, 1.0, CrashCounts::default())];
        let unmatched: BTreeSet<RouteId> = [route(US70)].into_iter().collect();

        let aadt_subset = missing_aadt(&aadt_rows, &unmatched);
        let starts: Vec<f64> = aadt_subset.iter().map(|s| s.start_mp).collect();
        assert_eq!(starts, vec![0.0, 1.0]);
        assert_eq!(missing_crash(&crashes, &unmatched).len(), 1);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let aadt_rows: Vec<AadtSegment> = [I40, US70, NC54]
            .iter()
            .flat_map(|r| (0..20).map(move |i| aadt(r, i as f64, i as f64 + 1.0, 10000.0)))
            .collect();
        let crashes: Vec<CrashSegment> = [I40, NC54]
            .iter()
            .flat_map(|r| (0..10).map(move |i| crash(r, i as f64 * 2.0 + 0.5, i as f64 * 2.0 + 1.5, CrashCounts::new(0.0, 1.0, 1.0, 2.0))))
            .collect();

        let sequential = merge_aadt_crash(aadt_rows.clone(), crashes.clone(), &MergeConfig::default());
        let parallel = merge_aadt_crash_parallel(aadt_rows, crashes, &MergeConfig::default());

        assert_eq!(sequential.rows, parallel.rows);
        assert_eq!(sequential.aggregated, parallel.aggregated);
        assert_eq!(sequential.report.unmatched_routes, parallel.report.unmatched_routes);
    }
}
