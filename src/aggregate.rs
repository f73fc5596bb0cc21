//! # Aggregator
//!
//! Sums apportioned crash fragments per (route, AADT interval) and derives the
//! severity index and crash rate for each interval.

use std::collections::BTreeMap;

use crate::apportion::ApportionedFragment;
use crate::intervals::MilepostInterval;
use crate::segment::{CrashCounts, RouteId};

/// Weights of the severity index.
///
/// `severity_index = (ka * KA + bc * BC + pdo * PDO) / total`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeverityWeights {
    /// Default: 76.8
    pub ka: f64,
    /// Default: 8.4
    pub bc: f64,
    /// Default: 1.0
    pub pdo: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            ka: 76.8,
            bc: 8.4,
            pdo: 1.0,
        }
    }
}

/// Weighted severity per crash. `NaN` when there are no crashes.
///
/// # Example
/// ```
/// use nc_crash_rebin::{severity_index, CrashCounts, SeverityWeights};
///
/// let si = severity_index(&CrashCounts::new(1.0, 0.0, 0.0, 2.0), &SeverityWeights::default());
/// assert_eq!(si, 38.4);
/// assert!(severity_index(&CrashCounts::default(), &SeverityWeights::default()).is_nan());
/// ```
pub fn severity_index(counts: &CrashCounts, weights: &SeverityWeights) -> f64 {
    if counts.total == 0.0 {
        return f64::NAN;
    }
    (weights.ka * counts.ka + weights.bc * counts.bc + weights.pdo * counts.pdo) / counts.total
}

/// Crashes per mile. `NaN` for a zero length.
pub fn crash_rate_per_mile(total: f64, length_mi: f64) -> f64 {
    if length_mi == 0.0 {
        return f64::NAN;
    }
    total / length_mi
}

/// Crash totals for one AADT interval.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AggregatedInterval {
    pub route: RouteId,
    pub interval_index: usize,
    pub interval: MilepostInterval,
    /// Sum of apportioned counts
    pub counts: CrashCounts,
    /// Smallest start milepost among contributing crash segments
    pub crash_start_mp: f64,
    /// Largest end milepost among contributing crash segments
    pub crash_end_mp: f64,
    /// Sum of the full lengths of contributing crash segments
    pub crash_len_sum: f64,
    /// Sum of the apportioned lengths inside the interval
    pub seg_len_in_interval: f64,
    pub fragment_count: usize,
    pub severity_index: f64,
    pub crash_rate_per_mile: f64,
}

/// Group fragments by (route, AADT interval) and reduce them.
///
/// Counts, full crash lengths and apportioned lengths are summed; crash
/// bounds take the min start and max end; interval bounds come from the first
/// fragment of each group (all fragments of a group share them). Output is
/// ordered by route, then interval position.
pub fn aggregate_fragments(fragments: &[ApportionedFragment], weights: &SeverityWeights) -> Vec<AggregatedInterval> {
    let mut groups: BTreeMap<(&RouteId, usize), AggregatedInterval> = BTreeMap::new();

    for fragment in fragments {
        let entry = groups
            .entry((&fragment.route, fragment.interval_index))
            .or_insert_with(|| AggregatedInterval {
                route: fragment.route.clone(),
                interval_index: fragment.interval_index,
                interval: fragment.interval,
                counts: CrashCounts::default(),
                crash_start_mp: f64::INFINITY,
                crash_end_mp: f64::NEG_INFINITY,
                crash_len_sum: 0.0,
                seg_len_in_interval: 0.0,
                fragment_count: 0,
                severity_index: f64::NAN,
                crash_rate_per_mile: f64::NAN,
            });

        entry.counts += fragment.counts;
        entry.crash_start_mp = entry.crash_start_mp.min(fragment.crash_start_mp);
        entry.crash_end_mp = entry.crash_end_mp.max(fragment.crash_end_mp);
        entry.crash_len_sum += fragment.crash_len();
        entry.seg_len_in_interval += fragment.seg_len_in_interval;
        entry.fragment_count += 1;
    }

    groups
        .into_values()
        .map(|mut agg| {
            agg.severity_index = severity_index(&agg.counts, weights);
            agg.crash_rate_per_mile = crash_rate_per_mile(agg.counts.total, agg.seg_len_in_interval);
            agg
        })
        .collect()
}
