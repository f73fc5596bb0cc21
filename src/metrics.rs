//! # Derived Metrics
//!
//! Turns the merged table into composite incident-factor scores:
//! - severity index scaled into a narrow multiplier range
//! - incident factor from crash rate and AADT
//! - national-importance category from NHS and corridor lists
//! - detour, growth and seasonal factors joined by interval
//!
//! `adjusted_incident_factor = incident_factor * (1 + si_fac * 0.25) * (1 + detour_fac * 0.25)`

use std::collections::{HashMap, HashSet};

use log::info;
use ordered_float::OrderedFloat;

use crate::intervals::MilepostInterval;
use crate::merge::MergedRow;
use crate::segment::{CrashCounts, RouteClass, RouteId};

// ============================================================================
// Severity Scaling
// ============================================================================

/// Configuration for severity-index scaling.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeverityScalingConfig {
    /// Quantile above which values are capped. Default: 0.9
    pub percentile: f64,

    /// Lower bound of the scaled range. Default: 1.0
    pub range_min: f64,

    /// Upper bound of the scaled range, also the capped value. Default: 1.2
    pub range_max: f64,

    /// Value substituted for a missing severity index before the percentile
    /// is taken. `None` leaves missing rows out of the computation and their
    /// scaled value missing.
    /// Default: Some(1.0)
    pub fill_missing: Option<f64>,
}

impl Default for SeverityScalingConfig {
    fn default() -> Self {
        Self {
            percentile: 0.9,
            range_min: 1.0,
            range_max: 1.2,
            fill_missing: Some(1.0),
        }
    }
}

/// Quantile with linear interpolation between closest ranks.
///
/// `NaN` values are ignored. Returns `None` when nothing is left.
///
/// # Example
/// ```
/// use nc_crash_rebin::metrics::percentile;
///
/// let p90 = percentile(&[0.5, 1.0, 1.5, 2.0, 10.0], 0.9).unwrap();
/// assert!((p90 - 6.8).abs() < 1e-9);
/// ```
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Map `value` from `[min, max]` onto `[range_min, range_max]`.
///
/// A zero-width source range maps everything to `range_min`.
pub fn min_max_scale(value: f64, min: f64, max: f64, range_min: f64, range_max: f64) -> f64 {
    let span = max - min;
    if span == 0.0 {
        return range_min;
    }
    range_min + (value - min) / span * (range_max - range_min)
}

/// Scaled severity for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaledSeverity {
    /// Severity index after the missing-value fill
    pub severity_index: Option<f64>,
    /// Scaled value in `[range_min, range_max]`
    pub scaled: Option<f64>,
    /// True when the severity index was missing before the fill
    pub was_missing: bool,
    /// True when the value exceeded the percentile and was capped
    pub capped: bool,
}

/// Output of [`scale_severity_index`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityScaling {
    /// Cap threshold, `None` when no value was available
    pub threshold: Option<f64>,
    /// One entry per input value, in input order
    pub values: Vec<ScaledSeverity>,
}

/// Scale severity indices into `[range_min, range_max]`.
///
/// Missing values (`None` or `NaN`) are filled first. Values above the
/// percentile are set to `range_max`; the rest are min-max scaled using the
/// min and max of that lower partition.
///
/// # Example
/// ```
/// use nc_crash_rebin::metrics::{scale_severity_index, SeverityScalingConfig};
///
/// let input = [Some(0.5), Some(1.0), Some(1.5), Some(2.0), Some(10.0)];
/// let scaling = scale_severity_index(&input, &SeverityScalingConfig::default());
///
/// assert_eq!(scaling.values[0].scaled, Some(1.0));
/// assert_eq!(scaling.values[3].scaled, Some(1.2));
/// assert!(scaling.values[4].capped);
/// assert_eq!(scaling.values[4].scaled, Some(1.2));
/// ```
pub fn scale_severity_index(values: &[Option<f64>], config: &SeverityScalingConfig) -> SeverityScaling {
    let filled: Vec<(Option<f64>, bool)> = values
        .iter()
        .map(|v| match v.filter(|si| !si.is_nan()) {
            Some(si) => (Some(si), false),
            None => (config.fill_missing, true),
        })
        .collect();

    let present: Vec<f64> = filled.iter().filter_map(|(v, _)| *v).collect();
    let threshold = percentile(&present, config.percentile);

    let (min, max) = match threshold {
        Some(cap) => present
            .iter()
            .filter(|v| **v <= cap)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v))),
        None => (f64::NAN, f64::NAN),
    };

    let scaled: Vec<ScaledSeverity> = filled
        .into_iter()
        .map(|(severity_index, was_missing)| {
            let (scaled, capped) = match (severity_index, threshold) {
                (Some(si), Some(cap)) if si > cap => (Some(config.range_max), true),
                (Some(si), Some(_)) => (
                    Some(min_max_scale(si, min, max, config.range_min, config.range_max)),
                    false,
                ),
                _ => (None, false),
            };
            ScaledSeverity {
                severity_index,
                scaled,
                was_missing,
                capped,
            }
        })
        .collect();

    info!(
        "[Severity] Scaled {} values: threshold {:?}, {} capped, {} filled",
        scaled.len(),
        threshold,
        scaled.iter().filter(|s| s.capped).count(),
        scaled.iter().filter(|s| s.was_missing).count()
    );

    SeverityScaling {
        threshold,
        values: scaled,
    }
}

// ============================================================================
// Incident Factor
// ============================================================================

/// Configuration for the incident-factor formulas.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IncidentFactorConfig {
    /// Years of crash history in the counts. Default: 5
    pub years: f64,

    /// AADT normalizer. Default: 100000
    pub aadt_divisor: f64,

    /// Weight of the scaled severity in the adjusted factor. Default: 0.25
    pub severity_weight: f64,

    /// Weight of the detour score in the adjusted factor. Default: 0.25
    pub detour_weight: f64,
}

impl Default for IncidentFactorConfig {
    fn default() -> Self {
        Self {
            years: 5.0,
            aadt_divisor: 100_000.0,
            severity_weight: 0.25,
            detour_weight: 0.25,
        }
    }
}

/// Crashes per mile per year. `NaN` for a zero length or zero years.
pub fn crash_rate_per_mile_per_year(total: f64, length_mi: f64, years: f64) -> f64 {
    if length_mi == 0.0 || years == 0.0 {
        return f64::NAN;
    }
    total / length_mi / years
}

/// `rate * aadt / aadt_divisor`
pub fn incident_factor(rate_per_mile_per_year: f64, aadt: f64, config: &IncidentFactorConfig) -> f64 {
    rate_per_mile_per_year * aadt / config.aadt_divisor
}

/// Incident factor adjusted for severity and detour impact.
///
/// A missing incident factor counts as 0.
///
/// # Example
/// ```
/// use nc_crash_rebin::metrics::{adjusted_incident_factor, IncidentFactorConfig};
///
/// let config = IncidentFactorConfig::default();
/// let adjusted = adjusted_incident_factor(Some(2.0), 1.2, 1.0, &config);
/// assert!((adjusted - 2.0 * 1.3 * 1.25).abs() < 1e-12);
/// assert_eq!(adjusted_incident_factor(None, 1.2, 1.0, &config), 0.0);
/// ```
pub fn adjusted_incident_factor(
    incident_factor: Option<f64>,
    severity_factor: f64,
    detour_factor: f64,
    config: &IncidentFactorConfig,
) -> f64 {
    let base = incident_factor.filter(|v| !v.is_nan()).unwrap_or(0.0);
    base * (1.0 + severity_factor * config.severity_weight) * (1.0 + detour_factor * config.detour_weight)
}

// ============================================================================
// National Importance
// ============================================================================

/// National-importance category of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NationalImportance {
    /// On the National Highway System
    Nhs,
    /// On the Strategic Transportation Corridor list but not NHS
    StcButNotNhs,
    Other,
}

impl NationalImportance {
    pub fn factor(self) -> f64 {
        match self {
            Self::Nhs => 1.2,
            Self::StcButNotNhs => 1.1,
            Self::Other => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nhs => "nhs",
            Self::StcButNotNhs => "stc_but_not_nhs",
            Self::Other => "other",
        }
    }
}

/// NC Strategic Transportation Corridors as (class, route number).
pub fn strategic_transportation_corridors() -> Vec<(RouteClass, u32)> {
    use RouteClass::{Interstate, NcRoute, UsRoute};
    vec![
        (UsRoute, 74),
        (UsRoute, 441),
        (Interstate, 26),
        (UsRoute, 23),
        (UsRoute, 321),
        (UsRoute, 421),
        (Interstate, 73),
        (Interstate, 77),
        (Interstate, 74),
        (Interstate, 85),
        (Interstate, 285),
        (UsRoute, 29),
        (NcRoute, 87),
        (UsRoute, 1),
        (Interstate, 495),
        (UsRoute, 64),
        (UsRoute, 13),
        (UsRoute, 17),
        (UsRoute, 70),
        (Interstate, 40),
        (NcRoute, 49),
        (Interstate, 795),
        (UsRoute, 117),
        (Interstate, 95),
        (UsRoute, 264),
        (UsRoute, 401),
        (NcRoute, 24),
        (UsRoute, 258),
        (NcRoute, 11),
        (UsRoute, 158),
    ]
}

/// Route class + number membership in the NHS and corridor lists.
#[derive(Debug, Clone, Default)]
pub struct NationalImportanceLookup {
    nhs: HashSet<(RouteClass, u32)>,
    stc: HashSet<(RouteClass, u32)>,
}

impl NationalImportanceLookup {
    pub fn new(
        nhs: impl IntoIterator<Item = (RouteClass, u32)>,
        stc: impl IntoIterator<Item = (RouteClass, u32)>,
    ) -> Self {
        Self {
            nhs: nhs.into_iter().collect(),
            stc: stc.into_iter().collect(),
        }
    }

    /// Lookup with the given NHS routes and the built-in corridor list.
    pub fn with_default_corridors(nhs: impl IntoIterator<Item = (RouteClass, u32)>) -> Self {
        Self::new(nhs, strategic_transportation_corridors())
    }

    pub fn category(&self, route: &RouteId) -> NationalImportance {
        let Some(class) = route.class() else {
            return NationalImportance::Other;
        };
        let key = (class, route.number());
        if self.nhs.contains(&key) {
            NationalImportance::Nhs
        } else if self.stc.contains(&key) {
            NationalImportance::StcButNotNhs
        } else {
            NationalImportance::Other
        }
    }
}

/// Whether an interval belongs on the statewide map.
pub fn display_in_map(class: Option<RouteClass>, importance: NationalImportance) -> bool {
    matches!(class, Some(RouteClass::Interstate | RouteClass::UsRoute))
        || matches!(importance, NationalImportance::Nhs | NationalImportance::StcButNotNhs)
}

// ============================================================================
// External Factors
// ============================================================================

/// Factors computed by other analyses for one AADT interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternalFactor {
    /// Normalized detour impact score
    pub detour: Option<f64>,
    pub growth: Option<f64>,
    pub seasonal: Option<f64>,
}

/// External factors keyed by (route, AADT interval left milepost).
#[derive(Debug, Clone, Default)]
pub struct ExternalFactors {
    by_interval: HashMap<(RouteId, OrderedFloat<f64>), ExternalFactor>,
}

impl ExternalFactors {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, route: RouteId, interval_left: f64) -> &mut ExternalFactor {
        self.by_interval
            .entry((route, OrderedFloat(interval_left)))
            .or_default()
    }

    pub fn insert_detour(&mut self, route: RouteId, interval_left: f64, score: f64) {
        self.entry(route, interval_left).detour = Some(score);
    }

    pub fn insert_growth(&mut self, route: RouteId, interval_left: f64, factor: f64) {
        self.entry(route, interval_left).growth = Some(factor);
    }

    pub fn insert_seasonal(&mut self, route: RouteId, interval_left: f64, factor: f64) {
        self.entry(route, interval_left).seasonal = Some(factor);
    }

    pub fn get(&self, route: &RouteId, interval_left: f64) -> ExternalFactor {
        self.by_interval
            .get(&(route.clone(), OrderedFloat(interval_left)))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_interval.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_interval.is_empty()
    }
}

// ============================================================================
// Composite Table
// ============================================================================

/// One interval of the composite incident-factor table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IncidentFactorRow {
    pub route: RouteId,
    pub interval: MilepostInterval,
    /// Uncorrected AADT segment length
    pub aadt_len: f64,
    pub aadt: f64,
    pub source: Option<String>,
    pub counts: Option<CrashCounts>,
    pub seg_len_in_interval: Option<f64>,
    pub crash_rate_per_mile_per_year: Option<f64>,
    pub incident_factor: Option<f64>,
    pub severity: ScaledSeverity,
    pub severity_threshold: Option<f64>,
    pub external: ExternalFactor,
    pub national_importance: NationalImportance,
    pub display_in_map: bool,
    /// `None` when the scaled severity or the detour score is missing
    pub adjusted_incident_factor: Option<f64>,
}

impl IncidentFactorRow {
    pub fn national_importance_factor(&self) -> f64 {
        self.national_importance.factor()
    }
}

/// Build the composite table from merged rows.
pub fn compose_incident_factors(
    rows: &[MergedRow],
    lookup: &NationalImportanceLookup,
    external: &ExternalFactors,
    scaling: &SeverityScalingConfig,
    config: &IncidentFactorConfig,
) -> Vec<IncidentFactorRow> {
    let severities: Vec<Option<f64>> = rows.iter().map(MergedRow::severity_index).collect();
    let SeverityScaling { threshold, values } = scale_severity_index(&severities, scaling);

    let composite: Vec<IncidentFactorRow> = rows
        .iter()
        .zip(values)
        .map(|(row, severity)| {
            let crash = row.crash.as_ref();
            let rate = crash.map(|c| crash_rate_per_mile_per_year(c.counts.total, c.seg_len_in_interval, config.years));
            let inc_fac = rate.map(|r| incident_factor(r, row.aadt, config));
            let factors = external.get(&row.route, row.interval.left);
            let importance = lookup.category(&row.route);
            let adjusted = severity
                .scaled
                .zip(factors.detour)
                .map(|(si_fac, detour_fac)| adjusted_incident_factor(inc_fac, si_fac, detour_fac, config));

            IncidentFactorRow {
                route: row.route.clone(),
                interval: row.interval,
                aadt_len: row.aadt_len(),
                aadt: row.aadt,
                source: row.source.clone(),
                counts: crash.map(|c| c.counts),
                seg_len_in_interval: crash.map(|c| c.seg_len_in_interval),
                crash_rate_per_mile_per_year: rate,
                incident_factor: inc_fac,
                severity,
                severity_threshold: threshold,
                external: factors,
                national_importance: importance,
                display_in_map: display_in_map(row.route.class(), importance),
                adjusted_incident_factor: adjusted,
            }
        })
        .collect();

    info!(
        "[Metrics] Composed {} rows, {} with detour scores, {} shown on map",
        composite.len(),
        composite.iter().filter(|r| r.external.detour.is_some()).count(),
        composite.iter().filter(|r| r.display_in_map).count()
    );

    composite
}
