//! # County Roll-up
//!
//! Summarizes the composite table per (county, route class, route number) so
//! interval-level results can be checked against county-level crash reports.
//! Only qualifier-0 (mainline) routes are included.

use std::collections::BTreeMap;

use log::info;

use crate::aggregate::{severity_index, SeverityWeights};
use crate::metrics::{crash_rate_per_mile_per_year, incident_factor, IncidentFactorConfig, IncidentFactorRow};
use crate::segment::{CrashCounts, RouteClass};

/// One county's totals for one signed route.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CountyRollup {
    pub county: u16,
    pub class_code: u8,
    pub route_number: u32,
    pub interval_count: usize,
    pub counts: CrashCounts,
    /// Sum of apportioned crash lengths
    pub seg_len_in_interval: f64,
    /// Sum of uncorrected AADT segment lengths
    pub aadt_len: f64,
    pub mean_aadt: f64,
    /// Mean of the interval incident factors, `NaN` when none are defined
    pub mean_incident_factor: f64,
    /// Mean of the scaled severities, `NaN` when none are defined
    pub mean_severity_factor: f64,
    pub total_per_year: f64,
    pub crash_rate_per_mile_per_year: f64,
    /// Incident factor recomputed from the county totals
    pub incident_factor: f64,
    /// Severity index recomputed from the county totals
    pub severity_index: f64,
}

impl CountyRollup {
    pub fn class(&self) -> Option<RouteClass> {
        RouteClass::from_code(self.class_code)
    }

    /// Signed route name, e.g. `I-40`.
    pub fn route_label(&self) -> String {
        match self.class() {
            Some(class) => format!("{}-{}", class.abbreviation(), self.route_number),
            None => format!("{}-{}", self.class_code, self.route_number),
        }
    }
}

#[derive(Default)]
struct Accumulator {
    interval_count: usize,
    counts: CrashCounts,
    seg_len_in_interval: f64,
    aadt_len: f64,
    aadt_sum: f64,
    incident_factors: Vec<f64>,
    severity_factors: Vec<f64>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Roll composite rows up to county level.
///
/// Intervals without crash data add zero counts and zero crash length but
/// still count toward the AADT mean and AADT length. Output is ordered by
/// county, class, route number.
pub fn rollup_by_county(
    rows: &[IncidentFactorRow],
    weights: &SeverityWeights,
    config: &IncidentFactorConfig,
) -> Vec<CountyRollup> {
    let mut groups: BTreeMap<(u16, u8, u32), Accumulator> = BTreeMap::new();

    for row in rows.iter().filter(|r| r.route.qualifier() == 0) {
        let acc = groups
            .entry((row.route.county(), row.route.class_code(), row.route.number()))
            .or_default();
        acc.interval_count += 1;
        if let Some(counts) = row.counts {
            acc.counts += counts;
        }
        acc.seg_len_in_interval += row.seg_len_in_interval.unwrap_or(0.0);
        acc.aadt_len += row.aadt_len;
        acc.aadt_sum += row.aadt;
        acc.incident_factors
            .extend(row.incident_factor.filter(|v| !v.is_nan()));
        acc.severity_factors.extend(row.severity.scaled);
    }

    let rollups: Vec<CountyRollup> = groups
        .into_iter()
        .map(|((county, class_code, route_number), acc)| {
            let mean_aadt = acc.aadt_sum / acc.interval_count as f64;
            let rate = crash_rate_per_mile_per_year(acc.counts.total, acc.seg_len_in_interval, config.years);
            CountyRollup {
                county,
                class_code,
                route_number,
                interval_count: acc.interval_count,
                counts: acc.counts,
                seg_len_in_interval: acc.seg_len_in_interval,
                aadt_len: acc.aadt_len,
                mean_aadt,
                mean_incident_factor: mean(&acc.incident_factors),
                mean_severity_factor: mean(&acc.severity_factors),
                total_per_year: acc.counts.total / config.years,
                crash_rate_per_mile_per_year: rate,
                incident_factor: incident_factor(rate, mean_aadt, config),
                severity_index: severity_index(&acc.counts, weights),
            }
        })
        .collect();

    info!("[County] Rolled {} intervals into {} county routes", rows.len(), rollups.len());
    rollups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::MilepostInterval;
    use crate::metrics::{ExternalFactor, NationalImportance, ScaledSeverity};
    use crate::segment::RouteId;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn row(raw: &str, aadt: f64, counts: Option<CrashCounts>, seg_len: Option<f64>, inc_fac: Option<f64>) -> IncidentFactorRow {
        IncidentFactorRow {
            route: RouteId::parse(raw).unwrap(),
            interval: MilepostInterval::new(0.0, 1.0),
            aadt_len: 1.0,
            aadt,
            source: None,
            counts,
            seg_len_in_interval: seg_len,
            crash_rate_per_mile_per_year: None,
            incident_factor: inc_fac,
            severity: ScaledSeverity {
                severity_index: Some(1.0),
                scaled: Some(1.1),
                was_missing: counts.is_none(),
                capped: false,
            },
            severity_threshold: None,
            external: ExternalFactor::default(),
            national_importance: NationalImportance::Other,
            display_in_map: true,
            adjusted_incident_factor: None,
        }
    }

    #[test]
    fn test_rollup_sums_and_means() {
        let rows = vec![
            row("10000040092", 40_000.0, Some(CrashCounts::new(1.0, 2.0, 7.0, 10.0)), Some(1.0), Some(0.8)),
            row("10000040092", 60_000.0, Some(CrashCounts::new(0.0, 1.0, 9.0, 10.0)), Some(1.0), Some(1.2)),
            row("10000040092", 50_000.0, None, None, None),
        ];
        let rollups = rollup_by_county(&rows, &SeverityWeights::default(), &IncidentFactorConfig::default());

        assert_eq!(rollups.len(), 1);
        let r = &rollups[0];
        assert_eq!(r.county, 92);
        assert_eq!(r.route_label(), "I-40");
        assert_eq!(r.interval_count, 3);
        assert_eq!(r.counts, CrashCounts::new(1.0, 3.0, 16.0, 20.0));
        assert_eq!(r.seg_len_in_interval, 2.0);
        assert_eq!(r.aadt_len, 3.0);
        assert_eq!(r.mean_aadt, 50_000.0);
        assert!(approx_eq(r.mean_incident_factor, 1.0));
        assert_eq!(r.total_per_year, 4.0);
        assert_eq!(r.crash_rate_per_mile_per_year, 2.0);
        assert!(approx_eq(r.incident_factor, 1.0));
        let expected_si = (76.8 + 8.4 * 3.0 + 16.0) / 20.0;
        assert!(approx_eq(r.severity_index, expected_si));
    }

    #[test]
    fn test_grouped_by_county_and_route_mainline_only() {
        let counts = Some(CrashCounts::new(0.0, 0.0, 1.0, 1.0));
        let rows = vec![
            row("20000070092", 1.0, counts, Some(1.0), None),
            row("20000070001", 1.0, counts, Some(1.0), None),
            row("10000040092", 1.0, counts, Some(1.0), None),
            // Qualifier 1 is excluded
            row("21000070092", 1.0, counts, Some(1.0), None),
        ];
        let rollups = rollup_by_county(&rows, &SeverityWeights::default(), &IncidentFactorConfig::default());
        let keys: Vec<(u16, String)> = rollups.iter().map(|r| (r.county, r.route_label())).collect();
        assert_eq!(
            keys,
            vec![(1, "US-70".to_string()), (92, "I-40".to_string()), (92, "US-70".to_string())]
        );
        assert!(rollups[0].mean_incident_factor.is_nan());
    }
}
