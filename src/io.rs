//! # CSV Input and Output
//!
//! Readers for raw AADT and crash tables and writers for the merged table,
//! the composite incident-factor table and the unmatched-route list.
//!
//! Input fields are read as text; validation happens in
//! [`crate::parse_aadt_records`] and [`crate::parse_crash_records`].
//! Undefined values (`NaN`) are written as empty fields.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::merge::MergedRow;
use crate::metrics::IncidentFactorRow;
use crate::segment::{RawAadtRecord, RawCrashRecord, RouteId};

/// Errors reading or writing tables.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("unable to open file: {0}")]
    File(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

fn finite(value: f64) -> Option<f64> {
    Some(value).filter(|v| v.is_finite())
}

// ============================================================================
// Readers
// ============================================================================

fn read_records<T, R>(reader: R) -> Result<Vec<T>, IoError>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for row in csv_reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Read raw AADT rows from CSV text with a header line.
pub fn read_aadt_csv<R: Read>(reader: R) -> Result<Vec<RawAadtRecord>, IoError> {
    let records = read_records(reader)?;
    info!("[Ingest] Read {} AADT rows", records.len());
    Ok(records)
}

/// Read raw crash rows from CSV text with a header line.
pub fn read_crash_csv<R: Read>(reader: R) -> Result<Vec<RawCrashRecord>, IoError> {
    let records = read_records(reader)?;
    info!("[Ingest] Read {} crash rows", records.len());
    Ok(records)
}

/// Read raw AADT rows from a CSV file.
pub fn read_aadt_csv_path(path: impl AsRef<Path>) -> Result<Vec<RawAadtRecord>, IoError> {
    read_aadt_csv(File::open(path)?)
}

/// Read raw crash rows from a CSV file.
pub fn read_crash_csv_path(path: impl AsRef<Path>) -> Result<Vec<RawCrashRecord>, IoError> {
    read_crash_csv(File::open(path)?)
}

// ============================================================================
// Writers
// ============================================================================

#[derive(Debug, Serialize)]
struct MergedCsvRow<'a> {
    route_id: &'a str,
    aadt_start_mp: f64,
    aadt_end_mp: f64,
    aadt_interval_left: f64,
    aadt_interval_right: f64,
    interval_corrected: bool,
    st_end_diff_aadt: f64,
    aadt: f64,
    source: Option<&'a str>,
    st_mp_pt_crash: Option<f64>,
    end_mp_pt_crash: Option<f64>,
    st_end_diff_crash: Option<f64>,
    seg_len_in_interval: Option<f64>,
    ka_cnt: Option<f64>,
    bc_cnt: Option<f64>,
    pdo_cnt: Option<f64>,
    total_cnt: Option<f64>,
    severity_index: Option<f64>,
    crash_rate_per_mile: Option<f64>,
    shape_len_mi: Option<f64>,
}

impl<'a> From<&'a MergedRow> for MergedCsvRow<'a> {
    fn from(row: &'a MergedRow) -> Self {
        let crash = row.crash.as_ref();
        Self {
            route_id: row.route.as_str(),
            aadt_start_mp: row.aadt_start_mp,
            aadt_end_mp: row.aadt_end_mp,
            aadt_interval_left: row.interval.left,
            aadt_interval_right: row.interval.right,
            interval_corrected: row.interval_corrected,
            st_end_diff_aadt: row.aadt_len(),
            aadt: row.aadt,
            source: row.source.as_deref(),
            st_mp_pt_crash: crash.map(|c| c.crash_start_mp),
            end_mp_pt_crash: crash.map(|c| c.crash_end_mp),
            st_end_diff_crash: crash.map(|c| c.crash_len_sum),
            seg_len_in_interval: crash.map(|c| c.seg_len_in_interval),
            ka_cnt: crash.map(|c| c.counts.ka),
            bc_cnt: crash.map(|c| c.counts.bc),
            pdo_cnt: crash.map(|c| c.counts.pdo),
            total_cnt: crash.map(|c| c.counts.total),
            severity_index: crash.and_then(|c| finite(c.severity_index)),
            crash_rate_per_mile: crash.and_then(|c| finite(c.crash_rate_per_mile)),
            shape_len_mi: row.geometry_len_mi(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IncidentFactorCsvRow<'a> {
    route_id: &'a str,
    route_class: Option<&'static str>,
    route_qual: u8,
    route_inventory: u8,
    route_county: u16,
    route_no: u32,
    aadt_interval_left: f64,
    aadt_interval_right: f64,
    st_end_diff_aadt: f64,
    seg_len_in_interval: Option<f64>,
    aadt: f64,
    source: Option<&'a str>,
    ka_cnt: Option<f64>,
    bc_cnt: Option<f64>,
    pdo_cnt: Option<f64>,
    total_cnt: Option<f64>,
    crash_rate_per_mile_per_year: Option<f64>,
    inc_fac: Option<f64>,
    severity_index: Option<f64>,
    severity_index_q90: Option<f64>,
    si_fac: Option<f64>,
    si_was_missing: bool,
    detour_fac: Option<f64>,
    growth_fac: Option<f64>,
    seasonal_fac: Option<f64>,
    nat_imp_cat: &'static str,
    nat_imp_fac: f64,
    display_in_map: bool,
    adj_inc_fac: Option<f64>,
}

impl<'a> From<&'a IncidentFactorRow> for IncidentFactorCsvRow<'a> {
    fn from(row: &'a IncidentFactorRow) -> Self {
        Self {
            route_id: row.route.as_str(),
            route_class: row.route.class().map(|c| c.label()),
            route_qual: row.route.qualifier(),
            route_inventory: row.route.inventory(),
            route_county: row.route.county(),
            route_no: row.route.number(),
            aadt_interval_left: row.interval.left,
            aadt_interval_right: row.interval.right,
            st_end_diff_aadt: row.aadt_len,
            seg_len_in_interval: row.seg_len_in_interval,
            aadt: row.aadt,
            source: row.source.as_deref(),
            ka_cnt: row.counts.map(|c| c.ka),
            bc_cnt: row.counts.map(|c| c.bc),
            pdo_cnt: row.counts.map(|c| c.pdo),
            total_cnt: row.counts.map(|c| c.total),
            crash_rate_per_mile_per_year: row.crash_rate_per_mile_per_year.and_then(finite),
            inc_fac: row.incident_factor.and_then(finite),
            severity_index: row.severity.severity_index.and_then(finite),
            severity_index_q90: row.severity_threshold,
            si_fac: row.severity.scaled,
            si_was_missing: row.severity.was_missing,
            detour_fac: row.external.detour,
            growth_fac: row.external.growth,
            seasonal_fac: row.external.seasonal,
            nat_imp_cat: row.national_importance.as_str(),
            nat_imp_fac: row.national_importance.factor(),
            display_in_map: row.display_in_map,
            adj_inc_fac: row.adjusted_incident_factor.and_then(finite),
        }
    }
}

fn write_records<S: Serialize, W: Write>(writer: W, rows: impl Iterator<Item = S>) -> Result<usize, IoError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut written = 0;
    for row in rows {
        csv_writer.serialize(row)?;
        written += 1;
    }
    csv_writer.flush()?;
    Ok(written)
}

/// Write the merged table. Returns the number of rows written.
pub fn write_merged_csv<W: Write>(writer: W, rows: &[MergedRow]) -> Result<usize, IoError> {
    let written = write_records(writer, rows.iter().map(MergedCsvRow::from))?;
    info!("[Merge] Wrote {} merged rows", written);
    Ok(written)
}

/// Write the composite incident-factor table. Returns the number of rows written.
pub fn write_incident_factor_csv<W: Write>(writer: W, rows: &[IncidentFactorRow]) -> Result<usize, IoError> {
    let written = write_records(writer, rows.iter().map(IncidentFactorCsvRow::from))?;
    info!("[Metrics] Wrote {} incident factor rows", written);
    Ok(written)
}

#[derive(Debug, Serialize)]
struct UnmatchedRouteRow<'a> {
    route_id: &'a str,
    route_class: Option<&'static str>,
    route_no: u32,
    route_county: u16,
}

/// Write one line per unmatched route.
pub fn write_unmatched_routes_csv<W: Write>(writer: W, routes: &BTreeSet<RouteId>) -> Result<usize, IoError> {
    write_records(
        writer,
        routes.iter().map(|route| UnmatchedRouteRow {
            route_id: route.as_str(),
            route_class: route.class().map(|c| c.label()),
            route_no: route.number(),
            route_county: route.county(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{merge_aadt_crash, MergeConfig};
    use crate::segment::{parse_aadt_records, parse_crash_records, IngestConfig};

    const AADT_CSV: &str = "\
route_id,begin_mp,end_mp,aadt_2018,source,extra
10000040092,0.0,2.0,50000,count station,x
10000040092,2.0,4.0,62000,,x
40000001092,0.0,1.0,900,,x
";

    const CRASH_CSV: &str = "\
route_gis,st_mp_pt,end_mp_pt,ka_cnt,bc_cnt,pdo_cnt,total_cnt,county
10000040092,1.0,3.0,2,4,10,16,92
10000040092,3.0,3.5,0,0,1,1,91
";

    #[test]
    fn test_read_with_column_aliases() {
        let aadt = read_aadt_csv(AADT_CSV.as_bytes()).unwrap();
        assert_eq!(aadt.len(), 3);
        assert_eq!(aadt[0].start_mp.as_deref(), Some("0.0"));
        assert_eq!(aadt[0].aadt.as_deref(), Some("50000"));
        assert_eq!(aadt[0].source.as_deref(), Some("count station"));
        assert_eq!(aadt[1].source, None);

        let crashes = read_crash_csv(CRASH_CSV.as_bytes()).unwrap();
        assert_eq!(crashes.len(), 2);
        assert_eq!(crashes[0].route_gis, "10000040092");
        assert_eq!(crashes[0].total_cnt.as_deref(), Some("16"));
    }

    #[test]
    fn test_read_then_merge_and_write() {
        let config = IngestConfig::default();
        let aadt = parse_aadt_records(&read_aadt_csv(AADT_CSV.as_bytes()).unwrap(), &config);
        let crashes = parse_crash_records(&read_crash_csv(CRASH_CSV.as_bytes()).unwrap(), &config);
        assert_eq!(aadt.skipped_route_class, 1);
        // County 91 disagrees with route county 092
        assert_eq!(crashes.error_count(), 1);

        let result = merge_aadt_crash(aadt.segments, crashes.segments, &MergeConfig::default());
        let mut out = Vec::new();
        let written = write_merged_csv(&mut out, &result.rows).unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("route_id,aadt_start_mp,aadt_end_mp,aadt_interval_left"));
        assert!(header.contains("total_cnt"));
        assert_eq!(lines.count(), 2);
        assert!(text.contains("count station"));
    }

    #[test]
    fn test_merged_csv_carries_geometry_length() {
        let route = RouteId::parse("10000040092").unwrap();
        let line = geo::LineString::from(vec![(-78.70, 35.78), (-78.69, 35.78)]);
        let aadt = vec![
            crate::RouteSegment::new(route.clone(), 0.0, 0.6, crate::AadtAttributes::new(50000.0))
                .unwrap()
                .with_geometry(line),
            crate::RouteSegment::new(route.clone(), 0.6, 1.2, crate::AadtAttributes::new(52000.0)).unwrap(),
        ];
        let crashes = vec![
            crate::RouteSegment::new(route, 0.0, 1.2, crate::CrashCounts::new(0.0, 1.0, 2.0, 3.0)).unwrap(),
        ];
        let result = merge_aadt_crash(aadt, crashes, &MergeConfig::default());

        let mut out = Vec::new();
        write_merged_csv(&mut out, &result.rows).unwrap();
        let mut reader = csv::Reader::from_reader(out.as_slice());
        let column = reader
            .headers()
            .unwrap()
            .iter()
            .position(|h| h == "shape_len_mi")
            .unwrap();
        let values: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[column].to_string())
            .collect();

        assert_eq!(values.len(), 2);
        let len: f64 = values[0].parse().unwrap();
        assert!((len - 0.56).abs() < 0.01, "got {}", len);
        // No geometry on the second segment
        assert_eq!(values[1], "");
    }

    #[test]
    fn test_read_from_path() {
        let dir = std::env::temp_dir().join(format!("nc_crash_rebin_io_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let aadt_path = dir.join("aadt.csv");
        let crash_path = dir.join("crash.csv");
        std::fs::write(&aadt_path, AADT_CSV).unwrap();
        std::fs::write(&crash_path, CRASH_CSV).unwrap();

        let aadt = read_aadt_csv_path(&aadt_path).unwrap();
        let crashes = read_crash_csv_path(&crash_path).unwrap();
        let missing = read_aadt_csv_path(dir.join("missing.csv"));
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(aadt, read_aadt_csv(AADT_CSV.as_bytes()).unwrap());
        assert_eq!(crashes.len(), 2);
        assert!(matches!(missing, Err(IoError::File(_))));
    }

    #[test]
    fn test_write_unmatched_routes() {
        let routes: BTreeSet<RouteId> = ["20000070092", "10000040001"]
            .iter()
            .map(|r| RouteId::parse(r).unwrap())
            .collect();
        let mut out = Vec::new();
        write_unmatched_routes_csv(&mut out, &routes).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "route_id,route_class,route_no,route_county\n\
             10000040001,Interstate,40,1\n\
             20000070092,US Route,70,92\n"
        );
    }

    #[test]
    fn test_malformed_csv_is_an_error() {
        let bad = "route_id,begin_mp\n10000040092,0.0,extra\n";
        assert!(matches!(read_aadt_csv(bad.as_bytes()), Err(IoError::Csv(_))));
    }
}
