//! # NC Crash Rebin
//!
//! Reconciles linear-referenced AADT and crash-severity layers for North
//! Carolina roadway safety analysis.
//!
//! This library provides:
//! - Route id decomposition and validated segment parsing
//! - AADT overlap correction into a per-route partition
//! - Crash-to-AADT interval binning with an R-tree pre-filter
//! - Proportional apportionment of crash counts by overlap length
//! - Per-interval aggregation with severity index and crash rate
//! - Composite incident factors and county roll-ups
//!
//! ## Features
//!
//! - **`parallel`** - Enable per-route parallel merging with rayon
//! - **`serde`** - Derive Serialize/Deserialize on configs and records
//! - **`io`** - CSV readers and writers
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use nc_crash_rebin::{
//!     merge_aadt_crash, parse_aadt_records, parse_crash_records, IngestConfig, MergeConfig,
//!     RawAadtRecord, RawCrashRecord,
//! };
//!
//! let aadt = vec![RawAadtRecord {
//!     route_id: "10000040092".into(),
//!     start_mp: Some("0.0".into()),
//!     end_mp: Some("2.0".into()),
//!     aadt: Some("50000".into()),
//!     source: None,
//! }];
//! let crashes = vec![RawCrashRecord {
//!     route_gis: "10000040092".into(),
//!     start_mp: Some("1.0".into()),
//!     end_mp: Some("3.0".into()),
//!     ka_cnt: Some("2".into()),
//!     bc_cnt: Some("4".into()),
//!     pdo_cnt: Some("10".into()),
//!     total_cnt: Some("16".into()),
//!     county: None,
//! }];
//!
//! let ingest = IngestConfig::default();
//! let aadt = parse_aadt_records(&aadt, &ingest);
//! let crashes = parse_crash_records(&crashes, &ingest);
//!
//! let result = merge_aadt_crash(aadt.segments, crashes.segments, &MergeConfig::default());
//! for row in &result.rows {
//!     if let Some(crash) = &row.crash {
//!         println!("{} [{}, {}): {} crashes", row.route, row.interval.left, row.interval.right, crash.counts.total);
//!     }
//! }
//! ```

pub mod error;
pub use error::{ApportionError, ParseError};

pub mod geo_utils;

// Segment model and ingest
pub mod segment;
pub use segment::{
    parse_aadt_records, parse_crash_records, parse_records, AadtAttributes, AadtSegment,
    CrashCounts, CrashSegment, IngestConfig, ParsedBatch, RawAadtRecord, RawCrashRecord,
    RawRecord, RouteClass, RouteId, RouteSegment, ROUTE_ID_LEN,
};

// Interval reconciliation
pub mod intervals;
pub use intervals::{correct_aadt_intervals, AadtInterval, MilepostInterval, OverlapCorrection};

pub mod binning;
pub use binning::{bin_crash_segments, BinnedRoute, CrashBin};

pub mod apportion;
pub use apportion::{apportion, apportion_overlap, classify_overlap, ApportionedFragment, OverlapCategory};

pub mod aggregate;
pub use aggregate::{aggregate_fragments, crash_rate_per_mile, severity_index, AggregatedInterval, SeverityWeights};

pub mod merge;
#[cfg(feature = "parallel")]
pub use merge::merge_aadt_crash_parallel;
pub use merge::{
    merge_aadt_crash, missing_aadt, missing_crash, process_route, MergeConfig, MergeReport,
    MergeResult, MergedRow, RouteOutcome, RouteStatus,
};

// Derived metrics
pub mod metrics;
pub use metrics::{
    compose_incident_factors, scale_severity_index, ExternalFactors, IncidentFactorConfig,
    IncidentFactorRow, NationalImportance, NationalImportanceLookup, SeverityScalingConfig,
};

pub mod county;
pub use county::{rollup_by_county, CountyRollup};

// CSV input and output
#[cfg(feature = "io")]
pub mod io;
