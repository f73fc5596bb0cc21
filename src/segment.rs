//! # Route Segment Model
//!
//! Linear-referenced intervals along a North Carolina route, and the parsing
//! that turns raw AADT and crash records into validated segments.
//!
//! A route is addressed by an 11-digit composite identifier:
//!
//! | digits | field |
//! |--------|-------|
//! | 1 | route class (1 Interstate, 2 US Route, 3 NC Route, 4 Secondary) |
//! | 1 | route qualifier |
//! | 1 | inventory direction |
//! | 5 | route number |
//! | 3 | county code |
//!
//! Segments are immutable once parsed. Later stages build new values from
//! them rather than editing them in place.

use std::fmt;
use std::ops::AddAssign;

use geo::LineString;
use log::{debug, info, warn};

use crate::error::ParseError;
use crate::intervals::MilepostInterval;

/// Number of characters in a composite route identifier.
pub const ROUTE_ID_LEN: usize = 11;

// =============================================================================
// Route Identifier
// =============================================================================

/// Functional class encoded in the first digit of a route id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RouteClass {
    Interstate,
    UsRoute,
    NcRoute,
    Secondary,
}

impl RouteClass {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Interstate),
            2 => Some(Self::UsRoute),
            3 => Some(Self::NcRoute),
            4 => Some(Self::Secondary),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Interstate => 1,
            Self::UsRoute => 2,
            Self::NcRoute => 3,
            Self::Secondary => 4,
        }
    }

    /// Display label used in reports ("Interstate", "US Route", ...).
    pub fn label(self) -> &'static str {
        match self {
            Self::Interstate => "Interstate",
            Self::UsRoute => "US Route",
            Self::NcRoute => "NC Route",
            Self::Secondary => "Secondary Routes",
        }
    }

    /// Sign prefix as it appears on route shields ("I", "US", "NC").
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::Interstate => "I",
            Self::UsRoute => "US",
            Self::NcRoute => "NC",
            Self::Secondary => "SR",
        }
    }
}

/// A decomposed composite route identifier.
///
/// Ordering and equality follow the raw string, so sorting by `RouteId`
/// matches sorting the source tables by `route_id`. Serialized as the raw
/// string and deserialized through [`RouteId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct RouteId {
    raw: String,
    class_code: u8,
    qualifier: u8,
    inventory: u8,
    number: u32,
    county: u16,
}

impl RouteId {
    /// Decompose a raw route id.
    ///
    /// Float-typed source columns render ids as `20000129020.0`; a fractional
    /// part made only of zeros is dropped before validation.
    ///
    /// # Example
    /// ```
    /// use nc_crash_rebin::{RouteClass, RouteId};
    ///
    /// let id = RouteId::parse("20000129020.0").unwrap();
    /// assert_eq!(id.as_str(), "20000129020");
    /// assert_eq!(id.class(), Some(RouteClass::UsRoute));
    /// assert_eq!(id.number(), 1);
    /// assert_eq!(id.county(), 290);
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let trimmed = raw.trim();
        let digits = match trimmed.split_once('.') {
            Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
            Some(_) => {
                return Err(ParseError::RouteIdNonNumeric {
                    raw: raw.to_string(),
                })
            }
            None => trimmed,
        };

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseError::RouteIdNonNumeric {
                raw: raw.to_string(),
            });
        }
        if digits.len() != ROUTE_ID_LEN {
            return Err(ParseError::RouteIdLength {
                raw: raw.to_string(),
                expected: ROUTE_ID_LEN,
            });
        }

        // All ASCII digits and fixed width, so these slices and parses cannot fail.
        let field = |range: std::ops::Range<usize>| -> u32 {
            digits[range]
                .bytes()
                .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
        };

        Ok(Self {
            raw: digits.to_string(),
            class_code: field(0..1) as u8,
            qualifier: field(1..2) as u8,
            inventory: field(2..3) as u8,
            number: field(3..8),
            county: field(8..11) as u16,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn class_code(&self) -> u8 {
        self.class_code
    }

    pub fn class(&self) -> Option<RouteClass> {
        RouteClass::from_code(self.class_code)
    }

    pub fn qualifier(&self) -> u8 {
        self.qualifier
    }

    pub fn inventory(&self) -> u8 {
        self.inventory
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn county(&self) -> u16 {
        self.county
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for RouteId {
    type Error = ParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<RouteId> for String {
    fn from(id: RouteId) -> Self {
        id.raw
    }
}

// =============================================================================
// Segment Attributes
// =============================================================================

/// Crash counts by severity class.
///
/// Stored as `f64` because apportionment scales them by overlap ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrashCounts {
    /// Fatal and incapacitating injury crashes (K and A)
    pub ka: f64,
    /// Other injury crashes (B and C)
    pub bc: f64,
    /// Property-damage-only crashes
    pub pdo: f64,
    /// All crashes
    pub total: f64,
}

impl CrashCounts {
    pub fn new(ka: f64, bc: f64, pdo: f64, total: f64) -> Self {
        Self { ka, bc, pdo, total }
    }

    /// Every count multiplied by `ratio`.
    pub fn scaled(&self, ratio: f64) -> Self {
        Self {
            ka: self.ka * ratio,
            bc: self.bc * ratio,
            pdo: self.pdo * ratio,
            total: self.total * ratio,
        }
    }
}

impl AddAssign for CrashCounts {
    fn add_assign(&mut self, other: Self) {
        self.ka += other.ka;
        self.bc += other.bc;
        self.pdo += other.pdo;
        self.total += other.total;
    }
}

/// Traffic attributes of an AADT segment.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AadtAttributes {
    /// Annual average daily traffic
    pub aadt: f64,
    /// Count source label carried through from the AADT layer
    pub source: Option<String>,
}

impl AadtAttributes {
    pub fn new(aadt: f64) -> Self {
        Self { aadt, source: None }
    }
}

// =============================================================================
// Route Segment
// =============================================================================

/// One linear interval `[start_mp, end_mp)` on a route, with attributes.
///
/// Geometry is carried for output but never interpreted by the reconciliation
/// stages.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSegment<A> {
    pub route: RouteId,
    pub start_mp: f64,
    pub end_mp: f64,
    pub attributes: A,
    pub geometry: Option<LineString<f64>>,
}

/// An AADT layer segment.
pub type AadtSegment = RouteSegment<AadtAttributes>;

/// A crash layer segment.
pub type CrashSegment = RouteSegment<CrashCounts>;

impl<A> RouteSegment<A> {
    /// Build a validated segment. Mileposts must be finite with `end_mp > start_mp`.
    pub fn new(route: RouteId, start_mp: f64, end_mp: f64, attributes: A) -> Result<Self, ParseError> {
        for (field, value) in [("start_mp", start_mp), ("end_mp", end_mp)] {
            if !value.is_finite() {
                return Err(ParseError::NonFinite {
                    route: route.to_string(),
                    field,
                });
            }
        }
        if end_mp <= start_mp {
            return Err(ParseError::NonPositiveLength {
                route: route.to_string(),
                start: start_mp,
                end: end_mp,
            });
        }
        Ok(Self {
            route,
            start_mp,
            end_mp,
            attributes,
            geometry: None,
        })
    }

    pub fn with_geometry(mut self, geometry: LineString<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Milepost length (`end_mp - start_mp`).
    pub fn len(&self) -> f64 {
        self.end_mp - self.start_mp
    }

    pub fn interval(&self) -> MilepostInterval {
        MilepostInterval::new(self.start_mp, self.end_mp)
    }

    /// Haversine length of the geometry in miles, if any.
    pub fn shape_len_mi(&self) -> Option<f64> {
        self.geometry.as_ref().map(crate::geo_utils::polyline_length_mi)
    }
}

// =============================================================================
// Raw Records
// =============================================================================

/// An AADT row as it comes out of the source table, all fields still text.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawAadtRecord {
    pub route_id: String,
    #[cfg_attr(feature = "serde", serde(default, alias = "begin_mp", alias = "st_mp_pt"))]
    pub start_mp: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, alias = "end_mp_pt"))]
    pub end_mp: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, alias = "aadt_2018"))]
    pub aadt: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub source: Option<String>,
}

/// A crash-severity row as it comes out of the source table.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawCrashRecord {
    #[cfg_attr(feature = "serde", serde(alias = "route_id"))]
    pub route_gis: String,
    #[cfg_attr(feature = "serde", serde(default, alias = "begin_mp", alias = "st_mp_pt"))]
    pub start_mp: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, alias = "end_mp_pt"))]
    pub end_mp: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ka_cnt: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bc_cnt: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub pdo_cnt: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub total_cnt: Option<String>,
    /// County code as recorded separately from the route id
    #[cfg_attr(feature = "serde", serde(default))]
    pub county: Option<String>,
}

/// Settings for turning raw records into segments.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IngestConfig {
    /// Highest route class kept. Default: 3 (Interstate, US Route, NC Route)
    pub max_route_class: Option<u8>,
    /// Reject crash records whose county column disagrees with the route id.
    /// Default: true
    pub check_county: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_route_class: Some(3),
            check_county: true,
        }
    }
}

/// A raw table row that parses into a [`RouteSegment`].
pub trait RawRecord {
    type Attributes;

    /// The route id text, used for filtering and diagnostics.
    fn raw_route_id(&self) -> &str;

    /// Parse the non-route fields once the route id is known good.
    fn parse_with_route(
        &self,
        route: RouteId,
        config: &IngestConfig,
    ) -> Result<RouteSegment<Self::Attributes>, ParseError>;

    fn parse(&self, config: &IngestConfig) -> Result<RouteSegment<Self::Attributes>, ParseError> {
        let route = RouteId::parse(self.raw_route_id())?;
        self.parse_with_route(route, config)
    }
}

impl RawRecord for RawAadtRecord {
    type Attributes = AadtAttributes;

    fn raw_route_id(&self) -> &str {
        &self.route_id
    }

    fn parse_with_route(&self, route: RouteId, _config: &IngestConfig) -> Result<AadtSegment, ParseError> {
        let start_mp = parse_field(&route, "start_mp", self.start_mp.as_deref())?;
        let end_mp = parse_field(&route, "end_mp", self.end_mp.as_deref())?;
        let aadt = parse_non_negative(&route, "aadt", self.aadt.as_deref())?;
        let source = self
            .source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        RouteSegment::new(route, start_mp, end_mp, AadtAttributes { aadt, source })
    }
}

impl RawRecord for RawCrashRecord {
    type Attributes = CrashCounts;

    fn raw_route_id(&self) -> &str {
        &self.route_gis
    }

    fn parse_with_route(&self, route: RouteId, config: &IngestConfig) -> Result<CrashSegment, ParseError> {
        if config.check_county {
            if let Some(county) = self.county.as_deref().filter(|c| !c.trim().is_empty()) {
                let found = parse_non_negative(&route, "county", Some(county))?;
                if found.fract() != 0.0 || found != f64::from(route.county()) {
                    return Err(ParseError::CountyMismatch {
                        expected: route.county(),
                        found: found as u16,
                        route: route.to_string(),
                    });
                }
            }
        }

        let start_mp = parse_field(&route, "start_mp", self.start_mp.as_deref())?;
        let end_mp = parse_field(&route, "end_mp", self.end_mp.as_deref())?;
        let counts = CrashCounts {
            ka: parse_non_negative(&route, "ka_cnt", self.ka_cnt.as_deref())?,
            bc: parse_non_negative(&route, "bc_cnt", self.bc_cnt.as_deref())?,
            pdo: parse_non_negative(&route, "pdo_cnt", self.pdo_cnt.as_deref())?,
            total: parse_non_negative(&route, "total_cnt", self.total_cnt.as_deref())?,
        };
        RouteSegment::new(route, start_mp, end_mp, counts)
    }
}

fn parse_field(route: &RouteId, field: &'static str, value: Option<&str>) -> Result<f64, ParseError> {
    let text = value.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        ParseError::MissingField {
            route: route.to_string(),
            field,
        }
    })?;
    let parsed: f64 = text.parse().map_err(|_| ParseError::NonNumeric {
        route: route.to_string(),
        field,
        value: text.to_string(),
    })?;
    if !parsed.is_finite() {
        return Err(ParseError::NonFinite {
            route: route.to_string(),
            field,
        });
    }
    Ok(parsed)
}

fn parse_non_negative(route: &RouteId, field: &'static str, value: Option<&str>) -> Result<f64, ParseError> {
    let parsed = parse_field(route, field, value)?;
    if parsed < 0.0 {
        return Err(ParseError::NegativeValue {
            route: route.to_string(),
            field,
            value: parsed,
        });
    }
    Ok(parsed)
}

// =============================================================================
// Batch Parsing
// =============================================================================

/// Outcome of parsing a whole table.
#[derive(Debug, Clone)]
pub struct ParsedBatch<A> {
    /// Valid segments, in input order
    pub segments: Vec<RouteSegment<A>>,
    /// Input row index and error for every rejected record
    pub errors: Vec<(usize, ParseError)>,
    /// Records dropped because their route class exceeds the configured maximum
    pub skipped_route_class: usize,
}

impl<A> ParsedBatch<A> {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Parse every record, collecting failures instead of stopping at the first.
pub fn parse_records<'a, R, I>(records: I, config: &IngestConfig) -> ParsedBatch<R::Attributes>
where
    R: RawRecord + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut batch = ParsedBatch {
        segments: Vec::new(),
        errors: Vec::new(),
        skipped_route_class: 0,
    };
    let mut seen = 0usize;

    for (row, record) in records.into_iter().enumerate() {
        seen += 1;
        let route = match RouteId::parse(record.raw_route_id()) {
            Ok(route) => route,
            Err(err) => {
                debug!("[Ingest] row {}: {}", row, err);
                batch.errors.push((row, err));
                continue;
            }
        };

        if let Some(max_class) = config.max_route_class {
            if route.class_code() > max_class {
                batch.skipped_route_class += 1;
                continue;
            }
        }

        match record.parse_with_route(route, config) {
            Ok(segment) => batch.segments.push(segment),
            Err(err) => {
                debug!("[Ingest] row {}: {}", row, err);
                batch.errors.push((row, err));
            }
        }
    }

    info!(
        "[Ingest] Parsed {} of {} records ({} skipped by route class)",
        batch.segments.len(),
        seen,
        batch.skipped_route_class
    );
    if !batch.errors.is_empty() {
        warn!("[Ingest] Rejected {} malformed records", batch.errors.len());
    }

    batch
}

/// Parse an AADT table.
pub fn parse_aadt_records(records: &[RawAadtRecord], config: &IngestConfig) -> ParsedBatch<AadtAttributes> {
    parse_records(records, config)
}

/// Parse a crash-severity table.
pub fn parse_crash_records(records: &[RawCrashRecord], config: &IngestConfig) -> ParsedBatch<CrashCounts> {
    parse_records(records, config)
}
