//! The tagged plot specification format.
//!
//! A plot spec is a tree of `{ "type": <tag>, "args": <payload> }` nodes.
//! Deserialization is driven by serde's adjacently-tagged representation, so
//! an unknown tag is rejected with an explicit error instead of being decoded
//! reflectively. Specs stay serializable: persisted orders carry the spec and
//! rebuild the evaluatable [`Plot`] from it on every load.
//!
//! Point dates are plain strings, parsed by trying a fixed ordered list of
//! well-known textual formats until one succeeds. Dates without a zone are
//! interpreted as UTC.
//!
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::follow::plot::{Line, LogLine, Plot, PlotError, Point};

// Zoneless date-time formats, tried in order. The first two are the formats
// TradingView and Binance render chart timestamps in.
const DATETIME_FORMATS: &[&str] = &[
    "%a %d %b'%y %H:%M",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

// Date-only formats, resolved to midnight UTC.
const DATE_FORMATS: &[&str] = &["%a %d %b'%y", "%Y-%m-%d"];

/// A serialized plot: one variant per recognized tag.
///
/// The wire representation is `{"type": <tag>, "args": {...}}`; an
/// unrecognized tag fails deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args")]
pub enum PlotSpec {
    #[serde(rename = "line")]
    Line { p0: PointSpec, p1: PointSpec },

    #[serde(rename = "line_log")]
    LineLog { p0: PointSpec, p1: PointSpec },

    #[serde(rename = "offset_absolute")]
    OffsetAbsolute { value: f64, plot: Box<PlotSpec> },

    #[serde(rename = "offset_percentage")]
    OffsetPercentage { value: f64, plot: Box<PlotSpec> },

    #[serde(rename = "limit")]
    Limit {
        #[serde(default)]
        since: Option<String>,
        #[serde(default)]
        until: Option<String>,
        plot: Box<PlotSpec>,
    },

    #[serde(rename = "min")]
    Min { plots: Vec<PlotSpec> },

    #[serde(rename = "max")]
    Max { plots: Vec<PlotSpec> },
}

/// A serialized time/price coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSpec {
    pub date: String,
    pub price: f64,
}

impl PointSpec {
    fn resolve(&self) -> Result<Point, PlotError> {
        Ok(Point::new(parse_date(&self.date)?, self.price))
    }
}

impl PlotSpec {
    /// Builds the evaluatable plot this spec describes.
    ///
    /// Recursive descent over the spec tree; constructor preconditions
    /// (distinct line dates, non-empty aggregations) and date strings are
    /// validated here.
    pub fn build(&self) -> Result<Plot, PlotError> {
        match self {
            PlotSpec::Line { p0, p1 } => Ok(Plot::Line(Line::new(p0.resolve()?, p1.resolve()?)?)),
            PlotSpec::LineLog { p0, p1 } => {
                Ok(Plot::LogLine(LogLine::new(p0.resolve()?, p1.resolve()?)?))
            }
            PlotSpec::OffsetAbsolute { value, plot } => {
                Ok(Plot::absolute_offset(plot.build()?, *value))
            }
            PlotSpec::OffsetPercentage { value, plot } => {
                Ok(Plot::percentage_offset(plot.build()?, *value))
            }
            PlotSpec::Limit { since, until, plot } => Ok(Plot::limit(
                plot.build()?,
                parse_bound(since.as_deref())?,
                parse_bound(until.as_deref())?,
            )),
            PlotSpec::Min { plots } => Plot::min(build_all(plots)?),
            PlotSpec::Max { plots } => Plot::max(build_all(plots)?),
        }
    }
}

fn build_all(specs: &[PlotSpec]) -> Result<Vec<Plot>, PlotError> {
    specs.iter().map(PlotSpec::build).collect()
}

/// An absent or empty time bound means "unbounded on that side".
fn parse_bound(s: Option<&str>) -> Result<Option<DateTime<Utc>>, PlotError> {
    match s {
        None | Some("") => Ok(None),
        Some(s) => Ok(Some(parse_date(s)?)),
    }
}

/// Parses a date string by trying the accepted formats in order.
///
/// Zoned formats (RFC 3339, RFC 2822) are tried first, then the zoneless
/// date-time formats as UTC, then the date-only formats as midnight UTC.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, PlotError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Ok(d.and_time(chrono::NaiveTime::MIN).and_utc());
        }
    }

    Err(PlotError::Invalid(format!(
        "unable to parse time string: {s}"
    )))
}
