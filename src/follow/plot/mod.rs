//! Plot algebra: lazy time → price curves.
//!
//! A [`Plot`] maps an instant to a price. Plots are immutable after
//! construction, evaluation has no side effects, and evaluating the same plot
//! at the same instant always returns the same result. A plot may have no
//! value at a given instant; that is the ordinary [`PlotError::OutOfRange`]
//! result, not a fault.
//!
//! # Submodules
//!
//! - `parse`: the tagged `{type, args}` specification format plots are
//!     deserialized from.
//!
use chrono::{DateTime, Utc};

pub mod parse;

pub use parse::PlotSpec;

/// Errors produced by plot construction and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    /// The plot has no value at the evaluated instant. An ordinary result
    /// code: callers skip the instant and carry on.
    #[error("plot out of range")]
    OutOfRange,

    /// A protected plot evaluated to a price no order should ever carry.
    #[error("price protection: {0}")]
    Protection(f64),

    /// A structural precondition failed during construction.
    #[error("invalid plot: {0}")]
    Invalid(String),
}

/// A time/price coordinate used to construct lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub date: DateTime<Utc>,
    pub price: f64,
}

impl Point {
    pub fn new(date: DateTime<Utc>, price: f64) -> Self {
        Self { date, price }
    }
}

/// A straight line `a*t + b` over seconds-since-epoch.
///
/// Total over time: evaluation never goes out of range.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    a: f64,
    b: f64,
}

impl Line {
    /// Fits a line through two points with distinct dates.
    ///
    /// Points are sorted ascending by time first, so the orientation of the
    /// line does not depend on argument order.
    pub fn new(p0: Point, p1: Point) -> Result<Self, PlotError> {
        if p0.date == p1.date {
            return Err(PlotError::Invalid(
                "line: both points have the same date".to_string(),
            ));
        }

        let (p0, p1) = sort_points(p0, p1);

        let x0 = time_to_f64(p0.date);
        let x1 = time_to_f64(p1.date);

        let a = (p1.price - p0.price) / (x1 - x0);
        let b = p0.price - a * x0;

        Ok(Self { a, b })
    }

    fn at(&self, t: DateTime<Utc>) -> f64 {
        self.a * time_to_f64(t) + self.b
    }
}

/// A straight line on a semi-logarithmic `(t, log10 price)` graph:
/// `k * 10^(m * (t - x0))`.
///
/// The pivot `x0` is the earlier point's time, which keeps the exponent small
/// and preserves precision near the fitted range.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    m: f64,
    k: f64,
    x_offset: f64,
}

impl LogLine {
    /// Fits a log-line through two points with distinct dates.
    pub fn new(p0: Point, p1: Point) -> Result<Self, PlotError> {
        if p0.date == p1.date {
            return Err(PlotError::Invalid(
                "log line: both points have the same date".to_string(),
            ));
        }

        let (p0, p1) = sort_points(p0, p1);

        let x_offset = time_to_f64(p0.date);
        let x1 = time_to_f64(p1.date) - x_offset;

        let m = (p1.price.log10() - p0.price.log10()) / x1;

        Ok(Self {
            m,
            k: p0.price,
            x_offset,
        })
    }

    fn at(&self, t: DateTime<Utc>) -> f64 {
        let x = time_to_f64(t) - self.x_offset;
        self.k * 10f64.powf(self.m * x)
    }
}

/// A lazily evaluated price curve.
///
/// One variant per primitive; wrappers box their inner plot, aggregations own
/// a non-empty list of children. Use the constructors; they validate the
/// structural preconditions the variants rely on.
#[derive(Debug, Clone, PartialEq)]
pub enum Plot {
    Line(Line),
    LogLine(LogLine),
    /// `inner(t) + value`.
    AbsoluteOffset { value: f64, inner: Box<Plot> },
    /// `inner(t) * (1 + value)`.
    PercentageOffset { value: f64, inner: Box<Plot> },
    /// `inner(t)` within the half-open window `[from, to)`, out-of-range
    /// outside it. `None` bounds are unbounded on that side.
    Limit {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        inner: Box<Plot>,
    },
    /// Minimum over the in-range children; out-of-range when none are.
    Min(Vec<Plot>),
    /// Maximum over the in-range children; out-of-range when none are.
    Max(Vec<Plot>),
    /// Rejects `0` and `±∞` from the inner plot with a protection error.
    Protected(Box<Plot>),
}

impl Plot {
    pub fn absolute_offset(inner: Plot, value: f64) -> Plot {
        Plot::AbsoluteOffset {
            value,
            inner: Box::new(inner),
        }
    }

    pub fn percentage_offset(inner: Plot, value: f64) -> Plot {
        Plot::PercentageOffset {
            value,
            inner: Box::new(inner),
        }
    }

    pub fn limit(inner: Plot, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Plot {
        Plot::Limit {
            from,
            to,
            inner: Box::new(inner),
        }
    }

    /// Min aggregation; the child list must be non-empty.
    pub fn min(plots: Vec<Plot>) -> Result<Plot, PlotError> {
        if plots.is_empty() {
            return Err(PlotError::Invalid(
                "min aggregator: empty plot list".to_string(),
            ));
        }
        Ok(Plot::Min(plots))
    }

    /// Max aggregation; the child list must be non-empty.
    pub fn max(plots: Vec<Plot>) -> Result<Plot, PlotError> {
        if plots.is_empty() {
            return Err(PlotError::Invalid(
                "max aggregator: empty plot list".to_string(),
            ));
        }
        Ok(Plot::Max(plots))
    }

    pub fn protected(inner: Plot) -> Plot {
        Plot::Protected(Box::new(inner))
    }

    /// Evaluates the plot at `t`.
    ///
    /// Returns the price, [`PlotError::OutOfRange`] when the plot has no
    /// value at `t`, or [`PlotError::Protection`] from a protected wrapper.
    pub fn at(&self, t: DateTime<Utc>) -> Result<f64, PlotError> {
        match self {
            Plot::Line(line) => Ok(line.at(t)),
            Plot::LogLine(line) => Ok(line.at(t)),
            Plot::AbsoluteOffset { value, inner } => Ok(inner.at(t)? + value),
            Plot::PercentageOffset { value, inner } => {
                let v = inner.at(t)?;
                Ok(v + v * value)
            }
            Plot::Limit { from, to, inner } => {
                if !in_range(t, *from, *to) {
                    return Err(PlotError::OutOfRange);
                }
                inner.at(t)
            }
            Plot::Min(plots) => fold_in_range(plots, t, |best, v| v < best),
            Plot::Max(plots) => fold_in_range(plots, t, |best, v| v > best),
            Plot::Protected(inner) => {
                let price = inner.at(t)?;
                if price == 0.0 || price.is_infinite() {
                    return Err(PlotError::Protection(price));
                }
                Ok(price)
            }
        }
    }
}

fn in_range(t: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |from| t >= from) && to.map_or(true, |to| t < to)
}

/// Folds the in-range children of an aggregation, skipping out-of-range ones
/// and propagating any other error. An empty fold is itself out of range.
fn fold_in_range(
    plots: &[Plot],
    t: DateTime<Utc>,
    replaces: impl Fn(f64, f64) -> bool,
) -> Result<f64, PlotError> {
    let mut best: Option<f64> = None;

    for plot in plots {
        let v = match plot.at(t) {
            Ok(v) => v,
            Err(PlotError::OutOfRange) => continue,
            Err(e) => return Err(e),
        };

        match best {
            Some(b) if !replaces(b, v) => {}
            _ => best = Some(v),
        }
    }

    best.ok_or(PlotError::OutOfRange)
}

fn time_to_f64(t: DateTime<Utc>) -> f64 {
    t.timestamp() as f64
}

fn sort_points(p0: Point, p1: Point) -> (Point, Point) {
    if p1.date < p0.date {
        (p1, p0)
    } else {
        (p0, p1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn unix(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn point(secs: i64, price: f64) -> Point {
        Point::new(unix(secs), price)
    }

    /// A plot that is never in range, regardless of the instant.
    fn never_valid(price: f64) -> Plot {
        Plot::limit(constant(price), Some(unix(10)), Some(unix(10)))
    }

    /// A flat line at `price`.
    fn constant(price: f64) -> Plot {
        Plot::Line(Line { a: 0.0, b: price })
    }

    #[test]
    fn test_line_through_endpoints() {
        let line = Line::new(point(0, 0.0), point(1, 1.0)).unwrap();

        assert_eq!(line.at(unix(2)), 2.0);
        assert_eq!(line.at(unix(-500)), -500.0);
    }

    #[test]
    fn test_line_orientation_is_argument_order_independent() {
        let fwd = Line::new(point(100, 5.0), point(200, 15.0)).unwrap();
        let rev = Line::new(point(200, 15.0), point(100, 5.0)).unwrap();

        assert_eq!(fwd, rev);
        assert_eq!(fwd.at(unix(150)), 10.0);
    }

    #[test]
    fn test_line_same_date_is_invalid() {
        let err = Line::new(point(7, 1.0), point(7, 2.0)).unwrap_err();
        assert!(matches!(err, PlotError::Invalid(_)));
    }

    #[test]
    fn test_log_line_through_endpoints() {
        let line = LogLine::new(point(0, 1.0), point(2, 100.0)).unwrap();

        assert!((line.at(unix(0)) - 1.0).abs() < 1e-9);
        assert!((line.at(unix(2)) - 100.0).abs() < 1e-9);
        assert!((line.at(unix(3)) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_limit_half_open_window() {
        let plot = Plot::limit(constant(5.0), Some(unix(10)), Some(unix(20)));

        assert!(matches!(plot.at(unix(9)), Err(PlotError::OutOfRange)));
        assert_eq!(plot.at(unix(10)).unwrap(), 5.0);
        assert_eq!(plot.at(unix(19)).unwrap(), 5.0);
        assert!(matches!(plot.at(unix(20)), Err(PlotError::OutOfRange)));
    }

    #[test]
    fn test_limit_unbounded_sides() {
        let since_only = Plot::limit(constant(5.0), Some(unix(10)), None);
        assert!(matches!(since_only.at(unix(9)), Err(PlotError::OutOfRange)));
        assert_eq!(since_only.at(unix(1 << 40)).unwrap(), 5.0);

        let until_only = Plot::limit(constant(5.0), None, Some(unix(10)));
        assert_eq!(until_only.at(unix(-1000)).unwrap(), 5.0);
        assert!(matches!(until_only.at(unix(10)), Err(PlotError::OutOfRange)));

        let unbounded = Plot::limit(constant(5.0), None, None);
        assert_eq!(unbounded.at(unix(0)).unwrap(), 5.0);
    }

    #[test]
    fn test_min_skips_out_of_range_children() {
        let plot = Plot::min(vec![
            never_valid(5.0),
            constant(10.0),
            constant(15.0),
            never_valid(15.0),
        ])
        .unwrap();

        assert_eq!(plot.at(unix(0)).unwrap(), 10.0);
    }

    #[test]
    fn test_max_skips_out_of_range_children() {
        let plot = Plot::max(vec![
            never_valid(5.0),
            constant(10.0),
            constant(15.0),
            never_valid(15.0),
        ])
        .unwrap();

        assert_eq!(plot.at(unix(0)).unwrap(), 15.0);
    }

    #[test]
    fn test_min_switches_when_a_child_expires() {
        let plot = Plot::min(vec![
            Plot::limit(constant(1.0), None, Some(unix(10))),
            constant(1.5),
        ])
        .unwrap();

        assert_eq!(plot.at(unix(9)).unwrap(), 1.0);
        assert_eq!(plot.at(unix(10)).unwrap(), 1.5);
    }

    #[test]
    fn test_aggregation_all_children_out_of_range() {
        let plot = Plot::max(vec![never_valid(1.0), never_valid(2.0)]).unwrap();
        assert!(matches!(plot.at(unix(0)), Err(PlotError::OutOfRange)));
    }

    #[test]
    fn test_aggregation_rejects_empty_child_list() {
        assert!(matches!(Plot::min(vec![]), Err(PlotError::Invalid(_))));
        assert!(matches!(Plot::max(vec![]), Err(PlotError::Invalid(_))));
    }

    #[test]
    fn test_offsets() {
        let abs = Plot::absolute_offset(constant(100.0), -2.5);
        assert_eq!(abs.at(unix(0)).unwrap(), 97.5);

        let pct = Plot::percentage_offset(constant(100.0), 0.05);
        assert_eq!(pct.at(unix(0)).unwrap(), 105.0);

        let pct_down = Plot::percentage_offset(constant(100.0), -0.5);
        assert_eq!(pct_down.at(unix(0)).unwrap(), 50.0);
    }

    #[test]
    fn test_offset_propagates_out_of_range() {
        let plot = Plot::absolute_offset(never_valid(1.0), 5.0);
        assert!(matches!(plot.at(unix(0)), Err(PlotError::OutOfRange)));
    }

    #[test]
    fn test_protector() {
        let zero = Plot::protected(constant(0.0));
        assert!(matches!(zero.at(unix(0)), Err(PlotError::Protection(v)) if v == 0.0));

        let pos_inf = Plot::protected(constant(f64::INFINITY));
        assert!(matches!(pos_inf.at(unix(0)), Err(PlotError::Protection(_))));

        let neg_inf = Plot::protected(constant(f64::NEG_INFINITY));
        assert!(matches!(neg_inf.at(unix(0)), Err(PlotError::Protection(_))));

        let fine = Plot::protected(constant(1.0));
        assert_eq!(fine.at(unix(0)).unwrap(), 1.0);

        let oor = Plot::protected(never_valid(1.0));
        assert!(matches!(oor.at(unix(0)), Err(PlotError::OutOfRange)));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let plot = Plot::max(vec![
            Plot::percentage_offset(
                Plot::LogLine(LogLine::new(point(0, 1.0), point(1000, 50.0)).unwrap()),
                0.01,
            ),
            Plot::limit(constant(42.0), Some(unix(100)), Some(unix(5000))),
        ])
        .unwrap();

        let first = plot.at(unix(1234)).unwrap();
        let second = plot.at(unix(1234)).unwrap();
        assert_eq!(first, second);
    }
}
