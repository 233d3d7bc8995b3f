//! Error types.
//!
//! This module defines the error types and handling mechanisms for the
//! `plotfollow` crate. It consolidates the failure modes of plot evaluation,
//! venue interaction, persistence and webhook publishing into a single
//! [`FollowError`] enumeration, together with a convenient [`Result`] alias.
//!
//! Two error kinds deserve a note because the reconciler treats them as
//! ordinary, non-breaking outcomes rather than faults:
//!
//! - [`crate::follow::plot::PlotError::OutOfRange`]: the plot simply has no
//!   value at the evaluated instant; the affected order is skipped this tick.
//! - [`FollowError::PriceOutOfRange`]: the venue rejected the evaluated price
//!   as outside its allowed band; the affected order is deferred to a later
//!   tick.
//!
//! Everything else is breaking for the tick in progress.
//!
use std::env::VarError;

use crate::follow::plot::PlotError;

/// A `Result` alias where the `Err` case is `plotfollow::follow::FollowError`.
pub type Result<T> = std::result::Result<T, FollowError>;

/// An enumeration of all possible errors that may occur while creating,
/// ticking, or stopping a follow.
///
/// Variants originating from external crates (`reqwest`, `serde_json`,
/// `std::io`) are wrapped transparently so callers can still match on the
/// semantic kind. Cleanup paths that must not swallow failures collect them
/// into [`FollowError::Multiple`], preserving every joined error.
///
#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    /// Plot evaluation failure (out-of-range, price protection, or an invalid
    /// construction).
    #[error(transparent)]
    Plot(#[from] PlotError),

    /// A malformed ingress document: plot spec, interval string or pair symbol.
    #[error("parse error: {0}")]
    Parse(String),

    /// The venue rejected the evaluated price as outside its allowed band.
    /// Retriable: the affected order is deferred to a later tick.
    #[error("price out of range")]
    PriceOutOfRange,

    /// The venue does not list the requested symbol, even after a forced
    /// exchange-info refresh.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A venue API rejection that is neither a no-op nor retriable.
    #[error("venue error {code}: {message}")]
    Venue { code: i64, message: String },

    /// A venue arithmetic filter (lot size, min notional) rejected the order
    /// values before submission.
    #[error("filter error: {0}")]
    Filter(String),

    /// HTTP transport failure (connect, timeout, TLS, decode).
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the repository port.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("follow not found: {0}")]
    FollowNotFound(String),

    /// The request's exchange identity hash does not match the hash the
    /// follow was created under.
    #[error("exchange identity mismatch for follow {0}")]
    IdentityMismatch(String),

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("environment variable error: {0}")]
    EnvVar(#[from] VarError),

    /// Several errors joined from a cleanup pass; all are preserved.
    #[error("{}", join_messages(.0))]
    Multiple(Vec<FollowError>),

    /// Internal `plotfollow` errors.
    #[error("internal `plotfollow` error: {0}")]
    Internal(String),
}

impl From<&str> for FollowError {
    fn from(value: &str) -> Self {
        FollowError::Internal(value.to_string())
    }
}

impl FollowError {
    /// Whether this error breaks the tick in progress.
    ///
    /// A plot with no value at the tick instant and a venue price-band
    /// rejection are ordinary outcomes: the affected order is skipped or
    /// deferred and the tick carries on.
    pub fn breaking(&self) -> bool {
        !matches!(
            self,
            FollowError::PriceOutOfRange | FollowError::Plot(PlotError::OutOfRange)
        )
    }

    /// Joins a collection of errors into a single error.
    ///
    /// Returns `None` when the collection is empty, the sole error when it
    /// holds exactly one, and [`FollowError::Multiple`] otherwise.
    pub fn join(errs: Vec<FollowError>) -> Option<FollowError> {
        let mut errs = errs;
        match errs.len() {
            0 => None,
            1 => errs.pop(),
            _ => Some(FollowError::Multiple(errs)),
        }
    }
}

fn join_messages(errs: &[FollowError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_join_empty_and_single() {
        assert!(FollowError::join(vec![]).is_none());

        let joined = FollowError::join(vec![FollowError::PriceOutOfRange]).unwrap();
        assert!(matches!(joined, FollowError::PriceOutOfRange));
    }

    #[test]
    fn test_join_preserves_all_messages() {
        let joined = FollowError::join(vec![
            FollowError::Storage("write failed".to_string()),
            FollowError::UnknownSymbol("BTCUSDT".to_string()),
        ])
        .unwrap();

        let msg = joined.to_string();
        assert!(msg.contains("write failed"));
        assert!(msg.contains("unknown symbol: BTCUSDT"));
    }

    #[test]
    fn test_breaking_classification() {
        assert!(!FollowError::PriceOutOfRange.breaking());
        assert!(!FollowError::Plot(PlotError::OutOfRange).breaking());
        assert!(FollowError::Plot(PlotError::Protection(0.0)).breaking());
        assert!(FollowError::Storage("oops".to_string()).breaking());
        assert!(FollowError::Venue {
            code: -1102,
            message: "mandatory parameter was not sent".to_string()
        }
        .breaking());
    }
}
