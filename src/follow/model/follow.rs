//! Follow control entity and the traded pair.
//!
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::follow::error::FollowError;

/// A traded asset pair with opaque base/quote codes.
///
/// The wire form is `"<base>-<quote>"`; how the two codes compose into a
/// venue symbol is up to the exchange adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = FollowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('-').collect::<Vec<_>>().as_slice() {
            [base, quote] if !base.is_empty() && !quote.is_empty() => Ok(Pair {
                base: base.to_string(),
                quote: quote.to_string(),
            }),
            _ => Err(FollowError::Parse(format!("invalid symbol: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowStatus {
    /// Created, first reconcile tick not yet persisted.
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "STOPPED")]
    Stopped,
}

/// The control entity binding a symbol, interval, order set and webhook.
///
/// The interval is kept in its textual form (`"4h"`, `"1d"`, ...); it is the
/// canonical value persisted, published and re-parsed by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub status: FollowStatus,
    pub pair: Pair,
    pub interval: String,
    #[serde(rename = "exchangeHash")]
    pub exchange_hash: String,
    #[serde(rename = "webhookURL")]
    pub webhook_url: String,
    #[serde(rename = "orderIDs")]
    pub order_ids: Vec<String>,
}
