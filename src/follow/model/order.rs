//! Order types.
//!
//! An [`Order`] is the user's declared intent: what to trade, which way, how
//! much, and the plot its price follows. The venue-side counterpart is the
//! [`ExchangeOrder`] value record, a small serializable snapshot of the live
//! order the engine treats as an opaque reference. Venue-native order objects
//! never cross this boundary.
//!
use serde::{Deserialize, Serialize};

use crate::follow::model::follow::Pair;
use crate::follow::plot::{Plot, PlotError, PlotSpec};

/// Domain order types. `TAKE_PROFIT` and `STOP_LOSS` are mapped to
/// venue-specific trigger orders by the exchange adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "LIMIT")]
    Limit,
    #[serde(rename = "MARKET")]
    Market,
    #[serde(rename = "TAKE_PROFIT")]
    TakeProfit,
    #[serde(rename = "STOP_LOSS")]
    StopLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Domain order status, derived from the venue status via a fixed mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "CANCELED")]
    Canceled,
}

/// Venue order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,
    #[serde(rename = "FILLED")]
    Filled,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl ExchangeOrderStatus {
    /// Whether the venue will never transition this order again.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            ExchangeOrderStatus::New | ExchangeOrderStatus::PartiallyFilled
        )
    }
}

impl From<ExchangeOrderStatus> for OrderStatus {
    fn from(eos: ExchangeOrderStatus) -> Self {
        match eos {
            ExchangeOrderStatus::New | ExchangeOrderStatus::PartiallyFilled => OrderStatus::Active,
            ExchangeOrderStatus::Filled => OrderStatus::Done,
            ExchangeOrderStatus::Canceled
            | ExchangeOrderStatus::Rejected
            | ExchangeOrderStatus::Expired => OrderStatus::Canceled,
        }
    }
}

/// Last-known venue state of an order, kept as a small value record.
///
/// The `id`/`symbol` pair is what adapters need to address the live order;
/// everything else is a snapshot for persistence, no-op detection and webhook
/// payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeOrder {
    pub id: String,
    pub status: ExchangeOrderStatus,
    #[serde(rename = "type")]
    pub order_type: String,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub stop_price: f64,
    pub base_quantity: f64,
}

/// Relation predicate condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationCondition {
    #[serde(rename = "EQUAL")]
    Equal,
    #[serde(rename = "NOT_EQUAL")]
    NotEqual,
}

/// A predicate over a sibling order's status that gates whether this order
/// participates in a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRelation {
    pub order_name: String,
    pub status: OrderStatus,
    pub condition: RelationCondition,
}

impl StatusRelation {
    /// Evaluates the predicate against the referenced sibling's status.
    pub fn holds(&self, sibling_status: OrderStatus) -> bool {
        match self.condition {
            RelationCondition::Equal => sibling_status == self.status,
            RelationCondition::NotEqual => sibling_status != self.status,
        }
    }
}

/// A user-declared order intent tracked by a follow.
///
/// Sizing: exactly one of `base_quantity` or `quote_quantity` is non-zero.
/// The parsed plot is transient: it is rebuilt from `plot_spec` on every
/// load via [`Order::plot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub name: String,
    pub pair: Pair,
    pub status: OrderStatus,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quote_quantity: f64,
    pub base_quantity: f64,
    pub close_position: bool,
    pub reduce_only: bool,
    #[serde(default)]
    pub relations: Vec<StatusRelation>,
    pub plot_spec: PlotSpec,
    pub exchange_hash: String,
    pub exchange_order: Option<ExchangeOrder>,
}

impl Order {
    /// Rebuilds the evaluatable plot from the persisted spec.
    pub fn plot(&self) -> Result<Plot, PlotError> {
        self.plot_spec.build()
    }

    /// Effective base quantity at an evaluated price: the declared base
    /// quantity if set, otherwise the quote quantity converted at `price`.
    pub fn effective_base_quantity(&self, price: f64) -> f64 {
        if self.base_quantity != 0.0 {
            self.base_quantity
        } else {
            self.quote_quantity / price
        }
    }

    /// Whether the order still needs to be placed on the venue.
    pub fn needs_create(&self) -> bool {
        self.exchange_order.is_none()
    }

    /// Whether the venue order exists and can still change.
    pub fn is_live(&self) -> bool {
        self.exchange_order
            .as_ref()
            .map_or(false, |eo| !eo.status.is_terminal())
    }
}
