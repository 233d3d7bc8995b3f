//! Port definitions the engine is written against.
//!
//! Three async contracts isolate the engine from everything remote:
//!
//! - [`Exchange`]: the venue, covering order lifecycle plus all venue-specific
//!     arithmetic (filters, order-type mapping, modify-vs-recreate policy).
//! - [`Repository`]: the durable store for follows and orders. Persisted
//!     records are the source of truth across ticks; the engine reloads them
//!     at every tick and requires only create/get/update.
//! - [`Publisher`]: one-shot delivery of follow-update documents.
//!
use async_trait::async_trait;

use crate::follow::error::Result;
use crate::follow::model::{ExchangeOrder, Follow, Order, OrderSide, OrderType, Pair};

/// Parameters for placing a new venue order.
///
/// `price` carries the evaluated plot price; for trigger orders the adapter
/// maps it onto the venue's stop-price field.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub pair: Pair,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub base_quantity: f64,
    pub price: f64,
    pub stop_price: f64,
    pub reduce_only: bool,
    pub close_position: bool,
}

/// Parameters for bringing an existing venue order to new values. The
/// embedded [`ExchangeOrder`] identifies the order on the venue; the flags
/// ride along for adapters whose "modify" is a cancel-and-recreate.
#[derive(Debug, Clone)]
pub struct ModifyOrderRequest {
    pub exchange_order: ExchangeOrder,
    pub base_quantity: f64,
    pub price: f64,
    pub stop_price: f64,
    pub reduce_only: bool,
    pub close_position: bool,
}

/// Abstract venue contract.
///
/// Implementations own every venue-specific concern: symbol composition,
/// price/quantity filters, order-type mapping and whether a modification is
/// native or a cancel-and-recreate. Errors must be mapped onto the semantic
/// kinds in [`crate::follow::error::FollowError`], in particular the
/// retriable `PriceOutOfRange` and the no-op "nothing to modify" success.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Preflight: check credentials/connectivity and warm venue metadata.
    async fn init(&self) -> Result<()>;

    /// Fetches the current venue state of an order.
    async fn get_order(&self, exchange_order: &ExchangeOrder) -> Result<ExchangeOrder>;

    async fn create_order(&self, req: CreateOrderRequest) -> Result<ExchangeOrder>;

    async fn modify_order(&self, req: ModifyOrderRequest) -> Result<ExchangeOrder>;

    /// Cancels an order, returning its final state. Cancelling an order that
    /// has already filled is a no-op success returning the filled state.
    async fn cancel_order(&self, exchange_order: &ExchangeOrder) -> Result<ExchangeOrder>;
}

/// Durable store for follows and orders, keyed by id, full-replacement
/// updates.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_follow(&self, follow: &Follow) -> Result<()>;
    async fn get_follow(&self, follow_id: &str) -> Result<Follow>;
    async fn update_follow(&self, follow: &Follow) -> Result<()>;

    async fn create_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, order_id: &str) -> Result<Order>;
    async fn update_order(&self, order: &Order) -> Result<()>;
}

/// A follow-update document published after each tick.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FollowUpdate {
    pub follow: Follow,
    pub orders: Vec<Order>,
}

/// One-shot delivery of follow updates. Callers never await delivery for
/// tick success; failures are logged and dropped.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_follow_update(&self, update: FollowUpdate) -> Result<()>;
}
