//! Domain model for follows and the orders they maintain.
//!
//! # Submodules and Types
//!
//! - `follow`: the [`Follow`] control entity, its status and the traded
//!     [`Pair`].
//! - `order`: user-declared [`Order`] intents, venue order snapshots and the
//!     status mappings between them.
//! - `request`: boundary documents accepted from and returned to the ingress,
//!     including the out-of-band [`request::ExchangeIdentity`].
//!
pub mod follow;
pub mod order;
pub mod request;

pub use follow::{Follow, FollowStatus, Pair};
pub use order::{
    ExchangeOrder, ExchangeOrderStatus, Order, OrderSide, OrderStatus, OrderType,
    RelationCondition, StatusRelation,
};
