//! Follow module: plot-driven maintenance of live exchange orders.
//!
//! This module provides the plot algebra, the domain model, the per-follow
//! interval scheduler, the reconciliation engine, and the ports through which
//! the engine talks to the outside world (venue, store, webhook).
//!
//! # Submodules
//!
//! - `plot`: time → price curves (lines, log-lines, offsets, limits, min/max)
//!     and the tagged specification format they are parsed from.
//! - `model`: domain entities (pairs, orders, follows) and the ingress
//!     boundary documents.
//! - `ports`: async traits the engine is written against: `Exchange`,
//!     `Repository` and `Publisher`.
//! - `engine`: the follow service: interval alignment, the per-tick
//!     reconciler and the live-follow registry.
//! - `exchange`: venue adapters implementing the `Exchange` port.
//! - `publish`: one-shot webhook publisher implementing the `Publisher` port.
//! - `store`: in-memory `Repository` implementation.
//! - `error`: the crate-wide error type and result alias.
//!
pub mod engine;
pub mod error;
pub mod exchange;
pub mod model;
pub mod plot;
pub mod ports;
pub mod publish;
pub mod store;
