//! **plotfollow** n.: an engine that *follows* a price plot, a time-varying
//! curve assembled from lines, log-lines, offsets and time windows, and keeps
//! a bundle of live exchange orders pinned to it.
//!
//! A user submits a **follow**: a symbol, a re-evaluation interval and a set of
//! orders, each carrying a plot specification. The engine then wakes up at
//! every interval boundary, re-evaluates each order's plot at the boundary
//! instant, and reconciles the live venue order to match: creating it the
//! first time, modifying it where the venue allows, cancelling-and-recreating
//! where it does not. Follow updates are pushed to a user-supplied webhook and
//! a follow can be stopped cleanly, optionally cancelling all live orders.
//!
//! # `plotfollow` Features
//!
//! - **Plot algebra**: immutable, side-effect-free price curves (`line`,
//!    `line_log`, absolute/percentage offsets, half-open time limits, min/max
//!    aggregation) evaluated lazily at any instant.
//! - **Aligned scheduling**: ticks land on UTC interval boundaries with an
//!    adaptive headstart derived from recent tick execution times, so the
//!    venue-side update settles near the boundary itself.
//! - **Venue isolation**: all venue arithmetic (tick size, step size, min
//!    notional, order-type mapping, modify-vs-recreate policy) lives behind an
//!    async [`follow::ports::Exchange`] port; the engine never sees a
//!    venue-native type.
//! - **Asynchronous**: built on the `tokio` runtime; one long-running task
//!    per active follow, short-lived tasks for webhook publishing.
//! - **Distributed logging**: instrumented with the `tracing` crate.
//!
//! # Example:
//! ```ignore
//! use std::sync::Arc;
//!
//! use plotfollow::follow::engine::{FollowService, FollowServiceConfig};
//! use plotfollow::follow::model::request::{CreateFollowRequest, ExchangeIdentity};
//! use plotfollow::follow::publish::WebhookPublisher;
//! use plotfollow::follow::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt()
//!         .with_max_level(tracing::Level::DEBUG)
//!         .init();
//!
//!     dotenv::dotenv().ok();
//!
//!     let service = FollowService::new(FollowServiceConfig {
//!         store: Arc::new(MemoryStore::new()),
//!         publisher: Arc::new(WebhookPublisher::new()),
//!         exchange_info_dir: "data/exchange_infos".into(),
//!     });
//!
//!     let req: CreateFollowRequest = serde_json::from_str(include_str!("follow.json"))?;
//!     let identity = ExchangeIdentity::from_env("BINANCE_FUTURES", "EXCHANGE_CONFIG");
//!
//!     let resp = service.create_follow(req, identity).await?;
//!     println!("following: {}", resp.follow_id);
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Disclaimer
//!
//! * The software is provided "as-is" without any warranties, express or
//!   implied. The authors and contributors do not take responsibility for any
//!   financial losses, damages, or other issues that may arise from the use of
//!   this project.
#![warn(rust_2018_idioms)]

pub mod follow;
