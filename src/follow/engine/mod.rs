//! The follow engine.
//!
//! [`FollowService`] is the application entry point: it validates ingress
//! documents, builds the venue adapter for the caller's exchange identity,
//! persists the follow and its orders, runs the immediate first reconcile
//! tick, and starts the per-follow interval loop.
//!
//! # Submodules
//!
//! - `interval`: interval parsing, UTC boundary alignment and the tick loop.
//! - `reconciler`: the per-tick reconciliation state machine.
//! - `registry`: concurrency-safe map of live follows.
//!
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::follow::error::{FollowError, Result};
use crate::follow::exchange;
use crate::follow::model::request::{
    CreateFollowRequest, CreateFollowResponse, ExchangeIdentity, GetFollowRequest,
    GetFollowResponse, StopFollowRequest,
};
use crate::follow::model::{Follow, FollowStatus, Order, OrderStatus, Pair};
use crate::follow::ports::{Exchange, Publisher, Repository};

pub mod interval;
pub mod reconciler;
pub mod registry;

use interval::{IntervalLoop, StopSignal};
use reconciler::Reconciler;
use registry::Registry;

/// Builds a venue adapter for an exchange identity.
///
/// The default factory recognizes the venues shipped with the crate;
/// embedders can swap it to add venues or to inject doubles in tests.
pub type ExchangeFactory =
    Arc<dyn Fn(&ExchangeIdentity, &Path) -> Result<Arc<dyn Exchange>> + Send + Sync>;

/// Configuration for [`FollowService`].
pub struct FollowServiceConfig {
    pub store: Arc<dyn Repository>,
    pub publisher: Arc<dyn Publisher>,
    /// Directory the venue adapters keep their exchange-info caches in.
    pub exchange_info_dir: PathBuf,
}

/// The follow service: create, inspect and stop follows.
pub struct FollowService {
    store: Arc<dyn Repository>,
    registry: Arc<Registry>,
    reconciler: Arc<Reconciler>,
    exchange_info_dir: PathBuf,
    factory: ExchangeFactory,
}

impl FollowService {
    pub fn new(cfg: FollowServiceConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let reconciler = Arc::new(Reconciler::new(
            cfg.store.clone(),
            cfg.publisher,
            registry.clone(),
        ));
        Self {
            store: cfg.store,
            registry,
            reconciler,
            exchange_info_dir: cfg.exchange_info_dir,
            factory: Arc::new(|identity, dir| exchange::from_identity(identity, dir)),
        }
    }

    /// Replaces the venue adapter factory.
    pub fn with_exchange_factory(mut self, factory: ExchangeFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Creates a follow and starts following it.
    ///
    /// The first reconcile tick runs immediately, before this returns: plots
    /// that are out of range and venue price-band rejections leave the
    /// affected orders for a later tick, while any other failure fails the
    /// creation synchronously so the caller sees it.
    pub async fn create_follow(
        &self,
        req: CreateFollowRequest,
        identity: ExchangeIdentity,
    ) -> Result<CreateFollowResponse> {
        let pair: Pair = req.symbol.parse()?;
        let itv = interval::parse_interval(&req.interval)?;
        let exchange_hash = identity.hash();

        let orders = build_orders(&req, &pair, &exchange_hash)?;

        let exchange = (self.factory)(&identity, &self.exchange_info_dir)?;
        exchange.init().await?;

        let follow = Follow {
            id: Uuid::new_v4().to_string(),
            status: FollowStatus::Pending,
            pair,
            interval: req.interval.clone(),
            exchange_hash,
            webhook_url: req.webhook_url.clone(),
            order_ids: orders.iter().map(|o| o.id.clone()).collect(),
        };

        self.store.create_follow(&follow).await?;
        for order in &orders {
            self.store.create_order(order).await?;
        }

        let (stop, stop_rx) = interval::stop_channel();
        self.registry.insert(&follow.id, stop, orders);

        // Immediate first tick, pinned to the start of the current interval.
        let first_tick = interval::interval_start(Utc::now(), itv);
        if let Err(e) = self
            .reconciler
            .tick(&follow.id, exchange.as_ref(), first_tick)
            .await
        {
            self.registry.remove(&follow.id);
            return Err(e);
        }

        let follow = Follow {
            status: FollowStatus::Active,
            ..follow
        };
        self.store.update_follow(&follow).await?;

        info!(follow_id = %follow.id, pair = %follow.pair, interval = %follow.interval, "follow started");
        self.spawn_loop(follow.id.clone(), itv, stop_rx, exchange);

        Ok(CreateFollowResponse {
            follow_id: follow.id,
        })
    }

    /// Returns the persisted follow and its orders.
    pub async fn get_follow(
        &self,
        req: GetFollowRequest,
        identity: ExchangeIdentity,
    ) -> Result<GetFollowResponse> {
        let follow = self.store.get_follow(&req.follow_id).await?;
        identity.verify(&follow.exchange_hash, &follow.id)?;

        let mut orders = Vec::with_capacity(follow.order_ids.len());
        for order_id in &follow.order_ids {
            orders.push(self.store.get_order(order_id).await?);
        }

        Ok(GetFollowResponse { follow, orders })
    }

    /// Stops a live follow.
    ///
    /// Closes the loop's stop signal and marks the follow stopped. With
    /// `cancel_orders` set, every order holding a venue order is issued
    /// exactly one cancel; all cancel failures are joined into the returned
    /// error.
    pub async fn stop_follow(
        &self,
        req: StopFollowRequest,
        identity: ExchangeIdentity,
    ) -> Result<()> {
        if !self.registry.contains(&req.follow_id) {
            return Err(FollowError::FollowNotFound(req.follow_id));
        }

        let follow = self.store.get_follow(&req.follow_id).await?;
        identity.verify(&follow.exchange_hash, &follow.id)?;

        if let Some(stop) = self.registry.remove(&req.follow_id) {
            stop.stop();
        }

        let follow = Follow {
            status: FollowStatus::Stopped,
            ..follow
        };
        self.store.update_follow(&follow).await?;

        if req.cancel_orders {
            self.cancel_follow_orders(&follow, &identity).await?;
        }

        info!(follow_id = %follow.id, "follow stopped");
        Ok(())
    }

    async fn cancel_follow_orders(&self, follow: &Follow, identity: &ExchangeIdentity) -> Result<()> {
        let exchange = (self.factory)(identity, &self.exchange_info_dir)?;
        exchange.init().await?;

        let mut errs = Vec::new();
        for order_id in &follow.order_ids {
            let mut order = match self.store.get_order(order_id).await {
                Ok(order) => order,
                Err(e) => {
                    errs.push(e);
                    continue;
                }
            };
            let Some(eo) = order.exchange_order.clone() else {
                continue;
            };
            match exchange.cancel_order(&eo).await {
                Ok(final_eo) => {
                    order.status = final_eo.status.into();
                    order.exchange_order = Some(final_eo);
                    if let Err(e) = self.store.update_order(&order).await {
                        errs.push(e);
                    }
                }
                Err(e) => errs.push(e),
            }
        }

        match FollowError::join(errs) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn spawn_loop(
        &self,
        follow_id: String,
        itv: Duration,
        stop: StopSignal,
        exchange: Arc<dyn Exchange>,
    ) {
        let reconciler = self.reconciler.clone();
        let loop_follow_id = follow_id.clone();

        tokio::spawn(async move {
            let result = IntervalLoop::new(itv, stop)
                .run(move |tick| {
                    let reconciler = reconciler.clone();
                    let exchange = exchange.clone();
                    let follow_id = loop_follow_id.clone();
                    async move { reconciler.tick(&follow_id, exchange.as_ref(), tick).await }
                })
                .await;

            // The follow record keeps its last persisted status; recovery
            // from a dead loop is operator-driven.
            if let Err(e) = result {
                error!(follow_id = %follow_id, error = %e, "follow loop terminated");
            }
        });
    }
}

fn build_orders(req: &CreateFollowRequest, pair: &Pair, exchange_hash: &str) -> Result<Vec<Order>> {
    if req.orders.is_empty() {
        return Err(FollowError::Parse("no orders in follow request".to_string()));
    }

    let mut orders = Vec::with_capacity(req.orders.len());
    for o in &req.orders {
        if (o.base_quantity != 0.0) == (o.quote_quantity != 0.0) {
            return Err(FollowError::Parse(format!(
                "order {}: exactly one of baseQuantity and quoteQuantity must be set",
                o.name
            )));
        }
        if orders.iter().any(|existing: &Order| existing.name == o.name) {
            return Err(FollowError::Parse(format!(
                "duplicate order name: {}",
                o.name
            )));
        }

        // Surface plot spec problems to the caller now, not at tick time.
        o.plot_spec.build()?;

        orders.push(Order {
            id: Uuid::new_v4().to_string(),
            name: o.name.clone(),
            pair: pair.clone(),
            status: OrderStatus::Pending,
            order_type: o.order_type,
            side: o.side,
            quote_quantity: o.quote_quantity,
            base_quantity: o.base_quantity,
            close_position: o.close_position,
            reduce_only: o.reduce_only,
            relations: o.relations.clone(),
            plot_spec: o.plot_spec.clone(),
            exchange_hash: exchange_hash.to_string(),
            exchange_order: None,
        });
    }
    Ok(orders)
}
