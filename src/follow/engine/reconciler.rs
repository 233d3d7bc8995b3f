//! The per-tick reconciliation state machine.
//!
//! A tick brings the live venue state of every order in a follow into
//! agreement with its plot, evaluated at the tick instant. The reconciler is
//! stateless across ticks on purpose: each tick reloads the persisted follow
//! and orders, so out-of-band updates to the records are picked up and no
//! in-memory continuity is required between ticks.
//!
//! Within a tick the create pass precedes the modify pass, and each pass
//! walks orders sequentially in `order_ids` order; a single venue account is
//! rate limited, so there is nothing to win by hammering it concurrently.
//!
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::follow::engine::registry::Registry;
use crate::follow::error::{FollowError, Result};
use crate::follow::model::{Follow, Order, OrderStatus, OrderType};
use crate::follow::ports::{
    CreateOrderRequest, Exchange, FollowUpdate, ModifyOrderRequest, Publisher, Repository,
};

/// Executes reconcile ticks for follows.
///
/// Shared by the immediate first tick run at follow creation and by every
/// scheduled tick thereafter.
pub struct Reconciler {
    store: Arc<dyn Repository>,
    publisher: Arc<dyn Publisher>,
    registry: Arc<Registry>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Repository>,
        publisher: Arc<dyn Publisher>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            store,
            publisher,
            registry,
        }
    }

    /// Runs one reconcile tick for `follow_id` at the tick instant `t`.
    ///
    /// A follow-update snapshot is published after the tick whether it
    /// succeeded or not; publishing is fire-and-forget and never affects the
    /// tick result.
    pub async fn tick(
        &self,
        follow_id: &str,
        exchange: &dyn Exchange,
        t: DateTime<Utc>,
    ) -> Result<()> {
        debug!(follow_id, tick = %t, "handling tick");

        let follow = self.store.get_follow(follow_id).await?;
        let mut orders = self.load_orders(&follow).await?;
        self.registry.set_orders(follow_id, orders.clone());

        let result = self
            .reconcile_orders(follow_id, &mut orders, exchange, t)
            .await;

        self.spawn_publish(follow, orders);

        result
    }

    /// Loads every order of the follow from the store, in `order_ids` order.
    async fn load_orders(&self, follow: &Follow) -> Result<Vec<Order>> {
        let mut orders = Vec::with_capacity(follow.order_ids.len());
        for order_id in &follow.order_ids {
            orders.push(self.store.get_order(order_id).await?);
        }
        Ok(orders)
    }

    async fn reconcile_orders(
        &self,
        follow_id: &str,
        orders: &mut [Order],
        exchange: &dyn Exchange,
        t: DateTime<Utc>,
    ) -> Result<()> {
        // Partition up front: an order placed by this tick's create pass must
        // not be re-priced by the same tick's modify pass. Terminal orders
        // fall into neither set and are never touched again.
        let to_create: Vec<usize> = indexes_where(orders, Order::needs_create);
        let to_modify: Vec<usize> = indexes_where(orders, Order::is_live);

        if let Err(e) = self
            .create_pass(follow_id, orders, &to_create, exchange, t)
            .await
        {
            return Err(self.fail_tick(follow_id, orders, exchange, e).await);
        }
        if let Err(e) = self
            .modify_pass(follow_id, orders, &to_modify, exchange, t)
            .await
        {
            return Err(self.fail_tick(follow_id, orders, exchange, e).await);
        }
        Ok(())
    }

    /// Places venue orders for every order that has none yet.
    ///
    /// Non-breaking errors (see [`FollowError::breaking`]) skip or defer the
    /// affected order without failing the pass; anything else is breaking.
    async fn create_pass(
        &self,
        follow_id: &str,
        orders: &mut [Order],
        to_create: &[usize],
        exchange: &dyn Exchange,
        t: DateTime<Utc>,
    ) -> Result<()> {
        for &idx in to_create {
            if !relations_hold(&orders[idx], orders) {
                debug!(order = %orders[idx].name, "relations not satisfied, skipping");
                continue;
            }

            let price = match evaluate(&orders[idx], t)? {
                Some(price) => price,
                None => {
                    debug!(order = %orders[idx].name, "plot out of range, skipping create");
                    continue;
                }
            };

            let (price_arg, stop_arg) = price_fields(orders[idx].order_type, price);
            let req = CreateOrderRequest {
                pair: orders[idx].pair.clone(),
                order_type: orders[idx].order_type,
                side: orders[idx].side,
                base_quantity: orders[idx].effective_base_quantity(price),
                price: price_arg,
                stop_price: stop_arg,
                reduce_only: orders[idx].reduce_only,
                close_position: orders[idx].close_position,
            };

            match exchange.create_order(req).await {
                Ok(eo) => {
                    debug!(order = %orders[idx].name, exchange_order = %eo.id, "order created");
                    orders[idx].status = eo.status.into();
                    orders[idx].exchange_order = Some(eo);
                    self.persist(follow_id, &orders[idx]).await?;
                }
                Err(e) if !e.breaking() => {
                    debug!(order = %orders[idx].name, error = %e, "deferring create");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Refreshes and re-prices every live venue order.
    ///
    /// The venue state is fetched first so fills and cancellations observed
    /// since the last tick land in the store; orders that turn out terminal
    /// are left alone from then on.
    async fn modify_pass(
        &self,
        follow_id: &str,
        orders: &mut [Order],
        to_modify: &[usize],
        exchange: &dyn Exchange,
        t: DateTime<Utc>,
    ) -> Result<()> {
        for &idx in to_modify {
            if !relations_hold(&orders[idx], orders) {
                debug!(order = %orders[idx].name, "relations not satisfied, skipping");
                continue;
            }

            let Some(eo) = orders[idx].exchange_order.clone() else {
                continue;
            };

            let refreshed = exchange.get_order(&eo).await?;
            let terminal = refreshed.status.is_terminal();
            orders[idx].status = refreshed.status.into();
            orders[idx].exchange_order = Some(refreshed.clone());
            self.persist(follow_id, &orders[idx]).await?;

            if terminal {
                debug!(order = %orders[idx].name, status = ?orders[idx].status, "order finished");
                continue;
            }

            let price = match evaluate(&orders[idx], t)? {
                Some(price) => price,
                None => {
                    debug!(order = %orders[idx].name, "plot out of range, skipping modify");
                    continue;
                }
            };

            let (price_arg, stop_arg) = price_fields(orders[idx].order_type, price);
            let req = ModifyOrderRequest {
                exchange_order: refreshed,
                base_quantity: orders[idx].effective_base_quantity(price),
                price: price_arg,
                stop_price: stop_arg,
                reduce_only: orders[idx].reduce_only,
                close_position: orders[idx].close_position,
            };

            match exchange.modify_order(req).await {
                Ok(eo) => {
                    orders[idx].status = eo.status.into();
                    orders[idx].exchange_order = Some(eo);
                    self.persist(follow_id, &orders[idx]).await?;
                }
                Err(e) if !e.breaking() => {
                    debug!(order = %orders[idx].name, error = %e, "deferring modify");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Breaking-error cleanup: best-effort cancel of every exchange-bound
    /// order, joining all failures onto the original cause.
    async fn fail_tick(
        &self,
        follow_id: &str,
        orders: &mut [Order],
        exchange: &dyn Exchange,
        cause: FollowError,
    ) -> FollowError {
        error!(error = %cause, "breaking error, cancelling follow orders");

        let mut errs = vec![cause];
        for order in orders.iter_mut() {
            let Some(eo) = order.exchange_order.clone() else {
                continue;
            };
            match exchange.cancel_order(&eo).await {
                Ok(final_eo) => {
                    order.status = final_eo.status.into();
                    order.exchange_order = Some(final_eo);
                    if let Err(e) = self.persist(follow_id, order).await {
                        errs.push(e);
                    }
                }
                Err(e) => errs.push(e),
            }
        }

        match FollowError::join(errs) {
            Some(e) => e,
            None => FollowError::from("tick failed"),
        }
    }

    /// Writes an order mutation through to the store and to the follow's
    /// registry snapshot.
    async fn persist(&self, follow_id: &str, order: &Order) -> Result<()> {
        self.store.update_order(order).await?;
        self.registry.set_order(follow_id, order.clone());
        Ok(())
    }

    fn spawn_publish(&self, follow: Follow, orders: Vec<Order>) {
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            let follow_id = follow.id.clone();
            if let Err(e) = publisher
                .publish_follow_update(FollowUpdate { follow, orders })
                .await
            {
                error!(follow_id, error = %e, "error publishing follow update");
            }
        });
    }
}

fn indexes_where(orders: &[Order], pred: impl Fn(&Order) -> bool) -> Vec<usize> {
    orders
        .iter()
        .enumerate()
        .filter(|(_, o)| pred(o))
        .map(|(idx, _)| idx)
        .collect()
}

/// Evaluates the order's plot at `t`.
///
/// `Ok(None)` is the out-of-range case the caller skips over; breaking
/// failures (protection, invalid construction) propagate as errors. The
/// skip-or-break decision is [`FollowError::breaking`]'s.
fn evaluate(order: &Order, t: DateTime<Utc>) -> Result<Option<f64>> {
    match order.plot()?.at(t) {
        Ok(price) => Ok(Some(price)),
        Err(e) => {
            let err = FollowError::from(e);
            if err.breaking() {
                Err(err)
            } else {
                Ok(None)
            }
        }
    }
}

/// Routes the evaluated price onto the venue's price or stop-price field
/// depending on the domain order type.
fn price_fields(order_type: OrderType, price: f64) -> (f64, f64) {
    match order_type {
        OrderType::Limit | OrderType::Market => (price, 0.0),
        OrderType::TakeProfit | OrderType::StopLoss => (0.0, price),
    }
}

/// Evaluates the relation predicates of an order against the in-memory
/// snapshot of its siblings. A predicate referencing an unknown sibling
/// fails.
fn relations_hold(order: &Order, orders: &[Order]) -> bool {
    order.relations.iter().all(|rel| {
        sibling_status(&rel.order_name, orders)
            .map_or(false, |status| rel.holds(status))
    })
}

fn sibling_status(name: &str, orders: &[Order]) -> Option<OrderStatus> {
    orders.iter().find(|o| o.name == name).map(|o| o.status)
}


#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::test_utils::{Call, MockExchange, RecordingPublisher};
    use super::*;
    use crate::follow::model::order::test_utils::test_order;
    use crate::follow::model::{
        ExchangeOrder, ExchangeOrderStatus, FollowStatus, OrderSide, RelationCondition,
        StatusRelation,
    };
    use crate::follow::plot::parse::PointSpec;
    use crate::follow::plot::PlotSpec;
    use crate::follow::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        publisher: Arc<RecordingPublisher>,
        registry: Arc<Registry>,
        exchange: MockExchange,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let registry = Arc::new(Registry::new());
        let reconciler = Reconciler::new(store.clone(), publisher.clone(), registry.clone());
        Fixture {
            store,
            publisher,
            registry,
            exchange: MockExchange::new(),
            reconciler,
        }
    }

    fn tick_instant() -> DateTime<Utc> {
        // Mid-2023, comfortably inside the fixture plots' fitted range.
        Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()
    }

    async fn seed(fx: &Fixture, orders: Vec<Order>) -> Follow {
        let follow = Follow {
            id: "f-1".to_string(),
            status: FollowStatus::Active,
            pair: "BTC-USDT".parse().unwrap(),
            interval: "4h".to_string(),
            exchange_hash: "abc".to_string(),
            webhook_url: String::new(),
            order_ids: orders.iter().map(|o| o.id.clone()).collect(),
        };
        fx.store.create_follow(&follow).await.unwrap();
        for order in &orders {
            fx.store.create_order(order).await.unwrap();
        }
        let (stop, _rx) = crate::follow::engine::interval::stop_channel();
        fx.registry.insert("f-1", stop, orders);
        follow
    }

    fn order_named(id: &str, name: &str) -> Order {
        let mut order = test_order();
        order.id = id.to_string();
        order.name = name.to_string();
        order
    }

    async fn wait_for_publishes(publisher: &RecordingPublisher, n: usize) {
        for _ in 0..100 {
            if publisher.count() >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("expected {n} published updates, got {}", publisher.count());
    }

    #[tokio::test]
    async fn test_create_pass_places_missing_orders() {
        let fx = fixture();
        seed(
            &fx,
            vec![order_named("o-1", "entry"), order_named("o-2", "tp")],
        )
        .await;

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();

        assert_eq!(fx.exchange.creates(), 2);

        let entry = fx.store.get_order("o-1").await.unwrap();
        assert_eq!(entry.status, OrderStatus::Active);
        let eo = entry.exchange_order.unwrap();
        assert_eq!(eo.symbol, "BTCUSDT");
        assert!(eo.price > 0.0);

        // Snapshot in the registry reflects the tick.
        let snapshot = fx.registry.orders_snapshot("f-1").unwrap();
        assert!(snapshot.iter().all(|o| o.exchange_order.is_some()));

        wait_for_publishes(&fx.publisher, 1).await;
    }

    #[tokio::test]
    async fn test_tick_twice_is_idempotent() {
        let fx = fixture();
        seed(&fx, vec![order_named("o-1", "entry")]).await;

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        let after_first = fx.store.get_order("o-1").await.unwrap();

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        let after_second = fx.store.get_order("o-1").await.unwrap();

        // One create; the second tick re-prices the same live order to the
        // same values.
        assert_eq!(fx.exchange.creates(), 1);
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_out_of_range_plot_defers_creation() {
        let fx = fixture();
        let mut order = order_named("o-1", "entry");
        // Window opens two hours after the first tick instant.
        order.plot_spec = PlotSpec::Limit {
            since: Some("2023-06-01 14:00:00".to_string()),
            until: None,
            plot: Box::new(order.plot_spec.clone()),
        };
        seed(&fx, vec![order]).await;

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert_eq!(fx.exchange.creates(), 0);
        assert_eq!(
            fx.store.get_order("o-1").await.unwrap().status,
            OrderStatus::Pending
        );

        // Next aligned tick falls inside the window: created exactly once.
        let later = Utc.with_ymd_and_hms(2023, 6, 1, 16, 0, 0).unwrap();
        fx.reconciler
            .tick("f-1", &fx.exchange, later)
            .await
            .unwrap();
        assert_eq!(fx.exchange.creates(), 1);
        assert_eq!(
            fx.store.get_order("o-1").await.unwrap().status,
            OrderStatus::Active
        );
    }

    #[tokio::test]
    async fn test_venue_price_rejection_defers_order() {
        let fx = fixture();
        seed(&fx, vec![order_named("o-1", "entry")]).await;

        fx.exchange
            .script_create_errors(vec![Some(FollowError::PriceOutOfRange)]);

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert!(fx.store.get_order("o-1").await.unwrap().needs_create());

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert!(!fx.store.get_order("o-1").await.unwrap().needs_create());
    }

    #[tokio::test]
    async fn test_breaking_create_error_cancels_bound_orders() {
        let fx = fixture();
        seed(
            &fx,
            vec![order_named("o-1", "entry"), order_named("o-2", "tp")],
        )
        .await;

        fx.exchange.script_create_errors(vec![
            None,
            Some(FollowError::Venue {
                code: -2019,
                message: "margin is insufficient".to_string(),
            }),
        ]);

        let err = fx
            .reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("margin is insufficient"));

        // The order bound before the failure was issued a cancel.
        assert_eq!(fx.exchange.cancels(), vec!["eo-1".to_string()]);

        let entry = fx.store.get_order("o-1").await.unwrap();
        assert_eq!(entry.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_failures_are_joined_not_swallowed() {
        let fx = fixture();
        let mut bound = order_named("o-1", "entry");
        bound.exchange_order = Some(ExchangeOrder {
            id: "eo-77".to_string(),
            status: ExchangeOrderStatus::New,
            order_type: "LIMIT".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            price: 100.0,
            stop_price: 0.0,
            base_quantity: 0.01,
        });
        bound.status = OrderStatus::Active;
        seed(&fx, vec![bound, order_named("o-2", "tp")]).await;

        fx.exchange.script_create_errors(vec![Some(FollowError::Venue {
            code: -1021,
            message: "timestamp outside recvWindow".to_string(),
        })]);
        // The cleanup cancel of the already-bound order fails as well.
        fx.exchange.script_cancel_errors(vec![Some(FollowError::Venue {
            code: -1001,
            message: "internal error".to_string(),
        })]);

        let err = fx
            .reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap_err();

        // Both the cause and the cancel failure survive the join, and the
        // cancel was still attempted.
        let msg = err.to_string();
        assert!(msg.contains("recvWindow"));
        assert!(msg.contains("internal error"));
        assert_eq!(fx.exchange.cancels(), vec!["eo-77".to_string()]);
    }

    #[tokio::test]
    async fn test_modify_pass_reprices_live_orders() {
        let fx = fixture();
        seed(&fx, vec![order_named("o-1", "entry")]).await;

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        let first_price = fx
            .store
            .get_order("o-1")
            .await
            .unwrap()
            .exchange_order
            .unwrap()
            .price;

        // A later tick evaluates the line higher up.
        let later = Utc.with_ymd_and_hms(2023, 9, 1, 12, 0, 0).unwrap();
        fx.reconciler
            .tick("f-1", &fx.exchange, later)
            .await
            .unwrap();

        let modified = fx.store.get_order("o-1").await.unwrap();
        let eo = modified.exchange_order.unwrap();
        assert!(eo.price > first_price);
        assert!(fx
            .exchange
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Modify { id, .. } if id == "eo-1")));
    }

    #[tokio::test]
    async fn test_filled_order_is_left_alone() {
        let fx = fixture();
        seed(&fx, vec![order_named("o-1", "entry")]).await;

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();

        // Venue reports the order filled between ticks.
        fx.exchange.set_state("eo-1", ExchangeOrderStatus::Filled);
        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();

        let order = fx.store.get_order("o-1").await.unwrap();
        assert_eq!(order.status, OrderStatus::Done);

        // Once terminal, later ticks neither fetch nor modify it.
        let calls_before = fx.exchange.calls().len();
        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert_eq!(fx.exchange.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_relation_gates_order_until_sibling_matches() {
        let fx = fixture();
        let entry = order_named("o-1", "entry");
        let mut tp = order_named("o-2", "tp");
        tp.relations = vec![StatusRelation {
            order_name: "entry".to_string(),
            status: OrderStatus::Done,
            condition: RelationCondition::Equal,
        }];
        seed(&fx, vec![entry, tp]).await;

        // Entry is created; tp is gated on the entry being done.
        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert_eq!(fx.exchange.creates(), 1);

        // The entry fills; the refresh in this tick persists DONE, and the
        // following tick's create pass sees it.
        fx.exchange.set_state("eo-1", ExchangeOrderStatus::Filled);
        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert_eq!(fx.exchange.creates(), 1);

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert_eq!(fx.exchange.creates(), 2);
    }

    #[tokio::test]
    async fn test_relation_to_unknown_sibling_gates_forever() {
        let fx = fixture();
        let mut order = order_named("o-1", "entry");
        order.relations = vec![StatusRelation {
            order_name: "ghost".to_string(),
            status: OrderStatus::Done,
            condition: RelationCondition::NotEqual,
        }];
        seed(&fx, vec![order]).await;

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();
        assert_eq!(fx.exchange.creates(), 0);
    }

    #[test]
    fn test_price_fields_by_order_type() {
        assert_eq!(price_fields(OrderType::Limit, 7.0), (7.0, 0.0));
        assert_eq!(price_fields(OrderType::Market, 7.0), (7.0, 0.0));
        assert_eq!(price_fields(OrderType::TakeProfit, 7.0), (0.0, 7.0));
        assert_eq!(price_fields(OrderType::StopLoss, 7.0), (0.0, 7.0));
    }

    #[tokio::test]
    async fn test_quote_sized_order_converts_at_evaluated_price() {
        let fx = fixture();
        let mut order = order_named("o-1", "entry");
        order.base_quantity = 0.0;
        order.quote_quantity = 1000.0;
        // Flat line at 200 so the conversion is exact.
        order.plot_spec = PlotSpec::Line {
            p0: PointSpec {
                date: "2023-01-01".to_string(),
                price: 200.0,
            },
            p1: PointSpec {
                date: "2023-01-02".to_string(),
                price: 200.0,
            },
        };
        seed(&fx, vec![order]).await;

        fx.reconciler
            .tick("f-1", &fx.exchange, tick_instant())
            .await
            .unwrap();

        let calls = fx.exchange.calls();
        let Some(Call::Create { base_quantity, .. }) = calls
            .iter()
            .find(|c| matches!(c, Call::Create { .. }))
        else {
            panic!("no create call recorded");
        };
        assert_eq!(*base_quantity, 5.0);
    }
}
