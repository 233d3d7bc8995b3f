//! Registry of live follows.
//!
//! The registry owns both sides of a running follow: the loop's stop handle
//! and the mutable in-memory snapshot of its orders. Loops themselves hold
//! only the follow id and a stop signal; everything else is looked up here.
//! Every operation is serialized, and reads hand out copies; callers that
//! need a consistent multi-order view take it in one call.
//!
use std::collections::HashMap;
use std::sync::Mutex;

use crate::follow::engine::interval::StopHandle;
use crate::follow::model::Order;

struct Entry {
    stop: StopHandle,
    orders: HashMap<String, Order>,
}

/// Concurrency-safe map of follow-id → live loop handle and order snapshot.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a follow with its stop handle and initial order snapshot.
    pub fn insert(&self, follow_id: &str, stop: StopHandle, orders: Vec<Order>) {
        let entry = Entry {
            stop,
            orders: orders.into_iter().map(|o| (o.id.clone(), o)).collect(),
        };
        self.lock().insert(follow_id.to_string(), entry);
    }

    /// Removes a follow, returning its stop handle if it was registered.
    pub fn remove(&self, follow_id: &str) -> Option<StopHandle> {
        self.lock().remove(follow_id).map(|e| e.stop)
    }

    pub fn contains(&self, follow_id: &str) -> bool {
        self.lock().contains_key(follow_id)
    }

    /// Replaces the whole order snapshot of a follow.
    pub fn set_orders(&self, follow_id: &str, orders: Vec<Order>) {
        if let Some(entry) = self.lock().get_mut(follow_id) {
            entry.orders = orders.into_iter().map(|o| (o.id.clone(), o)).collect();
        }
    }

    /// Updates a single order inside a follow's snapshot.
    pub fn set_order(&self, follow_id: &str, order: Order) {
        if let Some(entry) = self.lock().get_mut(follow_id) {
            entry.orders.insert(order.id.clone(), order);
        }
    }

    /// A consistent copy of a follow's order set, taken under one lock hold.
    pub fn orders_snapshot(&self, follow_id: &str) -> Option<Vec<Order>> {
        self.lock()
            .get(follow_id)
            .map(|e| e.orders.values().cloned().collect())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // Entries hold plain data; a poisoned lock would mean a panic while
        // holding it, which nothing here can do.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::follow::engine::interval::stop_channel;
    use crate::follow::model::order::test_utils::test_order;
    use crate::follow::model::OrderStatus;

    #[test]
    fn test_insert_snapshot_remove() {
        let registry = Registry::new();
        let (stop, _rx) = stop_channel();

        registry.insert("f-1", stop, vec![test_order()]);
        assert!(registry.contains("f-1"));

        let snapshot = registry.orders_snapshot("f-1").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "o-1");

        assert!(registry.remove("f-1").is_some());
        assert!(!registry.contains("f-1"));
        assert!(registry.orders_snapshot("f-1").is_none());
        assert!(registry.remove("f-1").is_none());
    }

    #[test]
    fn test_set_order_updates_snapshot_in_place() {
        let registry = Registry::new();
        let (stop, _rx) = stop_channel();
        registry.insert("f-1", stop, vec![test_order()]);

        let mut updated = test_order();
        updated.status = OrderStatus::Active;
        registry.set_order("f-1", updated);

        let snapshot = registry.orders_snapshot("f-1").unwrap();
        assert_eq!(snapshot[0].status, OrderStatus::Active);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = Registry::new();
        let (stop, _rx) = stop_channel();
        registry.insert("f-1", stop, vec![test_order()]);

        let mut snapshot = registry.orders_snapshot("f-1").unwrap();
        snapshot[0].status = OrderStatus::Canceled;

        let fresh = registry.orders_snapshot("f-1").unwrap();
        assert_eq!(fresh[0].status, OrderStatus::Pending);
    }
}
