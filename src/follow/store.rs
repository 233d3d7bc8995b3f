//! In-memory repository.
//!
//! Mutex-guarded maps behind the [`Repository`] port. Tests run against it,
//! and embedders that bring no durable store can use it directly, with the
//! obvious caveat that follows do not survive a restart.
//!
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::follow::error::{FollowError, Result};
use crate::follow::model::{Follow, Order};
use crate::follow::ports::Repository;

/// A [`Repository`] over in-process maps.
#[derive(Default)]
pub struct MemoryStore {
    follows: Mutex<HashMap<String, Follow>>,
    orders: Mutex<HashMap<String, Order>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn follows(&self) -> std::sync::MutexGuard<'_, HashMap<String, Follow>> {
        match self.follows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn orders(&self) -> std::sync::MutexGuard<'_, HashMap<String, Order>> {
        match self.orders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn create_follow(&self, follow: &Follow) -> Result<()> {
        let mut follows = self.follows();
        if follows.contains_key(&follow.id) {
            return Err(FollowError::Storage(format!(
                "follow already exists: {}",
                follow.id
            )));
        }
        follows.insert(follow.id.clone(), follow.clone());
        Ok(())
    }

    async fn get_follow(&self, follow_id: &str) -> Result<Follow> {
        self.follows()
            .get(follow_id)
            .cloned()
            .ok_or_else(|| FollowError::FollowNotFound(follow_id.to_string()))
    }

    async fn update_follow(&self, follow: &Follow) -> Result<()> {
        let mut follows = self.follows();
        if !follows.contains_key(&follow.id) {
            return Err(FollowError::Storage(format!(
                "follow does not exist: {}",
                follow.id
            )));
        }
        follows.insert(follow.id.clone(), follow.clone());
        Ok(())
    }

    async fn create_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders();
        if orders.contains_key(&order.id) {
            return Err(FollowError::Storage(format!(
                "order already exists: {}",
                order.id
            )));
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.orders()
            .get(order_id)
            .cloned()
            .ok_or_else(|| FollowError::Storage(format!("order not found: {order_id}")))
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders();
        if !orders.contains_key(&order.id) {
            return Err(FollowError::Storage(format!(
                "order does not exist: {}",
                order.id
            )));
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(())
    }
}
