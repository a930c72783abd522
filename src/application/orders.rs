//! In-memory order book backing the demo endpoints.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::idempotency::lock::mutex_lock;

const LOCK_TARGET: &str = "application::orders";

#[derive(Debug, Clone, Deserialize)]
pub struct OrderInput {
    pub item: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: u64,
    pub item: String,
    pub quantity: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("item must not be empty")]
    EmptyItem,
    #[error("quantity must be greater than zero")]
    ZeroQuantity,
}

#[derive(Debug, Default)]
pub struct OrderBook {
    next_id: AtomicU64,
    orders: Mutex<HashMap<u64, Order>>,
    /// Times a handler reached the book, successful or not.
    calls: AtomicU64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, input: OrderInput) -> Result<Order, OrderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        validate(&input)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let order = Order {
            id,
            item: input.item,
            quantity: input.quantity,
        };
        mutex_lock(&self.orders, LOCK_TARGET, "create").insert(id, order.clone());
        info!(order_id = id, item = %order.item, "order created");
        Ok(order)
    }

    /// Create or replace the order stored under `id`.
    pub fn upsert(&self, id: u64, input: OrderInput) -> Result<Order, OrderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        validate(&input)?;

        let order = Order {
            id,
            item: input.item,
            quantity: input.quantity,
        };
        mutex_lock(&self.orders, LOCK_TARGET, "upsert").insert(id, order.clone());
        self.next_id.fetch_max(id, Ordering::Relaxed);
        info!(order_id = id, item = %order.item, "order replaced");
        Ok(order)
    }

    pub fn get(&self, id: u64) -> Option<Order> {
        mutex_lock(&self.orders, LOCK_TARGET, "get").get(&id).cloned()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

fn validate(input: &OrderInput) -> Result<(), OrderError> {
    if input.item.trim().is_empty() {
        return Err(OrderError::EmptyItem);
    }
    if input.quantity == 0 {
        return Err(OrderError::ZeroQuantity);
    }
    Ok(())
}
