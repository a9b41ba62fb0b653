use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{OrderStore, PaymentStore};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Converts a staleness window into the newest `updated_at` that still counts as stuck.
pub(crate) fn stuck_cutoff(older_than: Duration) -> Result<DateTime<Utc>> {
    let window = chrono::Duration::from_std(older_than)
        .map_err(|e| SettlementError::Validation(format!("staleness threshold: {}", e)))?;
    Utc::now().checked_sub_signed(window).ok_or_else(|| {
        SettlementError::Validation(format!(
            "staleness threshold {:?} reaches before the earliest representable time",
            older_than
        ))
    })
}

/// A thread-safe in-memory store for orders.
///
/// Uses `Arc<RwLock<HashMap<Uuid, Order>>>`. Conditional updates hold the write
/// lock across the read-compare-write, which makes each one atomic.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a row as-is. Lets tests age an order past the staleness threshold.
    pub async fn put(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn create(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(SettlementError::Persistence(format!(
                "order {} already exists",
                order.id
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        expected: OrderStatus,
    ) -> Result<bool> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(SettlementError::NotFound(id))?;
        // Work on a copy so a rejected transition leaves the row untouched.
        let mut updated = order.clone();
        let applied = updated.transition(new_status, expected, Utc::now())?;
        if applied {
            *order = updated;
        }
        Ok(applied)
    }

    async fn find_stuck(&self, older_than: Duration) -> Result<Vec<Order>> {
        let cutoff = stuck_cutoff(older_than)?;
        let orders = self.orders.read().await;
        let mut stuck: Vec<Order> = orders
            .values()
            .filter(|o| o.is_stuck(cutoff))
            .cloned()
            .collect();
        stuck.sort_by_key(|o| o.updated_at);
        Ok(stuck)
    }
}

/// A thread-safe in-memory store for payment attempts.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<Uuid, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(SettlementError::Persistence(format!(
                "payment {} already exists",
                payment.id
            )));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        gateway_ref: Option<&str>,
    ) -> Result<usize> {
        let now = Utc::now();
        let mut payments = self.payments.write().await;
        let mut changed = 0;
        for payment in payments
            .values_mut()
            .filter(|p| p.order_id == order_id && !p.status.is_terminal())
        {
            payment.record(status, gateway_ref, now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn find_processing_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.status == PaymentStatus::Processing && p.created_at < before)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        found.truncate(limit);
        Ok(found)
    }
}
