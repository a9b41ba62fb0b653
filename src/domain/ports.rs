use super::order::{Amount, Order, OrderStatus};
use super::payment::{Payment, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Persistence for orders.
///
/// Every mutating call is one atomic unit scoped to a single order row: it
/// either commits entirely or leaves nothing behind.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>>;

    /// Inserts a new order. Fails with `Persistence` if the id is taken.
    async fn create(&self, order: &Order) -> Result<()>;

    /// Compare-and-swap on the status column.
    ///
    /// Writes `new_status` only if the row is currently `expected`. Returns
    /// `Ok(false)` when the precondition does not hold; callers treat that as
    /// a no-op. A missing row is `NotFound`.
    async fn update_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        expected: OrderStatus,
    ) -> Result<bool>;

    /// `PENDING` orders whose last update is at least `older_than` in the past.
    async fn find_stuck(&self, older_than: Duration) -> Result<Vec<Order>>;

    /// Succeeds when the backend can serve requests.
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Audit trail of charge attempts. Not consulted for correctness.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: &Payment) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;

    /// All attempts for an order, oldest first.
    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<Payment>>;

    /// Moves every non-terminal attempt of `order_id` to `status`.
    ///
    /// Returns how many rows changed.
    async fn update_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        gateway_ref: Option<&str>,
    ) -> Result<usize>;

    /// Attempts still `PROCESSING` that were created before `before`.
    async fn find_processing_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Payment>>;

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// The external payment processor, addressed by idempotency token.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges `amount` under `token`.
    ///
    /// Once a token's outcome has been resolved, repeating the call returns the
    /// same answer without charging again. `Ok(false)` and `GatewayDeclined`
    /// both mean no money moved. `GatewayTransport` means the caller does not
    /// know.
    async fn charge(&self, amount: Amount, token: Uuid) -> Result<bool>;

    /// Whether money actually moved for `token`. Unknown tokens are `false`.
    async fn check_status(&self, token: Uuid) -> Result<bool>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
