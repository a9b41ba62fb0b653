use crate::config::SettlementConfig;
use crate::domain::order::{NewOrder, Order, OrderStatus};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{OrderStoreRef, PaymentGatewayRef, PaymentStoreRef};
use crate::error::{Result, SettlementError};
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Drives orders through a single charge attempt.
///
/// The order is only ever written on an unambiguous success. Declines and
/// transport failures are handed back to the caller with the order still
/// `PENDING`; the reconciliation worker settles them later from the gateway's
/// own records.
pub struct CheckoutService {
    orders: OrderStoreRef,
    payments: Option<PaymentStoreRef>,
    gateway: PaymentGatewayRef,
    charge_timeout: Duration,
}

impl CheckoutService {
    /// Creates a new `CheckoutService`.
    ///
    /// # Arguments
    ///
    /// * `orders` - The store holding order rows.
    /// * `gateway` - The payment processor client.
    /// * `config` - Supplies the deadline put on each `charge` call.
    pub fn new(orders: OrderStoreRef, gateway: PaymentGatewayRef, config: &SettlementConfig) -> Self {
        Self {
            orders,
            payments: None,
            gateway,
            charge_timeout: config.charge_timeout,
        }
    }

    /// Records every charge attempt in `payments`.
    pub fn with_payment_store(mut self, payments: PaymentStoreRef) -> Self {
        self.payments = Some(payments);
        self
    }

    /// Persists a new `PENDING` order with a freshly minted idempotency token.
    #[instrument(skip(self, new_order), fields(user_id = %new_order.user_id))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<Order> {
        let order = Order::new(new_order);
        self.orders.create(&order).await?;
        info!(order_id = %order.id, amount = %order.amount, "Order created");
        Ok(order)
    }

    /// Charges the order once and marks it `PAID` if, and only if, the gateway
    /// confirms the charge in its response.
    ///
    /// Retrying after an error is safe: the order keeps its token, so the
    /// gateway answers a repeated charge from its ledger.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn checkout(&self, order_id: Uuid) -> Result<Order> {
        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or(SettlementError::NotFound(order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(SettlementError::InvalidState {
                id: order.id,
                status: order.status,
            });
        }

        self.audit_attempt(&order).await;

        let charged = match tokio::time::timeout(
            self.charge_timeout,
            self.gateway.charge(order.amount, order.idempotency_token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SettlementError::GatewayTransport(format!(
                "no response within {:?}",
                self.charge_timeout
            ))),
        };

        match charged {
            Ok(true) => self.commit_paid(order).await,
            Ok(false) => {
                self.audit_outcome(order.id, PaymentStatus::Failed).await;
                Err(SettlementError::GatewayDeclined(
                    "gateway reports the charge did not go through".to_string(),
                ))
            }
            Err(e @ SettlementError::GatewayDeclined(_)) => {
                info!(token = %order.idempotency_token, "Charge declined; leaving order pending");
                self.audit_outcome(order.id, PaymentStatus::Failed).await;
                Err(e)
            }
            Err(e) => {
                warn!(
                    token = %order.idempotency_token,
                    error = %e,
                    "Charge outcome unknown; leaving order pending for reconciliation"
                );
                Err(e)
            }
        }
    }

    async fn commit_paid(&self, mut order: Order) -> Result<Order> {
        if self
            .orders
            .update_status(order.id, OrderStatus::Paid, OrderStatus::Pending)
            .await?
        {
            info!("Order paid");
            self.audit_outcome(order.id, PaymentStatus::Succeeded).await;
            order.status = OrderStatus::Paid;
            return Ok(order);
        }

        // The reconciliation worker resolved the order between our read and our write.
        let current = self
            .orders
            .find_by_id(order.id)
            .await?
            .ok_or(SettlementError::NotFound(order.id))?;
        match current.status {
            OrderStatus::Paid => Ok(current),
            status => {
                error!(
                    %status,
                    token = %current.idempotency_token,
                    "Gateway charged an order that was already resolved"
                );
                Err(SettlementError::InvalidState {
                    id: current.id,
                    status,
                })
            }
        }
    }

    async fn audit_attempt(&self, order: &Order) {
        if let Some(payments) = &self.payments
            && let Err(e) = payments.create(&Payment::attempt(order)).await
        {
            warn!(error = %e, "Failed to record payment attempt");
        }
    }

    async fn audit_outcome(&self, order_id: Uuid, status: PaymentStatus) {
        if let Some(payments) = &self.payments
            && let Err(e) = payments.update_status(order_id, status, None).await
        {
            warn!(error = %e, %status, "Failed to record payment outcome");
        }
    }
}
