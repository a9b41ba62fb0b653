use super::order::{Amount, Order};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[serde(rename = "INIT")]
    Initiated,
    Processing,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initiated => "INIT",
            Self::Processing => "PROCESSING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Audit record of one charge attempt: what the gateway was asked and what it said.
///
/// Never consulted when reconciling; the gateway's `check_status` is the
/// source of truth.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Amount,
    pub status: PaymentStatus,
    /// Reference the gateway knows this charge by.
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A new attempt for `order`, already handed to the gateway.
    pub fn attempt(order: &Order) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.amount,
            status: PaymentStatus::Processing,
            gateway_ref: Some(order.idempotency_token.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a status change; the existing reference is kept when `gateway_ref` is `None`.
    pub fn record(&mut self, status: PaymentStatus, gateway_ref: Option<&str>, at: DateTime<Utc>) {
        self.status = status;
        if let Some(r) = gateway_ref {
            self.gateway_ref = Some(r.to_string());
        }
        self.updated_at = at;
    }
}
