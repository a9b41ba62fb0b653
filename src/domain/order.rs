use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A positive monetary amount to be charged for an order.
///
/// Wraps `rust_decimal::Decimal` so that a zero or negative charge can never be
/// constructed. No currency or rounding rules are attached.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, SettlementError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(SettlementError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = SettlementError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of an order. `Pending` is the only non-terminal state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only `PENDING -> PAID` and `PENDING -> FAILED` exist.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self == Self::Pending && next.is_terminal()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// What a caller supplies to open a new order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub amount: Amount,
}

/// An order awaiting, or having completed, settlement.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: Uuid,
    /// The user who placed the order.
    pub user_id: Uuid,
    pub amount: Amount,
    /// Minted once at creation and sent with every charge attempt for this order.
    pub idempotency_token: Uuid,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(new_order: NewOrder) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: new_order.user_id,
            amount: new_order.amount,
            idempotency_token: Uuid::new_v4(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies `next` if the order is still in `expected`.
    ///
    /// Returns `false`, leaving the order untouched, when the current status no
    /// longer matches `expected` (another writer got there first). Illegal
    /// transitions are rejected with `InvalidState`.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        expected: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, SettlementError> {
        if self.status != expected {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(SettlementError::InvalidState {
                id: self.id,
                status: self.status,
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(true)
    }

    /// Pending and not touched since `cutoff`.
    pub fn is_stuck(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && self.updated_at <= cutoff
    }
}
