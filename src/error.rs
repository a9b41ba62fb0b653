use thiserror::Error;
use uuid::Uuid;

use crate::domain::order::OrderStatus;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Order {0} not found")]
    NotFound(Uuid),
    #[error("Order {id} is {status}, expected PENDING")]
    InvalidState { id: Uuid, status: OrderStatus },
    #[error("Payment declined by gateway: {0}")]
    GatewayDeclined(String),
    #[error("Gateway transport error: {0}")]
    GatewayTransport(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SettlementError {
    /// The charge may or may not have moved money; only `check_status` can tell.
    pub fn is_gateway_ambiguous(&self) -> bool {
        matches!(self, Self::GatewayTransport(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for SettlementError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Persistence(e.into_string())
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
