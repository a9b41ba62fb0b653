//! Application layer: the checkout orchestrator and the reconciliation worker.
//!
//! `CheckoutService` charges an order once and only ever commits an
//! unambiguous success. `ReconciliationWorker` periodically resolves the orders
//! that checkout left `PENDING` by asking the gateway what actually happened.

pub mod checkout;
pub mod reconciliation;
