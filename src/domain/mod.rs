//! Domain model: orders, payment attempts, and the ports the core depends on.

pub mod order;
pub mod payment;
pub mod ports;
