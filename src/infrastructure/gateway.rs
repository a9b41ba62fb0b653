use crate::config::SimulatedGatewayConfig;
use crate::domain::order::Amount;
use crate::domain::ports::PaymentGateway;
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// What the simulated processor does with a charge it has not seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Money moves and the caller is told so.
    Success,
    /// No money moves and the caller is told so.
    Decline,
    /// Money moves, but the caller only sees a transport error after a stall.
    Timeout,
}

enum Claim {
    Fresh(ChargeOutcome),
    Replay(bool),
}

/// In-process stand-in for a payment processor.
///
/// The idempotency ledger maps each claimed token to whether money moved.
/// A token is claimed under the write lock and its answer recorded before the
/// simulated latency, so `check_status` never lags behind a decided charge and
/// concurrent first charges of one token execute once. Replays are answered
/// from the ledger under a shared read lock.
#[derive(Clone)]
pub struct SimulatedGateway {
    ledger: Arc<RwLock<HashMap<Uuid, bool>>>,
    script: Arc<Mutex<VecDeque<ChargeOutcome>>>,
    config: SimulatedGatewayConfig,
    executed: Arc<AtomicUsize>,
}

impl SimulatedGateway {
    pub fn new(config: SimulatedGatewayConfig) -> Self {
        Self {
            ledger: Arc::default(),
            script: Arc::default(),
            config,
            executed: Arc::default(),
        }
    }

    /// Queues outcomes for the next fresh charges, in order.
    ///
    /// Once the script runs dry, outcomes are drawn from the configured weights.
    pub async fn script<I>(&self, outcomes: I)
    where
        I: IntoIterator<Item = ChargeOutcome>,
    {
        self.script.lock().await.extend(outcomes);
    }

    /// Number of charges that actually executed (idempotent replays excluded).
    pub fn executed_charges(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    async fn next_outcome(&self) -> ChargeOutcome {
        if let Some(outcome) = self.script.lock().await.pop_front() {
            return outcome;
        }
        let success = u64::from(self.config.success_weight);
        let decline = u64::from(self.config.decline_weight);
        let total = success + decline + u64::from(self.config.timeout_weight);
        if total == 0 {
            return ChargeOutcome::Success;
        }
        let roll = rand::thread_rng().gen_range(0..total);
        if roll < success {
            ChargeOutcome::Success
        } else if roll < success + decline {
            ChargeOutcome::Decline
        } else {
            ChargeOutcome::Timeout
        }
    }

    /// Claims `token` and records whether money moves, before any simulated latency.
    ///
    async fn claim(&self, token: Uuid) -> Claim {
        let mut ledger = self.ledger.write().await;
        if let Some(&charged) = ledger.get(&token) {
            return Claim::Replay(charged);
        }
        let outcome = self.next_outcome().await;
        ledger.insert(token, outcome != ChargeOutcome::Decline);
        self.executed.fetch_add(1, Ordering::SeqCst);
        Claim::Fresh(outcome)
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(SimulatedGatewayConfig::default())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, amount: Amount, token: Uuid) -> Result<bool> {
        if let Some(&charged) = self.ledger.read().await.get(&token) {
            debug!(%token, charged, "Idempotent replay");
            return Ok(charged);
        }

        let outcome = match self.claim(token).await {
            Claim::Fresh(outcome) => outcome,
            // Another call claimed the token between our read and write locks.
            Claim::Replay(charged) => {
                debug!(%token, charged, "Idempotent replay of a concurrent charge");
                return Ok(charged);
            }
        };

        match outcome {
            ChargeOutcome::Success => {
                tokio::time::sleep(self.config.latency).await;
                Ok(true)
            }
            ChargeOutcome::Decline => {
                tokio::time::sleep(self.config.latency).await;
                Err(SettlementError::GatewayDeclined("Card declined".to_string()))
            }
            ChargeOutcome::Timeout => {
                warn!(%token, %amount, "Charged, but the response is lost");
                tokio::time::sleep(self.config.timeout_latency).await;
                Err(SettlementError::GatewayTransport(
                    "Connection timeout".to_string(),
                ))
            }
        }
    }

    async fn check_status(&self, token: Uuid) -> Result<bool> {
        let ledger = self.ledger.read().await;
        Ok(ledger.get(&token).copied().unwrap_or(false))
    }
}
