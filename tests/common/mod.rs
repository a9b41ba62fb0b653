#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal_macros::dec;
use settlement::application::checkout::CheckoutService;
use settlement::application::reconciliation::ReconciliationWorker;
use settlement::config::{SettlementConfig, SimulatedGatewayConfig};
use settlement::domain::order::{Amount, NewOrder, Order, OrderStatus};
use settlement::domain::ports::{OrderStore, PaymentGateway};
use settlement::error::{Result, SettlementError};
use settlement::infrastructure::gateway::SimulatedGateway;
use settlement::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPaymentStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Zero latency, immediately stale, short poll interval.
pub fn fast_config() -> SettlementConfig {
    SettlementConfig {
        staleness_threshold: Duration::ZERO,
        poll_interval: Duration::from_millis(20),
        charge_timeout: Duration::from_secs(1),
        gateway: SimulatedGatewayConfig {
            latency: Duration::ZERO,
            timeout_latency: Duration::ZERO,
            ..Default::default()
        },
    }
}

pub fn new_order(amount: rust_decimal::Decimal) -> NewOrder {
    NewOrder {
        user_id: Uuid::new_v4(),
        amount: Amount::new(amount).unwrap(),
    }
}

pub fn hundred() -> NewOrder {
    new_order(dec!(100))
}

/// Order store that counts applied status writes and can be told to fail them.
#[derive(Default)]
pub struct FaultyOrderStore {
    pub inner: InMemoryOrderStore,
    applied: AtomicUsize,
    broken: Mutex<HashSet<Uuid>>,
    read_stall: Mutex<Duration>,
}

impl FaultyOrderStore {
    pub fn fail_updates_for(&self, id: Uuid) {
        self.broken.lock().unwrap().insert(id);
    }

    pub fn heal(&self, id: Uuid) {
        self.broken.lock().unwrap().remove(&id);
    }

    pub fn applied_writes(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Delays every `find_by_id` by `stall` after the row has been read.
    pub fn stall_reads(&self, stall: Duration) {
        *self.read_stall.lock().unwrap() = stall;
    }
}

#[async_trait]
impl OrderStore for FaultyOrderStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let row = self.inner.find_by_id(id).await?;
        let stall = *self.read_stall.lock().unwrap();
        if !stall.is_zero() {
            tokio::time::sleep(stall).await;
        }
        Ok(row)
    }

    async fn create(&self, order: &Order) -> Result<()> {
        self.inner.create(order).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        expected: OrderStatus,
    ) -> Result<bool> {
        if self.broken.lock().unwrap().contains(&id) {
            return Err(SettlementError::Persistence("commit failed".to_string()));
        }
        let applied = self.inner.update_status(id, new_status, expected).await?;
        if applied {
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
        Ok(applied)
    }

    async fn find_stuck(&self, older_than: Duration) -> Result<Vec<Order>> {
        self.inner.find_stuck(older_than).await
    }
}

/// Gateway whose status endpoint can be made unreachable per token.
pub struct FaultyGateway {
    pub inner: SimulatedGateway,
    unreachable: Mutex<HashSet<Uuid>>,
    status_stall: Mutex<Duration>,
}

impl FaultyGateway {
    pub fn new(inner: SimulatedGateway) -> Self {
        Self {
            inner,
            unreachable: Mutex::default(),
            status_stall: Mutex::default(),
        }
    }

    pub fn cut_off(&self, token: Uuid) {
        self.unreachable.lock().unwrap().insert(token);
    }

    pub fn restore(&self, token: Uuid) {
        self.unreachable.lock().unwrap().remove(&token);
    }

    /// Delays every `check_status` answer by `stall`.
    pub fn stall_status(&self, stall: Duration) {
        *self.status_stall.lock().unwrap() = stall;
    }
}

#[async_trait]
impl PaymentGateway for FaultyGateway {
    async fn charge(&self, amount: Amount, token: Uuid) -> Result<bool> {
        self.inner.charge(amount, token).await
    }

    async fn check_status(&self, token: Uuid) -> Result<bool> {
        if self.unreachable.lock().unwrap().contains(&token) {
            return Err(SettlementError::GatewayTransport(
                "status endpoint unreachable".to_string(),
            ));
        }
        let stall = *self.status_stall.lock().unwrap();
        if !stall.is_zero() {
            tokio::time::sleep(stall).await;
        }
        self.inner.check_status(token).await
    }
}

/// Everything wired together over in-memory stores.
pub struct Harness {
    pub orders: Arc<FaultyOrderStore>,
    pub payments: Arc<InMemoryPaymentStore>,
    pub gateway: Arc<FaultyGateway>,
    pub checkout: CheckoutService,
    pub worker: Arc<ReconciliationWorker>,
}

impl Harness {
    pub fn new(config: SettlementConfig) -> Self {
        let orders = Arc::new(FaultyOrderStore::default());
        let payments = Arc::new(InMemoryPaymentStore::new());
        let gateway = Arc::new(FaultyGateway::new(SimulatedGateway::new(
            config.gateway.clone(),
        )));
        let checkout = CheckoutService::new(orders.clone(), gateway.clone(), &config)
            .with_payment_store(payments.clone());
        let worker = Arc::new(
            ReconciliationWorker::new(orders.clone(), gateway.clone(), &config)
                .with_payment_store(payments.clone()),
        );
        Self {
            orders,
            payments,
            gateway,
            checkout,
            worker,
        }
    }

    pub async fn status(&self, id: Uuid) -> OrderStatus {
        self.orders.find_by_id(id).await.unwrap().unwrap().status
    }
}
