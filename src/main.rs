use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use settlement::application::checkout::CheckoutService;
use settlement::application::reconciliation::ReconciliationWorker;
use settlement::config::SettlementConfig;
use settlement::domain::order::{Amount, NewOrder, OrderStatus};
use settlement::domain::ports::{OrderStoreRef, PaymentStoreRef};
use settlement::infrastructure::gateway::SimulatedGateway;
use settlement::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPaymentStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Checks out a batch of orders against the simulated gateway, then lets the
/// reconciliation worker settle whatever was left pending.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of orders to create and check out
    #[arg(long, default_value_t = 20)]
    orders: usize,

    /// JSON configuration file. Flags below override its values.
    #[arg(long, env = "SETTLEMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Minimum age in milliseconds before a pending order is reconciled
    #[arg(long, env = "SETTLEMENT_STALENESS_MS")]
    staleness_ms: Option<u64>,

    /// Milliseconds between reconciliation sweeps
    #[arg(long, env = "SETTLEMENT_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Deadline in milliseconds for a single gateway call
    #[arg(long, env = "SETTLEMENT_CHARGE_TIMEOUT_MS")]
    charge_timeout_ms: Option<u64>,

    /// Relative weight of successful charges in the simulated gateway
    #[arg(long)]
    success_weight: Option<u32>,

    /// Relative weight of declined charges in the simulated gateway
    #[arg(long)]
    decline_weight: Option<u32>,

    /// Relative weight of charges that go through but time out
    #[arg(long)]
    timeout_weight: Option<u32>,

    /// Simulated gateway latency for prompt answers, in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,

    /// How long an ambiguous charge stalls, in milliseconds
    #[arg(long)]
    timeout_latency_ms: Option<u64>,

    /// Give up waiting for reconciliation after this many milliseconds.
    /// Defaults to the staleness threshold plus ten poll intervals.
    #[arg(long)]
    reconcile_for_ms: Option<u64>,
}

impl Cli {
    fn settlement_config(&self) -> Result<SettlementConfig> {
        let mut config = match &self.config {
            Some(path) => SettlementConfig::from_json_file(path).into_diagnostic()?,
            None => SettlementConfig::default(),
        };
        if let Some(ms) = self.staleness_ms {
            config.staleness_threshold = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.charge_timeout_ms {
            config.charge_timeout = Duration::from_millis(ms);
        }
        if let Some(w) = self.success_weight {
            config.gateway.success_weight = w;
        }
        if let Some(w) = self.decline_weight {
            config.gateway.decline_weight = w;
        }
        if let Some(w) = self.timeout_weight {
            config.gateway.timeout_weight = w;
        }
        if let Some(ms) = self.latency_ms {
            config.gateway.latency = Duration::from_millis(ms);
        }
        if let Some(ms) = self.timeout_latency_ms {
            config.gateway.timeout_latency = Duration::from_millis(ms);
        }
        config.validate().into_diagnostic()?;
        Ok(config)
    }

    /// How long to let the worker run. Stuck orders only become eligible once
    /// they are older than the staleness threshold, so the default waits past it.
    fn reconcile_for(&self, config: &SettlementConfig) -> Duration {
        match self.reconcile_for_ms {
            Some(ms) => Duration::from_millis(ms),
            None => config
                .staleness_threshold
                .saturating_add(config.poll_interval.saturating_mul(10)),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    paid: usize,
    failed: usize,
    pending: usize,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(OrderStoreRef, PaymentStoreRef)> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = Arc::new(
                settlement::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?,
            );
            let orders: OrderStoreRef = store.clone();
            let payments: PaymentStoreRef = store;
            Ok((orders, payments))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(in_memory_stores())
        }
        None => Ok(in_memory_stores()),
    }
}

fn in_memory_stores() -> (OrderStoreRef, PaymentStoreRef) {
    let orders: OrderStoreRef = Arc::new(InMemoryOrderStore::new());
    let payments: PaymentStoreRef = Arc::new(InMemoryPaymentStore::new());
    (orders, payments)
}

fn random_amount() -> Result<Amount> {
    let cents = rand::thread_rng().gen_range(100..=1_000_000);
    Amount::new(Decimal::new(cents, 2)).into_diagnostic()
}

async fn summarize(orders: &OrderStoreRef, ids: &[Uuid]) -> Result<Summary> {
    let mut summary = Summary::default();
    for id in ids {
        match orders.find_by_id(*id).await.into_diagnostic()?.map(|o| o.status) {
            Some(OrderStatus::Paid) => summary.paid += 1,
            Some(OrderStatus::Failed) => summary.failed += 1,
            _ => summary.pending += 1,
        }
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = cli.settlement_config()?;
    let (orders, payments) = open_stores(cli.db_path.clone())?;
    orders.health().await.into_diagnostic()?;
    payments.health().await.into_diagnostic()?;

    let gateway = Arc::new(SimulatedGateway::new(config.gateway.clone()));
    let checkout = CheckoutService::new(orders.clone(), gateway.clone(), &config)
        .with_payment_store(payments.clone());

    let mut ids = Vec::with_capacity(cli.orders);
    for i in 1..=cli.orders {
        let order = checkout
            .create_order(NewOrder {
                user_id: Uuid::new_v4(),
                amount: random_amount()?,
            })
            .await
            .into_diagnostic()?;
        let outcome = match checkout.checkout(order.id).await {
            Ok(_) => "SUCCESS".to_string(),
            Err(e) if e.is_gateway_ambiguous() => format!("UNKNOWN: {}", e),
            Err(e) => format!("FAILED: {}", e),
        };
        let stored = orders
            .find_by_id(order.id)
            .await
            .into_diagnostic()?
            .map(|o| o.status.to_string())
            .unwrap_or_else(|| "MISSING".to_string());
        println!("[{}] order {} {} -> store: {}", i, order.id, outcome, stored);
        ids.push(order.id);
    }

    let worker = Arc::new(
        ReconciliationWorker::new(orders.clone(), gateway, &config).with_payment_store(payments),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(shutdown_rx).await }
    });

    let window = cli.reconcile_for(&config);
    let deadline = tokio::time::Instant::now()
        .checked_add(window)
        .ok_or_else(|| miette::miette!("reconciliation window {:?} is too large", window))?;
    let summary = loop {
        let summary = summarize(&orders, &ids).await?;
        if summary.pending == 0 || tokio::time::Instant::now() >= deadline {
            break summary;
        }
        tokio::time::sleep(config.poll_interval).await;
    };

    shutdown_tx.send(true).ok();
    handle.await.into_diagnostic()?;

    println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
    Ok(())
}
