use crate::config::SettlementConfig;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::PaymentStatus;
use crate::domain::ports::{OrderStoreRef, PaymentGatewayRef, PaymentStoreRef};
use crate::error::{Result, SettlementError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Tally of one reconciliation sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Stuck orders looked at.
    pub examined: usize,
    /// Ghost orders: the gateway had the money, now `PAID`.
    pub marked_paid: usize,
    /// Abandoned orders: the gateway never charged, now `FAILED`.
    pub marked_failed: usize,
    /// Left `PENDING` because `check_status` failed.
    pub gateway_errors: usize,
    /// Left `PENDING` because the corrective write failed.
    pub persistence_errors: usize,
    /// Someone else resolved the order first.
    pub superseded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was still in flight; nothing was done.
    AlreadyRunning,
}

enum Resolution {
    Applied(OrderStatus),
    Superseded,
}

/// Why an order was left `PENDING` for the next sweep.
enum Deferred {
    Gateway(SettlementError),
    Persistence(SettlementError),
}

/// Resets the in-flight flag however the sweep ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background task settling orders left `PENDING` past the staleness threshold.
///
/// Each sweep asks the gateway what really happened to every stuck order and
/// writes `PAID` or `FAILED` accordingly. At most one sweep runs at a time.
pub struct ReconciliationWorker {
    orders: OrderStoreRef,
    payments: Option<PaymentStoreRef>,
    gateway: PaymentGatewayRef,
    staleness_threshold: Duration,
    poll_interval: Duration,
    gateway_timeout: Duration,
    in_flight: AtomicBool,
}

impl ReconciliationWorker {
    pub fn new(orders: OrderStoreRef, gateway: PaymentGatewayRef, config: &SettlementConfig) -> Self {
        Self {
            orders,
            payments: None,
            gateway,
            staleness_threshold: config.staleness_threshold,
            poll_interval: config.poll_interval,
            gateway_timeout: config.charge_timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Mirrors each resolution onto the order's open payment attempts.
    pub fn with_payment_store(mut self, payments: PaymentStoreRef) -> Self {
        self.payments = Some(payments);
        self
    }

    /// Sweeps every `poll_interval` until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first sweep happens one interval after start. A sweep that overruns
    /// the interval swallows the ticks it missed rather than queueing them.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }
        let cancel = shutdown.clone();
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval = ?self.poll_interval,
            staleness = ?self.staleness_threshold,
            "Reconciliation worker started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep_until(Some(&cancel)).await {
                        Ok(SweepOutcome::Completed(report)) if report.examined > 0 => {
                            info!(?report, "Reconciliation sweep finished");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Reconciliation sweep failed"),
                    }
                }
            }
        }

        info!("Reconciliation worker stopped");
    }

    /// Runs one sweep now, unless another one is in flight.
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        self.sweep_until(None).await
    }

    #[instrument(skip_all)]
    async fn sweep_until(&self, cancel: Option<&watch::Receiver<bool>>) -> Result<SweepOutcome> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("Previous sweep still running; skipping");
            return Ok(SweepOutcome::AlreadyRunning);
        };

        let stuck = self.orders.find_stuck(self.staleness_threshold).await?;
        let mut report = SweepReport::default();
        if stuck.is_empty() {
            return Ok(SweepOutcome::Completed(report));
        }

        info!(count = stuck.len(), "Found stuck orders");

        for order in stuck {
            if cancel.is_some_and(|rx| *rx.borrow()) {
                info!("Shutdown requested; leaving the rest for the next run");
                break;
            }
            report.examined += 1;
            match self.reconcile(&order).await {
                Ok(Resolution::Applied(OrderStatus::Paid)) => report.marked_paid += 1,
                Ok(Resolution::Applied(_)) => report.marked_failed += 1,
                Ok(Resolution::Superseded) => report.superseded += 1,
                Err(Deferred::Gateway(e)) => {
                    warn!(order_id = %order.id, error = %e, "Status check failed; retrying next sweep");
                    report.gateway_errors += 1;
                }
                Err(Deferred::Persistence(e)) => {
                    error!(order_id = %order.id, error = %e, "Correction failed; retrying next sweep");
                    report.persistence_errors += 1;
                }
            }
        }

        Ok(SweepOutcome::Completed(report))
    }

    async fn reconcile(&self, order: &Order) -> std::result::Result<Resolution, Deferred> {
        let charged = match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.check_status(order.idempotency_token),
        )
        .await
        {
            Ok(result) => result.map_err(Deferred::Gateway)?,
            Err(_) => {
                return Err(Deferred::Gateway(SettlementError::GatewayTransport(
                    format!("status check exceeded {:?}", self.gateway_timeout),
                )));
            }
        };

        let (target, payment_status) = if charged {
            (OrderStatus::Paid, PaymentStatus::Succeeded)
        } else {
            (OrderStatus::Failed, PaymentStatus::Failed)
        };

        let applied = self
            .orders
            .update_status(order.id, target, OrderStatus::Pending)
            .await
            .map_err(Deferred::Persistence)?;
        if !applied {
            debug!(order_id = %order.id, "Order already resolved elsewhere");
            return Ok(Resolution::Superseded);
        }

        if charged {
            info!(order_id = %order.id, token = %order.idempotency_token, "Ghost order fixed: PAID");
        } else {
            info!(order_id = %order.id, token = %order.idempotency_token, "Abandoned order closed: FAILED");
        }

        if let Some(payments) = &self.payments
            && let Err(e) = payments
                .update_status(order.id, payment_status, None)
                .await
        {
            warn!(order_id = %order.id, error = %e, "Failed to mirror resolution into payments");
        }

        Ok(Resolution::Applied(target))
    }
}
