#![cfg(feature = "storage-rocksdb")]

use settlement::application::checkout::CheckoutService;
use settlement::application::reconciliation::{ReconciliationWorker, SweepOutcome};
use settlement::domain::order::OrderStatus;
use settlement::domain::payment::PaymentStatus;
use settlement::domain::ports::{OrderStore, PaymentStore};
use settlement::error::SettlementError;
use settlement::infrastructure::gateway::{ChargeOutcome, SimulatedGateway};
use settlement::infrastructure::rocksdb::RocksDBStore;
use std::sync::Arc;
use tempfile::tempdir;

mod common;

#[tokio::test]
async fn test_pending_order_survives_restart_and_is_reconciled() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");
    let config = common::fast_config();
    // The gateway outlives the process restart, like a real processor would.
    let gateway = Arc::new(SimulatedGateway::new(config.gateway.clone()));
    gateway.script([ChargeOutcome::Timeout]).await;

    // 1. First run: the charge goes through but the reply is lost.
    let order = {
        let store = Arc::new(RocksDBStore::open(&db_path).unwrap());
        let checkout = CheckoutService::new(store.clone(), gateway.clone(), &config)
            .with_payment_store(store.clone());
        let order = checkout.create_order(common::hundred()).await.unwrap();
        let err = checkout.checkout(order.id).await.unwrap_err();
        assert!(matches!(err, SettlementError::GatewayTransport(_)));
        order
    };

    // 2. Second run: the pending row is still there and gets settled.
    let store = Arc::new(RocksDBStore::open(&db_path).unwrap());
    let recovered = OrderStore::find_by_id(store.as_ref(), order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered.status, OrderStatus::Pending);
    assert_eq!(recovered.idempotency_token, order.idempotency_token);
    assert_eq!(recovered.amount, order.amount);

    let worker = ReconciliationWorker::new(store.clone(), gateway.clone(), &config)
        .with_payment_store(store.clone());
    let SweepOutcome::Completed(report) = worker.sweep().await.unwrap() else {
        panic!("sweep skipped");
    };
    assert_eq!(report.marked_paid, 1);

    let settled = OrderStore::find_by_id(store.as_ref(), order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Paid);
    let attempts = store.find_by_order(order.id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, PaymentStatus::Succeeded);
    assert_eq!(gateway.executed_charges(), 1);
}

#[tokio::test]
async fn test_conditional_update_is_durable() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");
    let order = settlement::domain::order::Order::new(common::hundred());

    {
        let store = RocksDBStore::open(&db_path).unwrap();
        OrderStore::create(&store, &order).await.unwrap();
        assert!(
            OrderStore::update_status(&store, order.id, OrderStatus::Failed, OrderStatus::Pending)
                .await
                .unwrap()
        );
    }

    let store = RocksDBStore::open(&db_path).unwrap();
    assert!(
        !OrderStore::update_status(&store, order.id, OrderStatus::Paid, OrderStatus::Pending)
            .await
            .unwrap()
    );
    let stored = OrderStore::find_by_id(&store, order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
}
