use super::in_memory::stuck_cutoff;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{OrderStore, PaymentStore};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Column Family for storing orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for storing payment attempts.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent store implementation using a transactional RocksDB.
///
/// Orders and payments live in separate Column Families, keyed by their UUID
/// bytes, with JSON values. Every mutation runs inside one RocksDB transaction
/// that locks the row with `get_for_update` before writing it. A transaction
/// dropped without `commit` is rolled back, so an early `?` return never leaves
/// a partial write behind.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("orders" and "payments") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            vec![cf_orders, cf_payments],
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            SettlementError::Persistence(format!("{} column family not found", name))
        })
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, id: Uuid) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn insert_row<T: serde::Serialize>(&self, cf_name: &str, id: Uuid, row: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let txn = self.db.transaction();
        if txn.get_for_update_cf(cf, id.as_bytes(), true)?.is_some() {
            return Err(SettlementError::Persistence(format!(
                "{} row {} already exists",
                cf_name, id
            )));
        }
        txn.put_cf(cf, id.as_bytes(), serde_json::to_vec(row)?)?;
        txn.commit()?;
        Ok(())
    }

    fn cas_order_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        expected: OrderStatus,
    ) -> Result<bool> {
        let cf = self.cf(CF_ORDERS)?;
        let txn = self.db.transaction();
        let bytes = txn
            .get_for_update_cf(cf, id.as_bytes(), true)?
            .ok_or(SettlementError::NotFound(id))?;
        let mut order: Order = serde_json::from_slice(&bytes)?;
        if !order.transition(new_status, expected, Utc::now())? {
            return Ok(false);
        }
        txn.put_cf(cf, id.as_bytes(), serde_json::to_vec(&order)?)?;
        txn.commit()?;
        Ok(true)
    }

    fn mark_payments(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        gateway_ref: Option<&str>,
    ) -> Result<usize> {
        let candidates: Vec<Uuid> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.order_id == order_id && !p.status.is_terminal())
            .map(|p| p.id)
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let cf = self.cf(CF_PAYMENTS)?;
        let now = Utc::now();
        let txn = self.db.transaction();
        let mut changed = 0;
        for id in candidates {
            let Some(bytes) = txn.get_for_update_cf(cf, id.as_bytes(), true)? else {
                continue;
            };
            let mut payment: Payment = serde_json::from_slice(&bytes)?;
            // Re-checked under the row lock.
            if payment.status.is_terminal() {
                continue;
            }
            payment.record(status, gateway_ref, now);
            txn.put_cf(cf, id.as_bytes(), serde_json::to_vec(&payment)?)?;
            changed += 1;
        }
        txn.commit()?;
        Ok(changed)
    }

    fn check_column_families(&self) -> Result<()> {
        self.cf(CF_ORDERS)?;
        self.cf(CF_PAYMENTS)?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        self.get(CF_ORDERS, id)
    }

    async fn create(&self, order: &Order) -> Result<()> {
        self.insert_row(CF_ORDERS, order.id, order)
    }

    async fn update_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        expected: OrderStatus,
    ) -> Result<bool> {
        self.cas_order_status(id, new_status, expected)
    }

    async fn find_stuck(&self, older_than: Duration) -> Result<Vec<Order>> {
        let cutoff = stuck_cutoff(older_than)?;
        let mut stuck: Vec<Order> = self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|o| o.is_stuck(cutoff))
            .collect();
        stuck.sort_by_key(|o| o.updated_at);
        Ok(stuck)
    }

    async fn health(&self) -> Result<()> {
        self.check_column_families()
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create(&self, payment: &Payment) -> Result<()> {
        self.insert_row(CF_PAYMENTS, payment.id, payment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        self.get(CF_PAYMENTS, id)
    }

    async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let mut found: Vec<Payment> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.order_id == order_id)
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
        gateway_ref: Option<&str>,
    ) -> Result<usize> {
        self.mark_payments(order_id, status, gateway_ref)
    }

    async fn find_processing_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Payment>> {
        let mut found: Vec<Payment> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Processing && p.created_at < before)
            .collect();
        found.sort_by_key(|p| p.created_at);
        found.truncate(limit);
        Ok(found)
    }

    async fn health(&self) -> Result<()> {
        self.check_column_families()
    }
}
