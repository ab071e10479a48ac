use super::{ChangeSet, overlay};
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{RecordReader, RecordStore, UnitOfWork};
use crate::domain::queue::{EntryId, QueueEntry};
use crate::error::{QueueError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Column Family for customer records.
pub const CF_CUSTOMERS: &str = "customers";
/// Column Family for payment records.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for queue entries.
pub const CF_ENTRIES: &str = "queue_entries";

/// A persistent record store using RocksDB.
///
/// Each record type lives in its own Column Family, keyed by the record's
/// UUID bytes with a JSON value. A unit of work stages its writes in memory
/// and commits them through a single `WriteBatch`, so a commit lands in all
/// column families or in none.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the customer, payment and queue entry column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_CUSTOMERS, CF_PAYMENTS, CF_ENTRIES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }
}

fn handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| QueueError::Storage(format!("column family '{name}' not found")))
}

fn load<T: DeserializeOwned>(db: &DB, family: &str, key: &Uuid) -> Result<Option<T>> {
    let cf = handle(db, family)?;
    match db.get_cf(cf, key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn load_all<T: DeserializeOwned>(db: &DB, family: &str) -> Result<Vec<T>> {
    let cf = handle(db, family)?;
    let mut records = Vec::new();
    for item in db.iterator_cf(cf, IteratorMode::Start) {
        let (_key, value) = item?;
        records.push(serde_json::from_slice(&value)?);
    }
    Ok(records)
}

fn stage<T: Serialize>(
    batch: &mut WriteBatch,
    cf: &ColumnFamily,
    key: &Uuid,
    record: &T,
) -> Result<()> {
    batch.put_cf(cf, key.as_bytes(), serde_json::to_vec(record)?);
    Ok(())
}

#[async_trait]
impl RecordReader for RocksDBStore {
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        load(&self.db, CF_CUSTOMERS, id.as_uuid())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        load(&self.db, CF_PAYMENTS, id.as_uuid())
    }

    async fn payments(&self) -> Result<Vec<Payment>> {
        load_all(&self.db, CF_PAYMENTS)
    }

    async fn entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        load(&self.db, CF_ENTRIES, id.as_uuid())
    }

    async fn entries(&self) -> Result<Vec<QueueEntry>> {
        load_all(&self.db, CF_ENTRIES)
    }
}

#[async_trait]
impl RecordStore for RocksDBStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(RocksDBUnitOfWork {
            _guard: guard,
            db: self.db.clone(),
            staged: ChangeSet::default(),
        }))
    }
}

pub struct RocksDBUnitOfWork {
    _guard: OwnedMutexGuard<()>,
    db: Arc<DB>,
    staged: ChangeSet,
}

#[async_trait]
impl RecordReader for RocksDBUnitOfWork {
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        match self.staged.customers.get(&id) {
            Some(customer) => Ok(Some(customer.clone())),
            None => load(&self.db, CF_CUSTOMERS, id.as_uuid()),
        }
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        match self.staged.payments.get(&id) {
            Some(payment) => Ok(Some(payment.clone())),
            None => load(&self.db, CF_PAYMENTS, id.as_uuid()),
        }
    }

    async fn payments(&self) -> Result<Vec<Payment>> {
        let committed: Vec<Payment> = load_all(&self.db, CF_PAYMENTS)?;
        Ok(overlay(
            committed.into_iter().map(|p| (p.id, p)),
            &self.staged.payments,
        ))
    }

    async fn entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        match self.staged.entries.get(&id) {
            Some(entry) => Ok(Some(entry.clone())),
            None => load(&self.db, CF_ENTRIES, id.as_uuid()),
        }
    }

    async fn entries(&self) -> Result<Vec<QueueEntry>> {
        let committed: Vec<QueueEntry> = load_all(&self.db, CF_ENTRIES)?;
        Ok(overlay(
            committed.into_iter().map(|e| (e.id, e)),
            &self.staged.entries,
        ))
    }
}

#[async_trait]
impl UnitOfWork for RocksDBUnitOfWork {
    fn put_customer(&mut self, customer: Customer) {
        self.staged.customers.insert(customer.id, customer);
    }

    fn put_payment(&mut self, payment: Payment) {
        self.staged.payments.insert(payment.id, payment);
    }

    fn put_entry(&mut self, entry: QueueEntry) {
        self.staged.entries.insert(entry.id, entry);
    }

    async fn commit(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        let customers = handle(&self.db, CF_CUSTOMERS)?;
        for (id, customer) in &staged.customers {
            stage(&mut batch, customers, id.as_uuid(), customer)?;
        }
        let payments = handle(&self.db, CF_PAYMENTS)?;
        for (id, payment) in &staged.payments {
            stage(&mut batch, payments, id.as_uuid(), payment)?;
        }
        let entries = handle(&self.db, CF_ENTRIES)?;
        for (id, entry) in &staged.entries {
            stage(&mut batch, entries, id.as_uuid(), entry)?;
        }

        debug!(records = batch.len(), "writing unit of work batch");
        self.db.write(batch)?;
        Ok(())
    }
}
