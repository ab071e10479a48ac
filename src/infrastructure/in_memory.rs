use super::{ChangeSet, overlay};
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::ports::{RecordReader, RecordStore, UnitOfWork};
use crate::domain::queue::{EntryId, QueueEntry};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// A thread-safe in-memory record store.
///
/// Committed records live behind `Arc<RwLock<..>>` so snapshot reads only
/// contend with the brief apply step of a commit. A separate writer mutex
/// is held for the whole life of a unit of work, which serializes every
/// mutating operation.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<ChangeSet>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryRecordStore {
    /// Creates a new, empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordReader for InMemoryRecordStore {
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.get(&id).cloned())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn payments(&self) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.values().cloned().collect())
    }

    async fn entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.entries.get(&id).cloned())
    }

    async fn entries(&self) -> Result<Vec<QueueEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.entries.values().cloned().collect())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(InMemoryUnitOfWork {
            _guard: guard,
            tables: self.tables.clone(),
            staged: ChangeSet::default(),
        }))
    }
}

pub struct InMemoryUnitOfWork {
    _guard: OwnedMutexGuard<()>,
    tables: Arc<RwLock<ChangeSet>>,
    staged: ChangeSet,
}

#[async_trait]
impl RecordReader for InMemoryUnitOfWork {
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        if let Some(customer) = self.staged.customers.get(&id) {
            return Ok(Some(customer.clone()));
        }
        let tables = self.tables.read().await;
        Ok(tables.customers.get(&id).cloned())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        if let Some(payment) = self.staged.payments.get(&id) {
            return Ok(Some(payment.clone()));
        }
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn payments(&self) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(overlay(
            tables.payments.iter().map(|(k, v)| (*k, v.clone())),
            &self.staged.payments,
        ))
    }

    async fn entry(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        if let Some(entry) = self.staged.entries.get(&id) {
            return Ok(Some(entry.clone()));
        }
        let tables = self.tables.read().await;
        Ok(tables.entries.get(&id).cloned())
    }

    async fn entries(&self) -> Result<Vec<QueueEntry>> {
        let tables = self.tables.read().await;
        Ok(overlay(
            tables.entries.iter().map(|(k, v)| (*k, v.clone())),
            &self.staged.entries,
        ))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
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
        debug!(
            customers = staged.customers.len(),
            payments = staged.payments.len(),
            entries = staged.entries.len(),
            "committing unit of work"
        );
        let mut tables = self.tables.write().await;
        tables.apply(staged);
        Ok(())
    }
}
