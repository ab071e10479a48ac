use super::customer::{Customer, CustomerId};
use super::events::Notification;
use super::payment::{Payment, PaymentId, PaymentMethod};
use super::queue::{EntryId, QueueEntry};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Snapshot reads over the persisted records.
#[async_trait]
pub trait RecordReader: Send + Sync {
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>>;
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn payments(&self) -> Result<Vec<Payment>>;
    async fn entry(&self, id: EntryId) -> Result<Option<QueueEntry>>;
    async fn entries(&self) -> Result<Vec<QueueEntry>>;
}

/// A serialized unit of work.
///
/// Writes are staged and become visible to other readers only on `commit`.
/// Reads through the unit observe its own staged writes. Dropping a unit
/// without committing discards everything it staged.
#[async_trait]
pub trait UnitOfWork: RecordReader {
    fn put_customer(&mut self, customer: Customer);
    fn put_payment(&mut self, payment: Payment);
    fn put_entry(&mut self, entry: QueueEntry);
    async fn commit(&mut self) -> Result<()>;
}

#[async_trait]
pub trait RecordStore: RecordReader {
    /// Waits until no other unit of work is open, then opens one.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

pub type RecordStoreBox = Arc<dyn RecordStore>;

#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Subscriber group '{group}' unreachable: {reason}")]
    Unreachable { group: String, reason: String },
    #[error("Publish failed: {0}")]
    Other(String),
}

/// Group-keyed broadcast channel.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        group: &str,
        event: &Notification,
    ) -> std::result::Result<(), PublishError>;
}

pub type PublisherBox = Arc<dyn Publisher>;

/// Per-method settings owned by the payment configuration service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSettings {
    pub method: PaymentMethod,
    pub enabled: bool,
    pub price: Decimal,
    pub display_name: String,
}

pub trait PaymentConfigSource: Send + Sync {
    fn method(&self, method: PaymentMethod) -> Option<MethodSettings>;
}

pub type PaymentConfigBox = Arc<dyn PaymentConfigSource>;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type ClockBox = Arc<dyn Clock>;
