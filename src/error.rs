use crate::domain::customer::CustomerId;
use crate::domain::payment::{PaymentId, PaymentMethod, PaymentStatus};
use crate::domain::queue::{EntryId, EntryStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueueError>;

/// Coarse classification used by transports to map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    InvalidTransition,
    AdmissionFailed,
    Precondition,
    Internal,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Payment method {0} requires an external transaction reference")]
    MissingReference(PaymentMethod),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Customer {0} already has a pending payment")]
    DuplicatePending(CustomerId),
    #[error("Payment {0} is already queued")]
    AlreadyQueued(PaymentId),
    #[error("Payment {payment} was already decided ({status})")]
    AlreadyDecided {
        payment: PaymentId,
        status: PaymentStatus,
    },
    #[error("Reorder set does not match the active queue: {0}")]
    InvalidSet(String),
    #[error("Cannot {action} entry {entry} while it is {from}")]
    InvalidTransition {
        entry: EntryId,
        from: EntryStatus,
        action: &'static str,
    },
    #[error("Payment {0} is not confirmed")]
    PaymentNotConfirmed(PaymentId),
    #[error("Admission failed for payment {payment}: {source}")]
    AdmissionFailed {
        payment: PaymentId,
        #[source]
        source: Box<QueueError>,
    },
    #[error("Payment method {0} is disabled")]
    MethodDisabled(PaymentMethod),
    #[error("Unknown customer {0}")]
    UnknownCustomer(CustomerId),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl QueueError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::MissingReference(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DuplicatePending(_)
            | Self::AlreadyQueued(_)
            | Self::AlreadyDecided { .. }
            | Self::InvalidSet(_) => ErrorKind::Conflict,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::AdmissionFailed { .. } => ErrorKind::AdmissionFailed,
            Self::PaymentNotConfirmed(_) | Self::MethodDisabled(_) | Self::UnknownCustomer(_) => {
                ErrorKind::Precondition
            }
            Self::Storage(_)
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::Csv(_)
            | Self::Io(_) => ErrorKind::Internal,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDb(_) => ErrorKind::Internal,
        }
    }
}
