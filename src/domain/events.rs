use super::customer::CustomerId;
use super::payment::{Money, PaymentId, PaymentMethod, PaymentStatus};
use super::queue::{EntryId, QueueEntry, QueueSummary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscriber group a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Sales,
    Driver,
    Customer(CustomerId),
    Payment(PaymentId),
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sales => f.write_str("role:sales"),
            Self::Driver => f.write_str("role:driver"),
            Self::Customer(id) => write!(f, "customer:{id}"),
            Self::Payment(id) => write!(f, "payment:{id}"),
        }
    }
}

/// Events pushed to consoles and customer clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    PaymentSubmitted {
        payment_id: PaymentId,
        customer_id: CustomerId,
        amount: Money,
        method: PaymentMethod,
    },
    PaymentDecided {
        payment_id: PaymentId,
        status: PaymentStatus,
        notes: Option<String>,
    },
    QueueChanged {
        entries: Vec<QueueEntry>,
    },
    QueueSummary(QueueSummary),
    RideStarted {
        entry_id: EntryId,
    },
    RideCompleted {
        entry_id: EntryId,
    },
    RideCancelled {
        entry_id: EntryId,
    },
    CustomerNeedsAttention {
        customer_id: CustomerId,
        reason: String,
    },
    ManualAdmission {
        customer_id: CustomerId,
        reason: String,
    },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PaymentSubmitted { .. } => "PaymentSubmitted",
            Self::PaymentDecided { .. } => "PaymentDecided",
            Self::QueueChanged { .. } => "QueueChanged",
            Self::QueueSummary(_) => "QueueSummary",
            Self::RideStarted { .. } => "RideStarted",
            Self::RideCompleted { .. } => "RideCompleted",
            Self::RideCancelled { .. } => "RideCancelled",
            Self::CustomerNeedsAttention { .. } => "CustomerNeedsAttention",
            Self::ManualAdmission { .. } => "ManualAdmission",
        }
    }
}
