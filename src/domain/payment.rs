use super::customer::CustomerId;
use crate::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monetary amount claimed by a customer.
///
/// Zero is representable so that manual admissions can carry a synthetic
/// payment; customer submissions must be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    ElectronicA,
    ElectronicB,
    CashInHand,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [Self::ElectronicA, Self::ElectronicB, Self::CashInHand];

    /// Electronic claims are verified against the provider by reference.
    pub fn requires_reference(&self) -> bool {
        !matches!(self, Self::CashInHand)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ElectronicA => "electronic_a",
            Self::ElectronicB => "electronic_b",
            Self::CashInHand => "cash_in_hand",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Denied,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// A customer's claim to have paid for a ride.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Provider transaction reference for electronic methods.
    pub external_ref: Option<String>,
    pub decided_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn pending(
        customer_id: CustomerId,
        amount: Money,
        method: PaymentMethod,
        external_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            customer_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            external_ref,
            decided_by: None,
            notes: None,
            created_at: now,
            decided_at: None,
        }
    }

    /// Synthetic zero-amount payment recorded for a staff-initiated admission.
    pub fn manual(customer_id: CustomerId, reason: &str, actor: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            customer_id,
            amount: Money::ZERO,
            method: PaymentMethod::CashInHand,
            status: PaymentStatus::Confirmed,
            external_ref: None,
            decided_by: Some(actor.to_string()),
            notes: Some(format!("manual admission: {reason}")),
            created_at: now,
            decided_at: Some(now),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    /// Moves a pending payment to its terminal status. Only ever succeeds once.
    pub fn decide(
        &mut self,
        confirmed: bool,
        notes: Option<String>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.is_pending() {
            return Err(QueueError::AlreadyDecided {
                payment: self.id,
                status: self.status,
            });
        }
        self.status = if confirmed {
            PaymentStatus::Confirmed
        } else {
            PaymentStatus::Denied
        };
        self.decided_by = Some(actor.to_string());
        self.notes = notes;
        self.decided_at = Some(now);
        Ok(())
    }
}
