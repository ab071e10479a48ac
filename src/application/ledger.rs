use super::require_text;
use crate::domain::customer::CustomerId;
use crate::domain::payment::{Money, Payment, PaymentId, PaymentMethod, PaymentStatus};
use crate::domain::ports::{ClockBox, PaymentConfigBox, RecordReader, UnitOfWork};
use crate::error::{QueueError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A customer's payment claim as entered at the desk or on their phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentClaim {
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub external_ref: Option<String>,
}

/// Owns the payment lifecycle and the one-pending-payment-per-customer rule.
///
/// Mutating operations run inside a caller-supplied unit of work, which is
/// what lets the orchestrator couple a decision with queue admission.
pub struct PaymentLedger {
    config: PaymentConfigBox,
    clock: ClockBox,
}

impl PaymentLedger {
    pub fn new(config: PaymentConfigBox, clock: ClockBox) -> Self {
        Self { config, clock }
    }

    /// Records a new pending claim.
    ///
    /// Input checks run before anything is read, so a malformed claim never
    /// touches the store.
    pub async fn submit(&self, uow: &mut dyn UnitOfWork, claim: PaymentClaim) -> Result<Payment> {
        let amount = Money::new(claim.amount);
        if !amount.is_positive() {
            return Err(QueueError::InvalidInput(format!(
                "amount must be positive, got {amount}"
            )));
        }
        let external_ref = claim
            .external_ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if claim.method.requires_reference() && external_ref.is_none() {
            return Err(QueueError::MissingReference(claim.method));
        }
        match self.config.method(claim.method) {
            Some(settings) if settings.enabled => {
                if settings.price != claim.amount {
                    warn!(
                        customer_id = %claim.customer_id,
                        method = %claim.method,
                        price = %settings.price,
                        amount = %claim.amount,
                        "claimed amount differs from configured price"
                    );
                }
            }
            _ => return Err(QueueError::MethodDisabled(claim.method)),
        }

        match uow.customer(claim.customer_id).await? {
            Some(customer) if customer.active => {}
            _ => return Err(QueueError::UnknownCustomer(claim.customer_id)),
        }
        if has_pending(&*uow, claim.customer_id).await? {
            return Err(QueueError::DuplicatePending(claim.customer_id));
        }

        let payment = Payment::pending(
            claim.customer_id,
            amount,
            claim.method,
            external_ref,
            self.clock.now(),
        );
        uow.put_payment(payment.clone());
        info!(
            payment_id = %payment.id,
            customer_id = %payment.customer_id,
            method = %payment.method,
            amount = %payment.amount,
            "payment submitted"
        );
        Ok(payment)
    }

    /// Confirms or denies a pending payment.
    pub async fn decide(
        &self,
        uow: &mut dyn UnitOfWork,
        payment_id: PaymentId,
        confirmed: bool,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Payment> {
        require_text("actor", actor)?;
        let mut payment = uow
            .payment(payment_id)
            .await?
            .ok_or_else(|| QueueError::not_found("payment", payment_id))?;

        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        payment.decide(confirmed, notes, actor, self.clock.now())?;
        uow.put_payment(payment.clone());
        debug!(payment_id = %payment.id, status = %payment.status, actor, "payment decided");
        Ok(payment)
    }

    /// Stages a pre-confirmed zero-amount payment for a staff admission.
    pub fn record_manual(
        &self,
        uow: &mut dyn UnitOfWork,
        customer_id: CustomerId,
        reason: &str,
        actor: &str,
    ) -> Payment {
        let payment = Payment::manual(customer_id, reason, actor, self.clock.now());
        uow.put_payment(payment.clone());
        payment
    }
}

pub async fn has_pending<R: RecordReader + ?Sized>(
    reader: &R,
    customer_id: CustomerId,
) -> Result<bool> {
    Ok(reader
        .payments()
        .await?
        .iter()
        .any(|p| p.customer_id == customer_id && p.is_pending()))
}

/// Pending claims, oldest first.
pub async fn pending_payments<R: RecordReader + ?Sized>(reader: &R) -> Result<Vec<Payment>> {
    let mut pending: Vec<Payment> = reader
        .payments()
        .await?
        .into_iter()
        .filter(|p| p.status == PaymentStatus::Pending)
        .collect();
    pending.sort_by_key(|p| (p.created_at, p.id));
    Ok(pending)
}

/// Every payment a customer has made, oldest first.
pub async fn payment_history<R: RecordReader + ?Sized>(
    reader: &R,
    customer_id: CustomerId,
) -> Result<Vec<Payment>> {
    let mut history: Vec<Payment> = reader
        .payments()
        .await?
        .into_iter()
        .filter(|p| p.customer_id == customer_id)
        .collect();
    history.sort_by_key(|p| (p.created_at, p.id));
    Ok(history)
}
