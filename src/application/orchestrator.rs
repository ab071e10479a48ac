use super::fanout::{NotificationFanout, Outcome};
use super::ledger::{self, PaymentClaim, PaymentLedger};
use super::ordering::{self, QueueEngine};
use super::require_text;
use crate::config::CoreConfig;
use crate::domain::customer::{Customer, CustomerId, NewCustomer};
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{ClockBox, PublisherBox, RecordStoreBox, UnitOfWork};
use crate::domain::queue::{EntryId, ExternalEntryState, QueueEntry};
use crate::error::{QueueError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Who a manual admission is for.
#[derive(Debug, Clone)]
pub enum AdmissionTarget {
    Existing(CustomerId),
    New(NewCustomer),
}

/// Result of a staff decision on a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub payment: Payment,
    /// Set when the payment was confirmed and its holder joined the queue.
    pub entry: Option<QueueEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub customer: Customer,
    pub payment: Payment,
    pub entry: QueueEntry,
}

/// The entry point for every inbound command and query.
///
/// Each command runs in exactly one unit of work. Confirming a payment and
/// admitting its holder share that unit, so either both are committed or
/// neither is. Notifications go out only after the commit and never affect
/// the command's result.
pub struct Orchestrator {
    store: RecordStoreBox,
    ledger: PaymentLedger,
    queue: QueueEngine,
    fanout: NotificationFanout,
    clock: ClockBox,
    recent_window: Duration,
}

impl Orchestrator {
    /// Creates the orchestrator and spawns its notification dispatcher, so
    /// it must be called from within a `tokio` runtime.
    pub fn new(
        store: RecordStoreBox,
        publisher: PublisherBox,
        config: &CoreConfig,
        clock: ClockBox,
    ) -> Self {
        let recent_window =
            Duration::try_minutes(config.recently_completed_minutes).unwrap_or(Duration::MAX);
        Self {
            ledger: PaymentLedger::new(Arc::new(config.payment_methods.clone()), clock.clone()),
            queue: QueueEngine::new(clock.clone()),
            fanout: NotificationFanout::spawn(publisher, config.publish_attempts),
            recent_window,
            store,
            clock,
        }
    }

    /// Flushes pending notifications and stops the dispatcher.
    pub async fn shutdown(self) {
        self.fanout.close().await;
    }

    pub async fn register_customer(&self, fields: NewCustomer) -> Result<Customer> {
        require_text("name", &fields.name)?;
        let customer = Customer::register(fields, self.clock.now());
        let mut uow = self.store.begin().await?;
        uow.put_customer(customer.clone());
        uow.commit().await?;
        info!(customer_id = %customer.id, name = %customer.name, "customer registered");
        Ok(customer)
    }

    pub async fn deactivate_customer(&self, customer_id: CustomerId) -> Result<Customer> {
        let mut uow = self.store.begin().await?;
        let mut customer = uow
            .customer(customer_id)
            .await?
            .ok_or_else(|| QueueError::not_found("customer", customer_id))?;
        customer.deactivate();
        uow.put_customer(customer.clone());
        uow.commit().await?;
        info!(customer_id = %customer.id, "customer deactivated");
        Ok(customer)
    }

    pub async fn submit_payment(&self, claim: PaymentClaim) -> Result<Payment> {
        let mut uow = self.store.begin().await?;
        let payment = self.ledger.submit(&mut *uow, claim).await.inspect_err(|e| {
            debug!(error = %e, "payment claim rejected");
        })?;
        uow.commit().await?;
        self.fanout.dispatch(Outcome::PaymentSubmitted(payment.clone()));
        drop(uow);
        Ok(payment)
    }

    /// Staff decision on a pending payment; see [`Self::confirm_and_admit`].
    pub async fn decide_payment(
        &self,
        payment_id: PaymentId,
        confirmed: bool,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Decision> {
        self.confirm_and_admit(payment_id, confirmed, notes, actor).await
    }

    /// Decides a payment and, when confirmed, admits its holder to the queue
    /// in the same unit of work.
    ///
    /// If admission fails the unit is dropped uncommitted: the payment stays
    /// pending and the error is reported as `AdmissionFailed`.
    pub async fn confirm_and_admit(
        &self,
        payment_id: PaymentId,
        confirmed: bool,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Decision> {
        let mut uow = self.store.begin().await?;
        let payment = self
            .ledger
            .decide(&mut *uow, payment_id, confirmed, notes, actor)
            .await?;

        let entry = if payment.status == PaymentStatus::Confirmed {
            match self.queue.admit(&mut *uow, payment_id).await {
                Ok(entry) => Some(entry),
                Err(source) => {
                    warn!(
                        %payment_id,
                        error = %source,
                        "admission failed, payment decision rolled back"
                    );
                    return Err(QueueError::AdmissionFailed {
                        payment: payment_id,
                        source: Box::new(source),
                    });
                }
            }
        } else {
            None
        };
        uow.commit().await?;

        info!(%payment_id, status = %payment.status, actor, "payment decision committed");
        let decision = Decision { payment, entry };
        let (payment, admitted) = (decision.payment.clone(), decision.entry.clone());
        self.publish(&*uow, move |queue| Outcome::PaymentDecided {
            payment,
            admitted,
            queue,
        })
        .await;
        drop(uow);
        Ok(decision)
    }

    /// Puts a customer in the queue without a paid claim, recording a
    /// zero-amount confirmed payment that carries the reason.
    pub async fn manual_admit(
        &self,
        target: AdmissionTarget,
        reason: &str,
        actor: &str,
    ) -> Result<Admission> {
        require_text("reason", reason)?;
        require_text("actor", actor)?;
        let reason = reason.trim();

        let mut uow = self.store.begin().await?;
        let customer = match target {
            AdmissionTarget::Existing(id) => match uow.customer(id).await? {
                Some(customer) if customer.active => customer,
                _ => return Err(QueueError::UnknownCustomer(id)),
            },
            AdmissionTarget::New(fields) => {
                require_text("name", &fields.name)?;
                let customer = Customer::register(fields, self.clock.now());
                uow.put_customer(customer.clone());
                customer
            }
        };

        let payment = self.ledger.record_manual(&mut *uow, customer.id, reason, actor);
        let entry = self
            .queue
            .admit(&mut *uow, payment.id)
            .await
            .map_err(|source| QueueError::AdmissionFailed {
                payment: payment.id,
                source: Box::new(source),
            })?;
        uow.commit().await?;

        info!(
            customer_id = %customer.id,
            entry_id = %entry.id,
            actor,
            reason,
            "manual admission"
        );
        let (customer_id, reason) = (customer.id, reason.to_string());
        self.publish(&*uow, move |queue| Outcome::ManualAdmission {
            customer_id,
            reason,
            queue,
        })
        .await;
        drop(uow);
        Ok(Admission {
            customer,
            payment,
            entry,
        })
    }

    pub async fn start_ride(&self, entry_id: EntryId, actor: &str) -> Result<QueueEntry> {
        let mut uow = self.store.begin().await?;
        let entry = self.queue.start(&mut *uow, entry_id, actor).await?;
        uow.commit().await?;

        let started = entry.clone();
        self.publish(&*uow, move |queue| Outcome::RideStarted {
            entry: started,
            queue,
        })
        .await;
        drop(uow);
        Ok(entry)
    }

    pub async fn complete_ride(&self, entry_id: EntryId, actor: &str) -> Result<QueueEntry> {
        let mut uow = self.store.begin().await?;
        let entry = self.queue.complete(&mut *uow, entry_id, actor).await?;
        uow.commit().await?;

        let completed = entry.clone();
        self.publish(&*uow, move |queue| Outcome::RideCompleted {
            entry: completed,
            queue,
        })
        .await;
        drop(uow);
        Ok(entry)
    }

    pub async fn remove_from_queue(
        &self,
        entry_id: EntryId,
        reason: &str,
        actor: &str,
    ) -> Result<QueueEntry> {
        let mut uow = self.store.begin().await?;
        let entry = self.queue.remove(&mut *uow, entry_id, reason, actor).await?;
        uow.commit().await?;

        let removed = entry.clone();
        self.publish(&*uow, move |queue| Outcome::RideCancelled {
            entry: removed,
            queue,
        })
        .await;
        drop(uow);
        Ok(entry)
    }

    pub async fn reorder_queue(
        &self,
        ordered: &[EntryId],
        actor: &str,
    ) -> Result<Vec<QueueEntry>> {
        let mut uow = self.store.begin().await?;
        let entries = self.queue.reorder(&mut *uow, ordered, actor).await?;
        uow.commit().await?;

        self.publish(&*uow, Outcome::QueueChanged).await;
        drop(uow);
        Ok(entries)
    }

    pub async fn sync_from_secondary(
        &self,
        external: &[ExternalEntryState],
    ) -> Result<Vec<QueueEntry>> {
        let mut uow = self.store.begin().await?;
        let entries = self.queue.sync_from_secondary(&mut *uow, external).await?;
        uow.commit().await?;

        self.publish(&*uow, Outcome::QueueChanged).await;
        drop(uow);
        Ok(entries)
    }

    pub async fn recalculate_queue(&self) -> Result<usize> {
        let mut uow = self.store.begin().await?;
        let changed = self.queue.recalculate(&mut *uow).await?;
        uow.commit().await?;

        if changed > 0 {
            self.publish(&*uow, Outcome::QueueChanged).await;
        }
        drop(uow);
        Ok(changed)
    }

    /// Active entries by position; with `include_recently_completed`, rides
    /// finished within the configured window follow them.
    pub async fn current_queue(
        &self,
        include_recently_completed: bool,
    ) -> Result<Vec<QueueEntry>> {
        let since = include_recently_completed.then(|| {
            self.clock
                .now()
                .checked_sub_signed(self.recent_window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        ordering::current_queue(&*self.store, since).await
    }

    pub async fn next_customer(&self) -> Result<Option<QueueEntry>> {
        ordering::next_customer(&*self.store).await
    }

    pub async fn pending_payments(&self) -> Result<Vec<Payment>> {
        ledger::pending_payments(&*self.store).await
    }

    pub async fn payment_history(&self, customer_id: CustomerId) -> Result<Vec<Payment>> {
        ledger::payment_history(&*self.store, customer_id).await
    }

    pub async fn has_pending(&self, customer_id: CustomerId) -> Result<bool> {
        ledger::has_pending(&*self.store, customer_id).await
    }

    pub async fn customer(&self, customer_id: CustomerId) -> Result<Option<Customer>> {
        self.store.customer(customer_id).await
    }

    /// Reads the just-committed queue through the unit, which still holds
    /// the writer lock, and hands the outcome to the fanout. Outcomes are
    /// therefore dispatched in commit order. A failed read only costs the
    /// notification.
    async fn publish<F>(&self, uow: &dyn UnitOfWork, build: F)
    where
        F: FnOnce(Vec<QueueEntry>) -> Outcome + Send,
    {
        match ordering::active_entries(uow).await {
            Ok(queue) => self.fanout.dispatch(build(queue)),
            Err(e) => warn!(error = %e, "could not read queue for notification; skipping"),
        }
    }
}
