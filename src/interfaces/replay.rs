use super::csv::command_reader::{ScriptCommand, ScriptRow};
use super::csv::queue_writer::QueueRow;
use crate::application::ledger::PaymentClaim;
use crate::application::orchestrator::{AdmissionTarget, Orchestrator};
use crate::domain::customer::{CustomerId, NewCustomer};
use crate::domain::payment::{Money, PaymentId, PaymentMethod};
use crate::domain::queue::EntryId;
use crate::error::{QueueError, Result};
use std::collections::HashMap;

const DEFAULT_ACTOR: &str = "script";

/// Drives an orchestrator from script rows, translating the script's
/// aliases into record ids as they are created.
pub struct Replay<'a> {
    orchestrator: &'a Orchestrator,
    customers: HashMap<String, CustomerId>,
    payments: HashMap<String, PaymentId>,
    entries: HashMap<String, EntryId>,
}

impl<'a> Replay<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self {
            orchestrator,
            customers: HashMap::new(),
            payments: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    pub async fn apply(&mut self, row: ScriptRow) -> Result<()> {
        let actor = row.actor.clone().unwrap_or_else(|| DEFAULT_ACTOR.to_string());
        match row.command {
            ScriptCommand::Register => {
                let alias = required(&row.customer, "customer")?;
                let name = row.text.clone().unwrap_or_else(|| alias.to_string());
                let customer = self.orchestrator.register_customer(NewCustomer::named(name)).await?;
                self.customers.insert(alias.to_string(), customer.id);
            }
            ScriptCommand::Submit => {
                let customer_id = self.customer(&row)?;
                let alias = required(&row.payment, "payment")?;
                let claim = PaymentClaim {
                    customer_id,
                    amount: row
                        .amount
                        .ok_or_else(|| QueueError::InvalidInput("amount is required".into()))?,
                    method: row.method.unwrap_or(PaymentMethod::CashInHand),
                    external_ref: row.reference.clone(),
                };
                let payment = self.orchestrator.submit_payment(claim).await?;
                self.payments.insert(alias.to_string(), payment.id);
            }
            ScriptCommand::Confirm | ScriptCommand::Deny => {
                let alias = required(&row.payment, "payment")?;
                let payment_id = self.payment(alias)?;
                let confirmed = row.command == ScriptCommand::Confirm;
                let decision = self
                    .orchestrator
                    .decide_payment(payment_id, confirmed, row.text.clone(), &actor)
                    .await?;
                if let Some(entry) = decision.entry {
                    self.entries.insert(alias.to_string(), entry.id);
                }
            }
            ScriptCommand::Manual => {
                let customer_alias = required(&row.customer, "customer")?;
                let target = match self.customers.get(customer_alias) {
                    Some(id) => AdmissionTarget::Existing(*id),
                    None => AdmissionTarget::New(NewCustomer::named(customer_alias)),
                };
                let reason = row.text.as_deref().unwrap_or_default();
                let admission = self.orchestrator.manual_admit(target, reason, &actor).await?;
                self.customers.insert(customer_alias.to_string(), admission.customer.id);
                if let Some(alias) = row.payment.as_deref() {
                    self.payments.insert(alias.to_string(), admission.payment.id);
                    self.entries.insert(alias.to_string(), admission.entry.id);
                }
            }
            ScriptCommand::Start => {
                let entry_id = self.entry(&row)?;
                self.orchestrator.start_ride(entry_id, &actor).await?;
            }
            ScriptCommand::Complete => {
                let entry_id = self.entry(&row)?;
                self.orchestrator.complete_ride(entry_id, &actor).await?;
            }
            ScriptCommand::Remove => {
                let entry_id = self.entry(&row)?;
                let reason = row.text.as_deref().unwrap_or_default();
                self.orchestrator.remove_from_queue(entry_id, reason, &actor).await?;
            }
            ScriptCommand::Reorder => {
                let order = required(&row.payment, "payment")?
                    .split(';')
                    .map(|alias| self.entry_alias(alias.trim()))
                    .collect::<Result<Vec<_>>>()?;
                self.orchestrator.reorder_queue(&order, &actor).await?;
            }
            ScriptCommand::Recalculate => {
                self.orchestrator.recalculate_queue().await?;
            }
        }
        Ok(())
    }

    /// The queue as it stands, with customer names and payment details
    /// resolved for display.
    pub async fn queue_rows(&self, include_recently_completed: bool) -> Result<Vec<QueueRow>> {
        let entries = self.orchestrator.current_queue(include_recently_completed).await?;
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let customer = self
                .orchestrator
                .customer(entry.customer_id)
                .await?
                .map(|c| c.name)
                .unwrap_or_else(|| entry.customer_id.to_string());
            let payment = self
                .orchestrator
                .payment_history(entry.customer_id)
                .await?
                .into_iter()
                .find(|p| p.id == entry.payment_id);
            rows.push(QueueRow {
                position: entry.position,
                customer,
                status: entry.status,
                method: payment.as_ref().map_or(PaymentMethod::CashInHand, |p| p.method),
                amount: payment.map_or(Money::ZERO, |p| p.amount).value(),
            });
        }
        Ok(rows)
    }

    fn customer(&self, row: &ScriptRow) -> Result<CustomerId> {
        let alias = required(&row.customer, "customer")?;
        self.customers
            .get(alias)
            .copied()
            .ok_or_else(|| QueueError::InvalidInput(format!("unknown customer alias '{alias}'")))
    }

    fn payment(&self, alias: &str) -> Result<PaymentId> {
        self.payments
            .get(alias)
            .copied()
            .ok_or_else(|| QueueError::InvalidInput(format!("unknown payment alias '{alias}'")))
    }

    fn entry(&self, row: &ScriptRow) -> Result<EntryId> {
        self.entry_alias(required(&row.payment, "payment")?)
    }

    fn entry_alias(&self, alias: &str) -> Result<EntryId> {
        self.entries
            .get(alias)
            .copied()
            .ok_or_else(|| {
                QueueError::InvalidInput(format!("payment '{alias}' has no queue entry"))
            })
    }
}

fn required<'r>(field: &'r Option<String>, name: &str) -> Result<&'r str> {
    field
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| QueueError::InvalidInput(format!("{name} column is required")))
}
