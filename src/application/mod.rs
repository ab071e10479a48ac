//! Application layer containing the queue and payment orchestration logic.
//!
//! `PaymentLedger` and `QueueEngine` each own one aggregate and only ever
//! mutate it through a unit of work handed to them. The `Orchestrator` is the
//! single entry point: it opens the unit, drives one or both of them, commits,
//! and then hands the committed outcome to the `NotificationFanout`, whose
//! dispatcher runs as a separate task fed by a `tokio` channel.

pub mod fanout;
pub mod ledger;
pub mod orchestrator;
pub mod ordering;

use crate::error::{QueueError, Result};

pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(QueueError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
