use crate::domain::customer::CustomerId;
use crate::domain::events::{Group, Notification};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{Publisher, PublisherBox};
use crate::domain::queue::{QueueEntry, QueueSummary};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// A committed state change, together with the active queue as read back
/// from the store right after the commit.
#[derive(Debug, Clone)]
pub enum Outcome {
    PaymentSubmitted(Payment),
    PaymentDecided {
        payment: Payment,
        admitted: Option<QueueEntry>,
        queue: Vec<QueueEntry>,
    },
    RideStarted {
        entry: QueueEntry,
        queue: Vec<QueueEntry>,
    },
    RideCompleted {
        entry: QueueEntry,
        queue: Vec<QueueEntry>,
    },
    RideCancelled {
        entry: QueueEntry,
        queue: Vec<QueueEntry>,
    },
    ManualAdmission {
        customer_id: CustomerId,
        reason: String,
        queue: Vec<QueueEntry>,
    },
    /// Reorder, resync or recalculation: only positions or statuses moved.
    QueueChanged(Vec<QueueEntry>),
}

/// Maps an outcome onto the events each subscriber group should see.
pub fn address(outcome: &Outcome) -> Vec<(Group, Notification)> {
    let mut out = Vec::new();
    match outcome {
        Outcome::PaymentSubmitted(payment) => {
            let event = Notification::PaymentSubmitted {
                payment_id: payment.id,
                customer_id: payment.customer_id,
                amount: payment.amount,
                method: payment.method,
            };
            push_to(&mut out, &[Group::Sales, Group::Customer(payment.customer_id)], event);
        }
        Outcome::PaymentDecided {
            payment,
            admitted,
            queue,
        } => {
            let event = Notification::PaymentDecided {
                payment_id: payment.id,
                status: payment.status,
                notes: payment.notes.clone(),
            };
            push_to(
                &mut out,
                &[
                    Group::Sales,
                    Group::Customer(payment.customer_id),
                    Group::Payment(payment.id),
                ],
                event,
            );
            if payment.status == PaymentStatus::Denied {
                let reason = payment
                    .notes
                    .clone()
                    .unwrap_or_else(|| "payment denied".to_string());
                out.push((
                    Group::Sales,
                    Notification::CustomerNeedsAttention {
                        customer_id: payment.customer_id,
                        reason,
                    },
                ));
            }
            if admitted.is_some() {
                queue_changed(&mut out, queue);
            }
        }
        Outcome::RideStarted { entry, queue } => {
            let event = Notification::RideStarted { entry_id: entry.id };
            push_to(&mut out, &ride_groups(entry), event);
            queue_changed(&mut out, queue);
        }
        Outcome::RideCompleted { entry, queue } => {
            let event = Notification::RideCompleted { entry_id: entry.id };
            push_to(&mut out, &ride_groups(entry), event);
            queue_changed(&mut out, queue);
            out.push((Group::Driver, Notification::QueueSummary(QueueSummary::of(queue))));
        }
        Outcome::RideCancelled { entry, queue } => {
            let event = Notification::RideCancelled { entry_id: entry.id };
            push_to(&mut out, &ride_groups(entry), event);
            queue_changed(&mut out, queue);
            out.push((Group::Driver, Notification::QueueSummary(QueueSummary::of(queue))));
        }
        Outcome::ManualAdmission {
            customer_id,
            reason,
            queue,
        } => {
            out.push((
                Group::Sales,
                Notification::ManualAdmission {
                    customer_id: *customer_id,
                    reason: reason.clone(),
                },
            ));
            queue_changed(&mut out, queue);
        }
        Outcome::QueueChanged(queue) => queue_changed(&mut out, queue),
    }
    out
}

fn ride_groups(entry: &QueueEntry) -> [Group; 3] {
    [Group::Sales, Group::Driver, Group::Customer(entry.customer_id)]
}

fn push_to(out: &mut Vec<(Group, Notification)>, groups: &[Group], event: Notification) {
    out.extend(groups.iter().map(|group| (*group, event.clone())));
}

fn queue_changed(out: &mut Vec<(Group, Notification)>, queue: &[QueueEntry]) {
    let event = Notification::QueueChanged {
        entries: queue.to_vec(),
    };
    push_to(out, &[Group::Sales, Group::Driver], event);
}

/// Fire-and-forget publisher of committed outcomes.
///
/// `dispatch` only enqueues; a background task addresses each outcome and
/// publishes it, retrying a failing group a few times before logging and
/// dropping the event. Nothing here can fail or block the command that
/// produced the outcome.
pub struct NotificationFanout {
    sender: mpsc::UnboundedSender<Outcome>,
    worker: JoinHandle<()>,
}

impl NotificationFanout {
    /// Spawns the dispatcher on the current `tokio` runtime.
    pub fn spawn(publisher: PublisherBox, attempts: u32) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(receiver, publisher, attempts.max(1)));
        Self { sender, worker }
    }

    pub fn dispatch(&self, outcome: Outcome) {
        if self.sender.send(outcome).is_err() {
            warn!("notification dispatcher has stopped; dropping outcome");
        }
    }

    /// Stops accepting outcomes and waits until everything queued so far
    /// has been delivered or dropped.
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "notification dispatcher ended abnormally");
        }
    }
}

async fn run(
    mut receiver: mpsc::UnboundedReceiver<Outcome>,
    publisher: PublisherBox,
    attempts: u32,
) {
    while let Some(outcome) = receiver.recv().await {
        for (group, event) in address(&outcome) {
            deliver(&*publisher, &group.to_string(), &event, attempts).await;
        }
    }
    debug!("notification dispatcher drained");
}

async fn deliver(
    publisher: &dyn Publisher,
    group: &str,
    event: &Notification,
    attempts: u32,
) -> bool {
    for attempt in 1..=attempts {
        match publisher.publish(group, event).await {
            Ok(()) => return true,
            Err(e) if attempt < attempts => {
                debug!(
                    group,
                    event = event.name(),
                    attempt,
                    error = %e,
                    "publish failed, retrying"
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => {
                warn!(group, event = event.name(), attempts, error = %e, "dropping notification");
            }
        }
    }
    false
}
