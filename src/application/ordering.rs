use super::require_text;
use crate::domain::payment::{PaymentId, PaymentStatus};
use crate::domain::ports::{ClockBox, RecordReader, UnitOfWork};
use crate::domain::queue::{EntryId, EntryStatus, ExternalEntryState, QueueEntry};
use crate::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Owns queue entries and their positions.
///
/// Positions of active entries are expected to read `1..=k`. Operations that
/// take an entry out of the queue renumber the remainder; `recalculate` can
/// be run at any time to repair gaps left by anything else.
pub struct QueueEngine {
    clock: ClockBox,
}

impl QueueEngine {
    pub fn new(clock: ClockBox) -> Self {
        Self { clock }
    }

    /// Creates a waiting entry for a confirmed payment at the back of the queue.
    ///
    /// The caller's unit of work holds the store's writer lock, so the
    /// max-position read and the insert cannot interleave with another admit.
    pub async fn admit(
        &self,
        uow: &mut dyn UnitOfWork,
        payment_id: PaymentId,
    ) -> Result<QueueEntry> {
        let payment = uow
            .payment(payment_id)
            .await?
            .ok_or_else(|| QueueError::not_found("payment", payment_id))?;
        if payment.status != PaymentStatus::Confirmed {
            return Err(QueueError::PaymentNotConfirmed(payment_id));
        }

        let entries = uow.entries().await?;
        if entries.iter().any(|e| e.payment_id == payment_id) {
            return Err(QueueError::AlreadyQueued(payment_id));
        }
        let position = entries
            .iter()
            .filter(|e| e.is_active())
            .map(|e| e.position)
            .max()
            .unwrap_or(0)
            + 1;

        let entry =
            QueueEntry::waiting(payment.customer_id, payment_id, position, self.clock.now());
        uow.put_entry(entry.clone());
        info!(
            entry_id = %entry.id,
            customer_id = %entry.customer_id,
            position,
            "customer admitted to queue"
        );
        Ok(entry)
    }

    pub async fn start(
        &self,
        uow: &mut dyn UnitOfWork,
        entry_id: EntryId,
        actor: &str,
    ) -> Result<QueueEntry> {
        require_text("actor", actor)?;
        let mut entry = load(&*uow, entry_id).await?;
        entry.start(actor, self.clock.now())?;
        uow.put_entry(entry.clone());
        info!(entry_id = %entry.id, actor, "ride started");
        Ok(entry)
    }

    pub async fn complete(
        &self,
        uow: &mut dyn UnitOfWork,
        entry_id: EntryId,
        actor: &str,
    ) -> Result<QueueEntry> {
        require_text("actor", actor)?;
        let mut entry = load(&*uow, entry_id).await?;
        entry.complete(actor, self.clock.now())?;
        uow.put_entry(entry.clone());
        info!(entry_id = %entry.id, actor, "ride completed");
        self.recalculate(uow).await?;
        Ok(entry)
    }

    pub async fn remove(
        &self,
        uow: &mut dyn UnitOfWork,
        entry_id: EntryId,
        reason: &str,
        actor: &str,
    ) -> Result<QueueEntry> {
        require_text("actor", actor)?;
        require_text("reason", reason)?;
        let mut entry = load(&*uow, entry_id).await?;
        entry.cancel(reason.trim(), actor)?;
        uow.put_entry(entry.clone());
        info!(entry_id = %entry.id, actor, reason, "entry removed from queue");
        self.recalculate(uow).await?;
        Ok(entry)
    }

    /// Assigns `index + 1` to each id. The ids must be exactly the active set.
    pub async fn reorder(
        &self,
        uow: &mut dyn UnitOfWork,
        ordered: &[EntryId],
        actor: &str,
    ) -> Result<Vec<QueueEntry>> {
        require_text("actor", actor)?;
        let active = active_entries(&*uow).await?;
        check_same_set(&active, ordered)?;

        let mut by_id: HashMap<EntryId, QueueEntry> =
            active.into_iter().map(|e| (e.id, e)).collect();
        let mut reordered = Vec::with_capacity(ordered.len());
        for (index, id) in ordered.iter().enumerate() {
            let Some(mut entry) = by_id.remove(id) else {
                continue;
            };
            let position = index as u32 + 1;
            if entry.position != position {
                entry.position = position;
                uow.put_entry(entry.clone());
            }
            reordered.push(entry);
        }
        info!(actor, entries = reordered.len(), "queue reordered");
        Ok(reordered)
    }

    /// Authoritative merge from the secondary console.
    ///
    /// Position and status are taken as given. Start and completion times
    /// are only filled in where none is recorded locally. Ids the secondary
    /// does not mention are left alone; ids unknown locally are skipped.
    pub async fn sync_from_secondary(
        &self,
        uow: &mut dyn UnitOfWork,
        external: &[ExternalEntryState],
    ) -> Result<Vec<QueueEntry>> {
        if let Some(bad) = external.iter().find(|s| s.status.is_active() && s.position == 0) {
            return Err(QueueError::InvalidInput(format!(
                "active entry {} reported at position 0",
                bad.id
            )));
        }

        let mut merged = Vec::with_capacity(external.len());
        for state in external {
            let Some(mut entry) = uow.entry(state.id).await? else {
                warn!(entry_id = %state.id, "secondary reported an entry unknown locally");
                continue;
            };
            if entry.merge_external(state) {
                uow.put_entry(entry.clone());
                debug!(
                    entry_id = %entry.id,
                    position = entry.position,
                    status = %entry.status,
                    "entry synced"
                );
            }
            merged.push(entry);
        }
        info!(reported = external.len(), merged = merged.len(), "synced from secondary");
        Ok(merged)
    }

    /// Renumbers active entries `1..=k` in current position order and
    /// returns how many positions changed.
    pub async fn recalculate(&self, uow: &mut dyn UnitOfWork) -> Result<usize> {
        let active = active_entries(&*uow).await?;
        let mut changed = 0;
        for (index, mut entry) in active.into_iter().enumerate() {
            let position = index as u32 + 1;
            if entry.position != position {
                entry.position = position;
                uow.put_entry(entry);
                changed += 1;
            }
        }
        if changed > 0 {
            debug!(changed, "queue positions recalculated");
        }
        Ok(changed)
    }
}

async fn load<R: RecordReader + ?Sized>(reader: &R, entry_id: EntryId) -> Result<QueueEntry> {
    reader
        .entry(entry_id)
        .await?
        .ok_or_else(|| QueueError::not_found("queue entry", entry_id))
}

fn check_same_set(active: &[QueueEntry], ordered: &[EntryId]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ordered.len());
    if let Some(dup) = ordered.iter().find(|id| !seen.insert(**id)) {
        return Err(QueueError::InvalidSet(format!("entry {dup} listed twice")));
    }
    let current: HashSet<EntryId> = active.iter().map(|e| e.id).collect();
    if let Some(missing) = current.iter().find(|id| !seen.contains(*id)) {
        return Err(QueueError::InvalidSet(format!("active entry {missing} missing")));
    }
    if let Some(extra) = ordered.iter().find(|id| !current.contains(*id)) {
        return Err(QueueError::InvalidSet(format!("entry {extra} is not in the active queue")));
    }
    Ok(())
}

/// Waiting and in-progress entries ordered by position.
///
/// Ties, which only exist transiently, are broken by admission time.
pub async fn active_entries<R: RecordReader + ?Sized>(reader: &R) -> Result<Vec<QueueEntry>> {
    let mut active: Vec<QueueEntry> = reader
        .entries()
        .await?
        .into_iter()
        .filter(|e| e.is_active())
        .collect();
    active.sort_by_key(|e| (e.position, e.queued_at, e.id));
    Ok(active)
}

/// The waiting entry at the head of the line, if any.
pub async fn next_customer<R: RecordReader + ?Sized>(reader: &R) -> Result<Option<QueueEntry>> {
    Ok(active_entries(reader)
        .await?
        .into_iter()
        .find(|e| e.position == 1 && e.status == EntryStatus::Waiting))
}

/// Active entries, followed by rides completed since `completed_since`
/// (most recent first) when a cutoff is given.
pub async fn current_queue<R: RecordReader + ?Sized>(
    reader: &R,
    completed_since: Option<DateTime<Utc>>,
) -> Result<Vec<QueueEntry>> {
    let entries = reader.entries().await?;
    let mut active: Vec<QueueEntry> = entries.iter().filter(|e| e.is_active()).cloned().collect();
    active.sort_by_key(|e| (e.position, e.queued_at, e.id));

    if let Some(since) = completed_since {
        let mut recent: Vec<QueueEntry> = entries
            .into_iter()
            .filter(|e| {
                e.status == EntryStatus::Completed && e.completed_at.is_some_and(|at| at >= since)
            })
            .collect();
        recent.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        active.extend(recent);
    }
    Ok(active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::CustomerId;
    use crate::domain::payment::{Money, Payment, PaymentMethod};
    use crate::domain::ports::{Clock, RecordStore};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryRecordStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        store: InMemoryRecordStore,
        clock: Arc<ManualClock>,
        engine: QueueEngine,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        Fixture {
            store: InMemoryRecordStore::new(),
            engine: QueueEngine::new(clock.clone()),
            clock,
        }
    }

    fn confirmed(uow: &mut dyn UnitOfWork, now: DateTime<Utc>) -> PaymentId {
        let mut payment = Payment::pending(
            CustomerId::new(),
            Money::new(dec!(25)),
            PaymentMethod::CashInHand,
            None,
            now,
        );
        payment.decide(true, None, "staff", now).unwrap();
        uow.put_payment(payment.clone());
        payment.id
    }

    async fn admit_n(f: &Fixture, uow: &mut dyn UnitOfWork, n: usize) -> Vec<QueueEntry> {
        let mut admitted = Vec::new();
        for _ in 0..n {
            let payment = confirmed(uow, f.clock.now());
            admitted.push(f.engine.admit(uow, payment).await.unwrap());
            f.clock.advance(Duration::seconds(1));
        }
        admitted
    }

    fn positions(entries: &[QueueEntry]) -> Vec<u32> {
        entries.iter().map(|e| e.position).collect()
    }

    #[tokio::test]
    async fn test_admit_appends_to_back() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 3).await;
        assert_eq!(positions(&admitted), vec![1, 2, 3]);
        assert_eq!(next_customer(&*uow).await.unwrap().unwrap().id, admitted[0].id);
    }

    #[tokio::test]
    async fn test_admit_preconditions() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();

        let pending = Payment::pending(
            CustomerId::new(),
            Money::new(dec!(25)),
            PaymentMethod::CashInHand,
            None,
            f.clock.now(),
        );
        uow.put_payment(pending.clone());
        let err = f.engine.admit(&mut *uow, pending.id).await.unwrap_err();
        assert!(matches!(err, QueueError::PaymentNotConfirmed(_)));

        let payment = confirmed(&mut *uow, f.clock.now());
        f.engine.admit(&mut *uow, payment).await.unwrap();
        let err = f.engine.admit(&mut *uow, payment).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyQueued(id) if id == payment));

        let err = f.engine.admit(&mut *uow, PaymentId::new()).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_complete_closes_the_gap() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 3).await;

        f.engine.start(&mut *uow, admitted[0].id, "driver").await.unwrap();
        let done = f.engine.complete(&mut *uow, admitted[0].id, "driver").await.unwrap();
        assert_eq!(done.status, EntryStatus::Completed);

        let active = active_entries(&*uow).await.unwrap();
        assert_eq!(positions(&active), vec![1, 2]);
        assert_eq!(active[0].id, admitted[1].id);
    }

    #[tokio::test]
    async fn test_remove_cancels_and_renumbers() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 3).await;

        let removed = f
            .engine
            .remove(&mut *uow, admitted[1].id, "left the line", "staff")
            .await
            .unwrap();
        assert_eq!(removed.status, EntryStatus::Cancelled);
        assert_eq!(removed.notes.last().unwrap(), "removed by staff: left the line");

        let active = active_entries(&*uow).await.unwrap();
        assert_eq!(
            active.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![admitted[0].id, admitted[2].id]
        );
        assert_eq!(positions(&active), vec![1, 2]);

        let again = f.engine.remove(&mut *uow, admitted[1].id, "again", "staff").await;
        assert!(matches!(again, Err(QueueError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_start_requires_waiting() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 1).await;

        f.engine.start(&mut *uow, admitted[0].id, "driver").await.unwrap();
        let twice = f.engine.start(&mut *uow, admitted[0].id, "driver").await;
        assert!(matches!(
            twice,
            Err(QueueError::InvalidTransition {
                from: EntryStatus::InProgress,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reorder_assigns_given_order() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 3).await;
        let order = vec![admitted[2].id, admitted[0].id, admitted[1].id];

        let reordered = f.engine.reorder(&mut *uow, &order, "staff").await.unwrap();
        assert_eq!(reordered.iter().map(|e| e.id).collect::<Vec<_>>(), order);
        assert_eq!(positions(&reordered), vec![1, 2, 3]);
        assert_eq!(next_customer(&*uow).await.unwrap().unwrap().id, admitted[2].id);
    }

    #[tokio::test]
    async fn test_reorder_rejects_mismatched_sets() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 3).await;
        let ids: Vec<EntryId> = admitted.iter().map(|e| e.id).collect();

        let missing = f.engine.reorder(&mut *uow, &ids[..2], "staff").await;
        assert!(matches!(missing, Err(QueueError::InvalidSet(_))));

        let duplicate = vec![ids[0], ids[0], ids[1], ids[2]];
        assert!(matches!(
            f.engine.reorder(&mut *uow, &duplicate, "staff").await,
            Err(QueueError::InvalidSet(_))
        ));

        let extra = vec![ids[0], ids[1], ids[2], EntryId::new()];
        assert!(matches!(
            f.engine.reorder(&mut *uow, &extra, "staff").await,
            Err(QueueError::InvalidSet(_))
        ));

        let active = active_entries(&*uow).await.unwrap();
        assert_eq!(active.iter().map(|e| e.id).collect::<Vec<_>>(), ids);
        assert_eq!(positions(&active), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_recalculate_is_idempotent() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 3).await;

        for (entry, position) in admitted.iter().zip([4, 9, 9]) {
            let mut gapped = entry.clone();
            gapped.position = position;
            uow.put_entry(gapped);
        }

        assert_eq!(f.engine.recalculate(&mut *uow).await.unwrap(), 3);
        let active = active_entries(&*uow).await.unwrap();
        assert_eq!(positions(&active), vec![1, 2, 3]);
        assert_eq!(active[1].id, admitted[1].id, "ties resolve by admission time");
        assert_eq!(f.engine.recalculate(&mut *uow).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sync_overwrites_but_never_clears_timestamps() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 2).await;
        let started = f.engine.start(&mut *uow, admitted[0].id, "driver").await.unwrap();

        let external = vec![
            ExternalEntryState {
                id: admitted[0].id,
                position: 2,
                status: EntryStatus::Completed,
                started_at: None,
                completed_at: Some(f.clock.now() + Duration::minutes(3)),
            },
            ExternalEntryState {
                id: EntryId::new(),
                position: 7,
                status: EntryStatus::Waiting,
                started_at: None,
                completed_at: None,
            },
        ];
        let merged = f.engine.sync_from_secondary(&mut *uow, &external).await.unwrap();
        assert_eq!(merged.len(), 1);

        let synced = uow.entry(admitted[0].id).await.unwrap().unwrap();
        assert_eq!(synced.status, EntryStatus::Completed);
        assert_eq!(synced.position, 2);
        assert_eq!(synced.started_at, started.started_at);
        assert!(synced.completed_at.is_some());

        let untouched = uow.entry(admitted[1].id).await.unwrap().unwrap();
        assert_eq!(untouched, admitted[1]);
    }

    #[tokio::test]
    async fn test_sync_keeps_recorded_ride_times() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 1).await;
        let started = f.engine.start(&mut *uow, admitted[0].id, "driver").await.unwrap();
        f.clock.advance(Duration::minutes(4));
        let completed = f.engine.complete(&mut *uow, admitted[0].id, "driver").await.unwrap();
        let recorded_start = started.started_at.unwrap();
        let recorded_end = completed.completed_at.unwrap();

        let later = recorded_end + Duration::minutes(10);
        let reports = [
            (Some(later), None),
            (Some(later), Some(later)),
            (None, Some(recorded_end - Duration::minutes(1))),
        ];
        for (started_at, completed_at) in reports {
            let external = [ExternalEntryState {
                id: completed.id,
                position: completed.position,
                status: EntryStatus::Completed,
                started_at,
                completed_at,
            }];
            f.engine.sync_from_secondary(&mut *uow, &external).await.unwrap();

            let synced = uow.entry(completed.id).await.unwrap().unwrap();
            assert_eq!(synced.status, EntryStatus::Completed);
            assert_eq!(synced.started_at, Some(recorded_start));
            assert_eq!(synced.completed_at, Some(recorded_end));
        }
    }

    #[tokio::test]
    async fn test_current_queue_with_recent_rides() {
        let f = fixture();
        let mut uow = f.store.begin().await.unwrap();
        let admitted = admit_n(&f, &mut *uow, 2).await;
        f.engine.start(&mut *uow, admitted[0].id, "driver").await.unwrap();
        f.engine.complete(&mut *uow, admitted[0].id, "driver").await.unwrap();

        let active_only = current_queue(&*uow, None).await.unwrap();
        assert_eq!(active_only.len(), 1);

        let since = f.clock.now() - Duration::minutes(60);
        let with_recent = current_queue(&*uow, Some(since)).await.unwrap();
        assert_eq!(with_recent.len(), 2);
        assert_eq!(with_recent[1].id, admitted[0].id);

        let later = f.clock.now() + Duration::minutes(1);
        assert_eq!(current_queue(&*uow, Some(later)).await.unwrap().len(), 1);
    }
}
