use super::customer::CustomerId;
use super::payment::PaymentId;
use crate::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
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

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Waiting,
    InProgress,
    Completed,
    Cancelled,
}

impl EntryStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::InProgress)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A customer's place in the ride queue.
///
/// `position` is only meaningful while the entry is active; terminal entries
/// keep the position they last held.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct QueueEntry {
    pub id: EntryId,
    pub customer_id: CustomerId,
    pub payment_id: PaymentId,
    pub position: u32,
    pub status: EntryStatus,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    /// Audit trail of staff actions on this entry.
    #[serde(default)]
    pub notes: Vec<String>,
}

impl QueueEntry {
    pub fn waiting(
        customer_id: CustomerId,
        payment_id: PaymentId,
        position: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            customer_id,
            payment_id,
            position,
            status: EntryStatus::Waiting,
            queued_at: now,
            started_at: None,
            completed_at: None,
            completed_by: None,
            notes: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    fn invalid(&self, action: &'static str) -> QueueError {
        QueueError::InvalidTransition {
            entry: self.id,
            from: self.status,
            action,
        }
    }

    pub fn start(&mut self, actor: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status != EntryStatus::Waiting {
            return Err(self.invalid("start"));
        }
        self.status = EntryStatus::InProgress;
        self.started_at = Some(now);
        self.notes.push(format!("ride started by {actor}"));
        Ok(())
    }

    pub fn complete(&mut self, actor: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status != EntryStatus::InProgress {
            return Err(self.invalid("complete"));
        }
        self.status = EntryStatus::Completed;
        self.completed_at = Some(now);
        self.completed_by = Some(actor.to_string());
        Ok(())
    }

    pub fn cancel(&mut self, reason: &str, actor: &str) -> Result<()> {
        if !self.is_active() {
            return Err(self.invalid("remove"));
        }
        self.status = EntryStatus::Cancelled;
        self.notes.push(format!("removed by {actor}: {reason}"));
        Ok(())
    }
}

/// One entry as reported by the secondary (desktop) console during resync.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ExternalEntryState {
    pub id: EntryId,
    pub position: u32,
    pub status: EntryStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Applies the secondary's view. Position and status are overwritten;
    /// timestamps are only filled where none was recorded locally.
    pub fn merge_external(&mut self, external: &ExternalEntryState) -> bool {
        let before = self.clone();
        self.position = external.position;
        self.status = external.status;
        if self.started_at.is_none() {
            self.started_at = external.started_at;
        }
        if self.completed_at.is_none() {
            self.completed_at = external.completed_at;
        }
        *self != before
    }
}

/// Driver-facing digest of the active queue.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct QueueSummary {
    pub length: usize,
    pub next_customer: Option<CustomerId>,
    pub next_entry: Option<EntryId>,
}

impl QueueSummary {
    /// Expects `active` ordered by position.
    pub fn of(active: &[QueueEntry]) -> Self {
        let next = active
            .iter()
            .find(|e| e.position == 1 && e.status == EntryStatus::Waiting);
        Self {
            length: active.len(),
            next_customer: next.map(|e| e.customer_id),
            next_entry: next.map(|e| e.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry() -> QueueEntry {
        QueueEntry::waiting(CustomerId::new(), PaymentId::new(), 1, Utc::now())
    }

    #[test]
    fn test_ride_lifecycle() {
        let mut e = entry();
        e.start("driver", Utc::now()).unwrap();
        assert_eq!(e.status, EntryStatus::InProgress);
        assert!(e.started_at.is_some());

        e.complete("driver", Utc::now()).unwrap();
        assert_eq!(e.status, EntryStatus::Completed);
        assert_eq!(e.completed_by.as_deref(), Some("driver"));
        assert!(!e.is_active());
    }

    #[test]
    fn test_complete_requires_in_progress() {
        let mut e = entry();
        let err = e.complete("driver", Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: EntryStatus::Waiting,
                action: "complete",
                ..
            }
        ));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut e = entry();
        e.cancel("left the line", "staff").unwrap();
        assert!(e.start("driver", Utc::now()).is_err());
        assert!(e.cancel("again", "staff").is_err());
        assert_eq!(e.notes, vec!["removed by staff: left the line".to_string()]);
    }

    #[test]
    fn test_merge_external_keeps_recorded_timestamps() {
        let mut e = entry();
        let started = Utc::now() - Duration::minutes(10);
        e.start("driver", started).unwrap();

        let external = ExternalEntryState {
            id: e.id,
            position: 3,
            status: EntryStatus::Completed,
            started_at: None,
            completed_at: Some(Utc::now()),
        };
        assert!(e.merge_external(&external));
        assert_eq!(e.position, 3);
        assert_eq!(e.status, EntryStatus::Completed);
        assert_eq!(e.started_at, Some(started));
        assert!(e.completed_at.is_some());
    }

    #[test]
    fn test_summary_points_at_head_of_line() {
        let first = QueueEntry::waiting(CustomerId::new(), PaymentId::new(), 1, Utc::now());
        let second = QueueEntry::waiting(CustomerId::new(), PaymentId::new(), 2, Utc::now());
        let summary = QueueSummary::of(&[first.clone(), second]);
        assert_eq!(summary.length, 2);
        assert_eq!(summary.next_customer, Some(first.customer_id));

        assert_eq!(QueueSummary::of(&[]).next_entry, None);
    }
}
