//! Adapters for the domain ports: record stores, the broadcast publisher and
//! the wall clock.

pub mod broadcast;
pub mod clock;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

use crate::domain::customer::{Customer, CustomerId};
use crate::domain::payment::{Payment, PaymentId};
use crate::domain::queue::{EntryId, QueueEntry};
use std::collections::HashMap;
use std::hash::Hash;

/// Records staged by a unit of work, keyed by id. Records are only ever
/// upserted, so applying a change set is a plain overwrite.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub customers: HashMap<CustomerId, Customer>,
    pub payments: HashMap<PaymentId, Payment>,
    pub entries: HashMap<EntryId, QueueEntry>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.customers.is_empty() && self.payments.is_empty() && self.entries.is_empty()
    }

    pub fn apply(&mut self, staged: ChangeSet) {
        self.customers.extend(staged.customers);
        self.payments.extend(staged.payments);
        self.entries.extend(staged.entries);
    }
}

/// Committed records with the staged ones laid over them.
pub(crate) fn overlay<K, V>(
    committed: impl IntoIterator<Item = (K, V)>,
    staged: &HashMap<K, V>,
) -> Vec<V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    let mut merged: HashMap<K, V> = committed.into_iter().collect();
    merged.extend(staged.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.into_values().collect()
}
