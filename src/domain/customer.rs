use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(Uuid);

impl CustomerId {
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

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields supplied when a walk-up customer registers at the desk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub contact: Option<String>,
}

impl NewCustomer {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: None,
        }
    }
}

/// A registered customer.
///
/// Names are not unique; two customers called "Sam" are told apart by
/// `created_at`. Records are never edited after creation apart from
/// deactivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

impl Customer {
    pub fn register(fields: NewCustomer, now: DateTime<Utc>) -> Self {
        Self {
            id: CustomerId::new(),
            name: fields.name.trim().to_string(),
            contact: fields
                .contact
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            created_at: now,
            active: true,
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
