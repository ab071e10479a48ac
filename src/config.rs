//! Core configuration.
//!
//! Loaded from a JSON file when one is given, otherwise built from defaults.
//! Every field is optional in the file; missing fields keep their default.

use crate::domain::payment::PaymentMethod;
use crate::domain::ports::{MethodSettings, PaymentConfigSource};
use crate::error::{QueueError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest accepted "recently completed" window: one week.
pub const MAX_RECENT_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Payment methods offered at the desk.
    pub payment_methods: PaymentSettings,
    /// How long a completed ride stays in the "recent" part of the queue listing.
    pub recently_completed_minutes: i64,
    /// Delivery attempts per addressed notification before it is dropped.
    pub publish_attempts: u32,
    /// Buffer size of each broadcast group.
    pub channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            payment_methods: PaymentSettings::default(),
            recently_completed_minutes: 60,
            publish_attempts: 3,
            channel_capacity: 64,
        }
    }
}

impl CoreConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_RECENT_MINUTES).contains(&self.recently_completed_minutes) {
            return Err(QueueError::Config(format!(
                "recently_completed_minutes must be between 0 and {MAX_RECENT_MINUTES}"
            )));
        }
        if self.publish_attempts == 0 {
            return Err(QueueError::Config("publish_attempts must be at least 1".into()));
        }
        for settings in &self.payment_methods.methods {
            if settings.price < Decimal::ZERO {
                return Err(QueueError::Config(format!(
                    "price for {} must not be negative",
                    settings.method
                )));
            }
        }
        Ok(())
    }
}

/// Static payment configuration; a method missing from the list is treated
/// as disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettings {
    pub methods: Vec<MethodSettings>,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        let display = |method: PaymentMethod| match method {
            PaymentMethod::ElectronicA => "Electronic (A)",
            PaymentMethod::ElectronicB => "Electronic (B)",
            PaymentMethod::CashInHand => "Cash",
        };
        Self {
            methods: PaymentMethod::ALL
                .into_iter()
                .map(|method| MethodSettings {
                    method,
                    enabled: true,
                    price: dec!(25.00),
                    display_name: display(method).to_string(),
                })
                .collect(),
        }
    }
}

impl PaymentSettings {
    pub fn disable(&mut self, method: PaymentMethod) {
        for settings in self.methods.iter_mut().filter(|s| s.method == method) {
            settings.enabled = false;
        }
    }
}

impl PaymentConfigSource for PaymentSettings {
    fn method(&self, method: PaymentMethod) -> Option<MethodSettings> {
        self.methods.iter().find(|s| s.method == method).cloned()
    }
}
