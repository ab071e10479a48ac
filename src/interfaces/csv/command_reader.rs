use crate::domain::payment::PaymentMethod;
use crate::error::{QueueError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScriptCommand {
    Register,
    Submit,
    Confirm,
    Deny,
    Manual,
    Start,
    Complete,
    Remove,
    Reorder,
    Recalculate,
}

/// One line of a replay script.
///
/// `customer` and `payment` hold script-local aliases. For `reorder`,
/// `payment` holds the aliases in the new order, separated by `;`.
/// `text` is the name, notes or reason, depending on the command.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptRow {
    pub command: ScriptCommand,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub payment: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Reads replay commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record
/// lengths, so trailing empty columns may be left off.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes rows; a malformed row yields an error
    /// without ending the iteration.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(QueueError::from))
    }
}
