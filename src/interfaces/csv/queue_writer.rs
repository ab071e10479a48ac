use crate::domain::payment::PaymentMethod;
use crate::domain::queue::EntryStatus;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// One line of the queue listing.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct QueueRow {
    pub position: u32,
    pub customer: String,
    pub status: EntryStatus,
    pub method: PaymentMethod,
    pub amount: Decimal,
}

pub struct QueueWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> QueueWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_rows(&mut self, rows: impl IntoIterator<Item = QueueRow>) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_rows() {
        let mut out = Vec::new();
        QueueWriter::new(&mut out)
            .write_rows([QueueRow {
                position: 1,
                customer: "Ada".into(),
                status: EntryStatus::InProgress,
                method: PaymentMethod::ElectronicA,
                amount: dec!(25),
            }])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "position,customer,status,method,amount\n1,Ada,in_progress,electronic_a,25\n"
        );
    }
}
