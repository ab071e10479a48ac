#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use ridequeue::application::ledger::PaymentClaim;
use ridequeue::application::orchestrator::Orchestrator;
use ridequeue::config::CoreConfig;
use ridequeue::domain::customer::{CustomerId, NewCustomer};
use ridequeue::domain::payment::{Payment, PaymentMethod};
use ridequeue::domain::ports::PublisherBox;
use ridequeue::domain::queue::QueueEntry;
use ridequeue::infrastructure::broadcast::BroadcastPublisher;
use ridequeue::infrastructure::clock::ManualClock;
use ridequeue::infrastructure::in_memory::InMemoryRecordStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub store: InMemoryRecordStore,
    pub publisher: Arc<BroadcastPublisher>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with(CoreConfig::default())
}

pub fn harness_with(config: CoreConfig) -> Harness {
    let publisher = Arc::new(BroadcastPublisher::new(config.channel_capacity));
    build(config, publisher.clone(), publisher)
}

/// Builds a harness whose orchestrator publishes through `publisher`
/// instead of the harness's broadcast publisher.
pub fn harness_publishing_to(config: CoreConfig, publisher: PublisherBox) -> Harness {
    let unused = Arc::new(BroadcastPublisher::new(config.channel_capacity));
    build(config, publisher, unused)
}

fn build(config: CoreConfig, sink: PublisherBox, publisher: Arc<BroadcastPublisher>) -> Harness {
    let store = InMemoryRecordStore::new();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
    let orchestrator = Orchestrator::new(Arc::new(store.clone()), sink, &config, clock.clone());
    Harness {
        orchestrator: Arc::new(orchestrator),
        store,
        publisher,
        clock,
    }
}

pub fn claim(
    customer_id: CustomerId,
    amount: Decimal,
    method: PaymentMethod,
    reference: Option<&str>,
) -> PaymentClaim {
    PaymentClaim {
        customer_id,
        amount,
        method,
        external_ref: reference.map(str::to_string),
    }
}

pub async fn customer(h: &Harness, name: &str) -> CustomerId {
    h.orchestrator
        .register_customer(NewCustomer::named(name))
        .await
        .unwrap()
        .id
}

pub async fn submitted(h: &Harness, name: &str) -> Payment {
    let id = customer(h, name).await;
    h.orchestrator
        .submit_payment(claim(id, dec!(25.00), PaymentMethod::CashInHand, None))
        .await
        .unwrap()
}

/// Registers a customer, takes their cash and confirms it.
pub async fn queued(h: &Harness, name: &str) -> QueueEntry {
    let payment = submitted(h, name).await;
    h.orchestrator
        .decide_payment(payment.id, true, None, "desk")
        .await
        .unwrap()
        .entry
        .unwrap()
}

pub async fn positions(h: &Harness) -> Vec<u32> {
    h.orchestrator
        .current_queue(false)
        .await
        .unwrap()
        .iter()
        .map(|e| e.position)
        .collect()
}

/// Writes a replay script where `customers` riders register, pay cash and
/// are confirmed.
pub fn generate_script(path: &Path, customers: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record([
        "command", "actor", "customer", "payment", "amount", "method", "reference", "text",
    ])?;

    for i in 1..=customers {
        let customer = format!("c{i}");
        let payment = format!("p{i}");
        wtr.write_record(["register", "desk", &customer, "", "", "", "", &format!("Rider {i}")])?;
        wtr.write_record(["submit", "desk", &customer, &payment, "25", "cash_in_hand", "", ""])?;
        wtr.write_record(["confirm", "desk", "", &payment, "", "", "", ""])?;
    }

    wtr.flush()?;
    Ok(())
}
