mod common;

use common::{Harness, claim, customer, harness};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use ridequeue::domain::customer::CustomerId;
use ridequeue::domain::payment::{PaymentMethod, PaymentStatus};
use ridequeue::domain::ports::RecordReader;
use ridequeue::domain::queue::EntryStatus;
use rust_decimal::Decimal;

const METHODS: [PaymentMethod; 3] = PaymentMethod::ALL;

async fn random_step(h: &Harness, rng: &mut StdRng, customers: &[CustomerId]) {
    let orchestrator = &h.orchestrator;
    match rng.gen_range(0..8) {
        0 | 1 => {
            let customer = customers[rng.gen_range(0..customers.len())];
            let method = METHODS[rng.gen_range(0..METHODS.len())];
            let amount = Decimal::from(rng.gen_range(0..30));
            let reference =
                (rng.gen_range(0..4) > 0).then(|| format!("ref-{}", rng.gen_range(0..1000)));
            let _ = orchestrator
                .submit_payment(claim(customer, amount, method, reference.as_deref()))
                .await;
        }
        2 | 3 => {
            let pending = orchestrator.pending_payments().await.unwrap();
            if let Some(payment) = pending.choose(rng) {
                let confirmed = rng.gen_range(0..4) > 0;
                let _ = orchestrator.decide_payment(payment.id, confirmed, None, "desk").await;
            }
        }
        4 => {
            let queue = orchestrator.current_queue(false).await.unwrap();
            if let Some(entry) = queue.choose(rng) {
                let _ = orchestrator.start_ride(entry.id, "driver").await;
            }
        }
        5 => {
            let queue = orchestrator.current_queue(false).await.unwrap();
            if let Some(entry) = queue.choose(rng) {
                let _ = orchestrator.complete_ride(entry.id, "driver").await;
            }
        }
        6 => {
            let queue = orchestrator.current_queue(false).await.unwrap();
            if let Some(entry) = queue.choose(rng) {
                let _ = orchestrator.remove_from_queue(entry.id, "stepped out", "staff").await;
            }
        }
        _ => {
            let mut ids: Vec<_> = orchestrator
                .current_queue(false)
                .await
                .unwrap()
                .iter()
                .map(|e| e.id)
                .collect();
            ids.shuffle(rng);
            orchestrator.reorder_queue(&ids, "staff").await.unwrap();
        }
    }
    h.clock.advance(chrono::Duration::seconds(rng.gen_range(1..90)));
}

async fn check_invariants(h: &Harness, customers: &[CustomerId]) {
    let queue = h.orchestrator.current_queue(false).await.unwrap();
    let positions: Vec<u32> = queue.iter().map(|e| e.position).collect();
    let expected: Vec<u32> = (1..=queue.len() as u32).collect();
    assert_eq!(positions, expected, "active positions must be 1..=k");

    let payments = h.store.payments().await.unwrap();
    for customer in customers {
        let pending = payments
            .iter()
            .filter(|p| p.customer_id == *customer && p.status == PaymentStatus::Pending)
            .count();
        assert!(pending <= 1);
        assert_eq!(h.orchestrator.has_pending(*customer).await.unwrap(), pending == 1);
    }

    let entries = h.store.entries().await.unwrap();
    for entry in &entries {
        let payment = payments.iter().find(|p| p.id == entry.payment_id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
        assert_eq!(entry.customer_id, payment.customer_id);
        if entry.status == EntryStatus::Completed {
            assert!(entry.started_at.is_some());
            assert!(entry.completed_at.is_some());
        }
    }
    let unique: std::collections::HashSet<_> = entries.iter().map(|e| e.payment_id).collect();
    assert_eq!(unique.len(), entries.len(), "one entry per payment");
}

#[tokio::test]
async fn test_random_operations_keep_queue_consistent() {
    for seed in [7_u64, 42, 1234] {
        let h = harness();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut customers = Vec::new();
        for i in 0..6 {
            customers.push(customer(&h, &format!("Rider {i}")).await);
        }

        for _ in 0..200 {
            random_step(&h, &mut rng, &customers).await;
            check_invariants(&h, &customers).await;
        }

        assert_eq!(h.orchestrator.recalculate_queue().await.unwrap(), 0);
        let before = h.orchestrator.current_queue(false).await.unwrap();
        assert_eq!(h.orchestrator.recalculate_queue().await.unwrap(), 0);
        assert_eq!(h.orchestrator.current_queue(false).await.unwrap(), before);
    }
}
