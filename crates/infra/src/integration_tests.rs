//! End-to-end tests for the replenishment pipeline.
//!
//! Ingest → Inventory Store → ScanCoordinator → Frequency Store + Channel →
//! ConsumerWorker / QueueUpdater → Inventory Store
//!
//! Verifies:
//! - Depleted records are counted, notified and replenished exactly once per occurrence
//! - Overlapping scans and the queue updater reconcile without double counting
//! - Redelivered and malformed messages are handled idempotently

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use restock_core::{Category, InventoryKey};
    use restock_events::{InMemoryRestockQueue, RestockChannel};
    use restock_inventory::{InventoryRecord, ReplenishmentRange, StockWrite};

    use crate::coordinator::{ScanConfig, ScanCoordinator, ScanScope, ScanStatus};
    use crate::ingest::ingest_lines;
    use crate::retry::RetryPolicy;
    use crate::store::{InMemoryFrequencyStore, InMemoryInventoryStore, InventoryStore, Page, StoreError};
    use crate::updater::{MessageOutcome, QueueUpdater, UpdaterConfig};
    use crate::workers::{ConsumerConfig, ConsumerWorker};

    struct Pipeline {
        inventory: Arc<InMemoryInventoryStore>,
        frequency: Arc<InMemoryFrequencyStore>,
        queue: Arc<InMemoryRestockQueue>,
        coordinator: Arc<
            ScanCoordinator<Arc<InMemoryInventoryStore>, Arc<InMemoryFrequencyStore>, Arc<InMemoryRestockQueue>>,
        >,
        updater: Arc<QueueUpdater<Arc<InMemoryInventoryStore>>>,
    }

    fn pipeline() -> Pipeline {
        let inventory = InMemoryInventoryStore::arc();
        let frequency = InMemoryFrequencyStore::arc();
        let queue = Arc::new(InMemoryRestockQueue::new());
        let coordinator = Arc::new(ScanCoordinator::new(
            inventory.clone(),
            frequency.clone(),
            queue.clone(),
            ScanConfig {
                publish_retry: RetryPolicy::immediate(3),
                store_retry: RetryPolicy::immediate(3),
                ..ScanConfig::default()
            },
        ));
        let updater = Arc::new(QueueUpdater::new(
            inventory.clone(),
            UpdaterConfig {
                store_retry: RetryPolicy::immediate(1),
                ..UpdaterConfig::default()
            },
        ));
        Pipeline {
            inventory,
            frequency,
            queue,
            coordinator,
            updater,
        }
    }

    fn key(p: &str) -> InventoryKey {
        InventoryKey::parse(p, "T1").unwrap()
    }

    fn record(p: &Pipeline, product: &str) -> InventoryRecord {
        p.inventory.get(&key(product)).unwrap().unwrap()
    }

    /// Receive everything visible and run it through the updater, acking handled messages.
    fn drain(p: &Pipeline) -> Vec<MessageOutcome> {
        let mut all = Vec::new();
        loop {
            let deliveries = p.queue.receive(10, Duration::from_secs(30)).unwrap();
            if deliveries.is_empty() {
                return all;
            }
            for d in deliveries {
                let outcome = p.updater.handle(&d.message_id, &d.body);
                if outcome.should_ack() {
                    p.queue.ack(&d.receipt).unwrap();
                }
                all.push(outcome);
            }
        }
    }

    #[test]
    fn ingested_depletion_flows_through_scan_and_queue() {
        let p = pipeline();
        let report = ingest_lines(&*p.inventory, ["P1:T1:Cat:0", "P2:T1:Cat:8"], &RetryPolicy::no_retry());
        assert_eq!(report.upserted, 2);

        let scan = p.coordinator.scan(&ScanScope::All).unwrap();
        assert_eq!(scan.status, ScanStatus::Success);
        assert_eq!(scan.replenished_count, 1);
        assert_eq!(p.frequency.frequency(&key("P1")), 1);
        assert!(ReplenishmentRange::default().contains(record(&p, "P1").stock()));
        assert_eq!(p.queue.ready_bodies(), vec!["P1:T1:Cat:Restock needed".to_string()]);

        let outcomes = drain(&p);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(record(&p, "P1").stock(), 25);
        assert_eq!(record(&p, "P2").stock(), 8);
    }

    #[test]
    fn repeated_depletion_counts_and_notifies_again() {
        let p = pipeline();
        p.inventory.upsert(key("P1"), Category::new("Cat").unwrap(), 0).unwrap();

        p.coordinator.scan(&ScanScope::All).unwrap();
        drain(&p);

        // Sold out again.
        p.inventory.write_stock(&key("P1"), StockWrite::Set { stock: 0 }).unwrap();
        let scan = p.coordinator.scan(&ScanScope::All).unwrap();

        assert_eq!(scan.replenished_count, 1);
        assert_eq!(p.frequency.frequency(&key("P1")), 2);
        assert_eq!(p.queue.ready_len(), 1);
    }

    #[test]
    fn concurrent_scans_publish_once_per_depletion() {
        let p = pipeline();
        for i in 0..50 {
            p.inventory
                .upsert(key(&format!("P{i:02}")), Category::new("Cat").unwrap(), 0)
                .unwrap();
        }

        let scans: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = p.coordinator.clone();
                thread::spawn(move || coordinator.scan(&ScanScope::All).unwrap())
            })
            .collect();
        let reports: Vec<_> = scans.into_iter().map(|h| h.join().unwrap()).collect();

        let replenished: usize = reports.iter().map(|r| r.replenished_count).sum();
        let counted: usize = reports.iter().map(|r| r.counted).sum();
        assert_eq!(replenished, 50);
        assert_eq!(counted, 50);
        assert_eq!(p.queue.ready_len(), 50);
        for i in 0..50 {
            assert_eq!(p.frequency.frequency(&key(&format!("P{i:02}"))), 1);
        }
        assert!(p.inventory.all().iter().all(|r| !r.is_depleted()));
    }

    #[test]
    fn scan_racing_queue_updater_never_leaves_stock_at_zero() {
        let p = pipeline();
        for i in 0..30 {
            p.inventory
                .upsert(key(&format!("P{i:02}")), Category::new("Cat").unwrap(), 0)
                .unwrap();
        }

        let coordinator = p.coordinator.clone();
        let scanner = thread::spawn(move || {
            for _ in 0..3 {
                coordinator.scan(&ScanScope::All).unwrap();
            }
        });
        for _ in 0..20 {
            drain(&p);
            thread::sleep(Duration::from_millis(1));
        }
        scanner.join().unwrap();
        drain(&p);

        for r in p.inventory.all() {
            assert!(!r.is_depleted());
            assert!(r.stock() == 25 || ReplenishmentRange::default().contains(r.stock()));
            assert_eq!(p.frequency.frequency(r.key()), 1);
        }
    }

    #[test]
    fn redelivered_message_is_idempotent() {
        let p = pipeline();
        p.inventory.upsert(key("P1"), Category::new("Cat").unwrap(), 3).unwrap();
        p.queue.send("P1:T1:Cat:Restock needed".to_string()).unwrap();

        // First holder processes but never acks; visibility expires immediately.
        let first = p.queue.receive(1, Duration::ZERO).unwrap();
        p.updater.handle(&first[0].message_id, &first[0].body);
        assert_eq!(record(&p, "P1").stock(), 25);

        let second = p.queue.receive(1, Duration::from_secs(30)).unwrap();
        assert_eq!(second[0].receive_count, 2);
        assert_eq!(second[0].message_id, first[0].message_id);
        p.updater.handle(&second[0].message_id, &second[0].body);
        p.queue.ack(&second[0].receipt).unwrap();

        assert_eq!(record(&p, "P1").stock(), 25);
        assert_eq!(p.queue.ready_len() + p.queue.in_flight_len(), 0);
    }

    #[test]
    fn unknown_reason_and_malformed_messages_are_dropped_without_mutation() {
        let p = pipeline();
        p.inventory.upsert(key("P1"), Category::new("Cat").unwrap(), 7).unwrap();
        for body in ["P1:T1:Cat:Recalled", "P1:T1", "::::", "P1:T1:Cat:Restock needed:extra"] {
            p.queue.send(body.to_string()).unwrap();
        }

        let outcomes = drain(&p);

        assert_eq!(outcomes.len(), 4);
        assert!(matches!(outcomes[0], MessageOutcome::Ignored { .. }));
        assert!(outcomes[1..].iter().all(|o| matches!(o, MessageOutcome::Discarded { .. })));
        assert_eq!(record(&p, "P1").stock(), 7);
        assert_eq!(p.queue.ready_len() + p.queue.in_flight_len(), 0);
    }

    /// Inventory store whose stock writes fail a fixed number of times.
    struct FlakyWrites {
        inner: InMemoryInventoryStore,
        failures: AtomicUsize,
    }

    impl InventoryStore for FlakyWrites {
        fn scan_page(&self, after: Option<&InventoryKey>, limit: usize) -> Result<Page<InventoryRecord>, StoreError> {
            self.inner.scan_page(after, limit)
        }

        fn get(&self, key: &InventoryKey) -> Result<Option<InventoryRecord>, StoreError> {
            self.inner.get(key)
        }

        fn upsert(&self, key: InventoryKey, category: Category, stock: u32) -> Result<InventoryRecord, StoreError> {
            self.inner.upsert(key, category, stock)
        }

        fn write_stock(&self, key: &InventoryKey, write: StockWrite) -> Result<InventoryRecord, StoreError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Transient("write timed out".to_string()));
            }
            self.inner.write_stock(key, write)
        }
    }

    #[test]
    fn failed_store_write_is_redelivered_until_applied() {
        let store = Arc::new(FlakyWrites {
            inner: InMemoryInventoryStore::new(),
            failures: AtomicUsize::new(2),
        });
        store.upsert(key("P1"), Category::new("Cat").unwrap(), 0).unwrap();
        let queue = Arc::new(InMemoryRestockQueue::new());
        queue.send("P1:T1:Cat:Restock needed".to_string()).unwrap();

        let updater = Arc::new(QueueUpdater::new(
            store.clone(),
            UpdaterConfig {
                store_retry: RetryPolicy::no_retry(),
                ..UpdaterConfig::default()
            },
        ));
        let worker = ConsumerWorker::new(
            updater,
            queue.clone(),
            ConsumerConfig {
                visibility_timeout: Duration::ZERO,
                ..ConsumerConfig::default()
            },
        );

        let (first, _) = worker.poll_once().unwrap().unwrap();
        assert_eq!(first.retry.len(), 1);
        let (second, _) = worker.poll_once().unwrap().unwrap();
        assert_eq!(second.retry.len(), 1);
        let (third, _) = worker.poll_once().unwrap().unwrap();
        assert_eq!(third.applied.len(), 1);

        assert_eq!(store.get(&key("P1")).unwrap().unwrap().stock(), 25);
        assert!(worker.poll_once().unwrap().is_none());
    }

    #[test]
    fn poison_message_is_dead_lettered() {
        let store = Arc::new(FlakyWrites {
            inner: InMemoryInventoryStore::new(),
            failures: AtomicUsize::new(usize::MAX),
        });
        store.upsert(key("P1"), Category::new("Cat").unwrap(), 0).unwrap();
        let queue = Arc::new(InMemoryRestockQueue::new().with_max_receives(3));
        queue.send("P1:T1:Cat:Restock needed".to_string()).unwrap();

        let updater = Arc::new(QueueUpdater::new(
            store,
            UpdaterConfig {
                store_retry: RetryPolicy::no_retry(),
                ..UpdaterConfig::default()
            },
        ));
        let worker = ConsumerWorker::new(
            updater,
            queue.clone(),
            ConsumerConfig {
                visibility_timeout: Duration::ZERO,
                ..ConsumerConfig::default()
            },
        );

        for _ in 0..3 {
            assert!(worker.poll_once().unwrap().is_some());
        }
        assert!(worker.poll_once().unwrap().is_none());

        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].receive_count, 3);
    }

    #[test]
    fn tenant_scoped_scan_is_isolated() {
        let p = pipeline();
        ingest_lines(
            &*p.inventory,
            ["P1:T1:Cat:0", "P1:T2:Cat:0"],
            &RetryPolicy::no_retry(),
        );

        let scope = ScanScope::Tenant(restock_core::TenantId::new("T2").unwrap());
        p.coordinator.scan(&scope).unwrap();

        let t2 = InventoryKey::parse("P1", "T2").unwrap();
        assert_eq!(p.frequency.frequency(&t2), 1);
        assert_eq!(p.frequency.frequency(&key("P1")), 0);
        assert_eq!(record(&p, "P1").stock(), 0);
    }
}
