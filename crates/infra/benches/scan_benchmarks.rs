use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use restock_core::{Category, InventoryKey};
use restock_events::{InMemoryRestockQueue, MessageId};
use restock_infra::{
    InMemoryFrequencyStore, InMemoryInventoryStore, InventoryStore, QueueUpdater, RetryPolicy, ScanConfig,
    ScanCoordinator, ScanScope, UpdaterConfig,
};

/// Seed `size` records, one in `depleted_every` at zero stock.
fn seeded_store(size: usize, depleted_every: usize) -> Arc<InMemoryInventoryStore> {
    let store = InMemoryInventoryStore::arc();
    let category = Category::new("Cat").unwrap();
    for i in 0..size {
        let key = InventoryKey::parse(&format!("P{i:06}"), "T1").unwrap();
        let stock = if i % depleted_every == 0 { 0 } else { 10 };
        store.upsert(key, category.clone(), stock).unwrap();
    }
    store
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    for size in [1_000usize, 10_000] {
        for workers in [1usize, 4] {
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("workers_{workers}"), size),
                &size,
                |b, &size| {
                    b.iter_batched(
                        || {
                            ScanCoordinator::new(
                                seeded_store(size, 10),
                                InMemoryFrequencyStore::arc(),
                                Arc::new(InMemoryRestockQueue::new()),
                                ScanConfig {
                                    workers,
                                    publish_retry: RetryPolicy::no_retry(),
                                    store_retry: RetryPolicy::no_retry(),
                                    ..ScanConfig::default()
                                },
                            )
                        },
                        |coordinator| black_box(coordinator.scan(&ScanScope::All).unwrap()),
                        criterion::BatchSize::LargeInput,
                    );
                },
            );
        }
    }

    group.finish();
}

fn bench_updater(c: &mut Criterion) {
    let store = seeded_store(1_000, 1);
    let updater = QueueUpdater::new(store, UpdaterConfig::default());
    let id = MessageId("bench".to_string());

    c.bench_function("updater/handle_restock_message", |b| {
        b.iter(|| black_box(updater.handle(&id, "P000042:T1:Cat:Restock needed")))
    });
}

criterion_group!(benches, bench_scan, bench_updater);
criterion_main!(benches);
