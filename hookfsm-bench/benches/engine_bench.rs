//! State machine engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hookfsm_core::{
    CallOptions, EventDefinition, MachineConfig, MachineRegistry, ModelBinding, NoopResolver,
    TransitionTable,
};
use hookfsm_storage::EntityStore;
use serde_json::{Map, Value};
use std::sync::Arc;

fn chain(len: usize) -> Vec<EventDefinition> {
    (0..len)
        .map(|i| {
            EventDefinition::new(
                format!("next_{}", i),
                format!("state_{}", i).as_str(),
                format!("state_{}", i + 1),
            )
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_compile");

    for len in [4usize, 20, 100] {
        let events = chain(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &events, |b, events| {
            b.iter(|| black_box(TransitionTable::compile(events.clone()).unwrap()))
        });
    }

    group.finish();
}

fn bench_fire(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(EntityStore::new());
    let table = TransitionTable::compile(vec![
        EventDefinition::new("start", "created", "processing"),
        EventDefinition::new("reset", "*", "created"),
    ])
    .unwrap();
    let config = MachineConfig::new("Job", table, Arc::new(NoopResolver), store.clone());
    store.register_model(&config);
    let binding = ModelBinding::register(Arc::new(MachineRegistry::new()), config).unwrap();

    let mut attributes = Map::new();
    attributes.insert("state".to_string(), Value::String("created".to_string()));
    let entity = store.create("Job", attributes).unwrap();

    c.bench_function("fire_start_reset", |b| {
        b.to_async(&runtime).iter(|| async {
            let started = binding
                .fire("start", &entity, vec![], CallOptions::default())
                .await
                .unwrap();
            black_box(
                binding
                    .fire("reset", &started.entity, vec![], CallOptions::default())
                    .await
                    .unwrap(),
            )
        })
    });
}

criterion_group!(benches, bench_compile, bench_fire);
criterion_main!(benches);
