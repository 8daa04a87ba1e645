use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pi_relay::{
    gpio::{resolve_ports, PinNumbering},
    RelayController, RelayState, SimulatedBackend, StateStore, StateTable, DEFAULT_PORTS,
};
use std::time::Duration;

fn simulated_controller(dir: &tempfile::TempDir) -> RelayController {
    let controller = RelayController::new(
        Box::new(SimulatedBackend::new()),
        StateStore::new(dir.path().join("relay_states.json")),
    )
    .with_bulk_delay(Duration::ZERO);
    controller
        .initialize(&DEFAULT_PORTS)
        .expect("Should initialize");
    controller
}

/// Benchmark a single relay write, including the state file rewrite
fn bench_set(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let controller = simulated_controller(&dir);

    c.bench_function("relay_toggle", |b| {
        b.iter(|| controller.toggle(1).expect("Should toggle"))
    });
}

/// Benchmark cached status queries
fn bench_query(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let controller = simulated_controller(&dir);

    c.bench_function("relay_query", |b| {
        b.iter(|| controller.query(8).expect("Should query"))
    });
}

/// Benchmark bulk writes without inter-channel delay
fn bench_bulk(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let controller = simulated_controller(&dir);

    for count in [1usize, 4, 16] {
        let ports = &DEFAULT_PORTS[..count];
        c.bench_with_input(BenchmarkId::new("bulk_set", count), &count, |b, _| {
            b.iter(|| controller.bulk_set(ports, RelayState::On))
        });
    }
}

/// Benchmark state file save and load
fn bench_state_file(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let store = StateStore::new(dir.path().join("relay_states.json"));
    let mut table = StateTable::new();
    table.set_state(3, RelayState::On);

    c.bench_function("state_file_save", |b| {
        b.iter(|| store.try_save(&table).expect("Should save"))
    });

    store.try_save(&table).expect("Should save");
    c.bench_function("state_file_load", |b| b.iter(|| store.load()));
}

/// Benchmark port resolution for both numbering schemes
fn bench_resolve_ports(c: &mut Criterion) {
    c.bench_function("resolve_ports_chip", |b| {
        b.iter(|| resolve_ports(&DEFAULT_PORTS, PinNumbering::Chip))
    });
    c.bench_function("resolve_ports_header", |b| {
        b.iter(|| resolve_ports(&DEFAULT_PORTS, PinNumbering::Header))
    });
}

criterion_group!(
    benches,
    bench_set,
    bench_query,
    bench_bulk,
    bench_state_file,
    bench_resolve_ports
);
criterion_main!(benches);
