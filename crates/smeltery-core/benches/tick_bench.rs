//! Criterion benchmarks for furnace ticking.
//!
//! Two benchmark groups:
//! - `sync_tick`: registries of 100 and 1000 smelting furnaces stepped inline
//! - `async_tick`: the same furnaces through the worker pool, waiting for
//!   workers between ticks

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use smeltery_core::config::SimConfig;
use smeltery_core::devices::DeviceRegistry;
use smeltery_core::test_utils::*;
use std::time::{Duration, Instant};

// ===========================================================================
// Setup
// ===========================================================================

/// `count` furnaces, each with plenty of fuel and ore.
fn build_registry(config: SimConfig, count: i32) -> DeviceRegistry {
    let mut reg = registry(config);
    for x in 0..count {
        reg.create("basic", loc(x));
        let furnace = reg.get_mut(&loc(x)).unwrap();
        furnace.set_fuel(Some(stack(coal(), 64)));
        furnace.inputs_mut()[0] = Some(stack(iron_ore(), 64));
    }
    reg
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_sync_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_tick");
    for count in [100, 1000] {
        let mut reg = build_registry(SimConfig::synchronous(), count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| reg.tick_all(Instant::now()));
        });
    }
    group.finish();
}

fn bench_async_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("async_tick");
    for count in [100, 1000] {
        let config = SimConfig {
            worker_threads: 4,
            max_results_per_drain: count as usize,
            ..SimConfig::default()
        };
        let mut reg = build_registry(config, count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let report = reg.tick_all(Instant::now());
                reg.wait_idle(Duration::from_secs(5));
                report
            });
        });
        reg.shutdown();
    }
    group.finish();
}

criterion_group!(benches, bench_sync_tick, bench_async_tick);
criterion_main!(benches);
