//! End-to-end furnace scenarios.
//!
//! Each test drives a [`DeviceRegistry`] the way a host would: place
//! furnaces, fill slots between ticks, call `tick_all`, and inspect the
//! results. Offload tests wait for the worker pool between ticks so the
//! outcome is deterministic.

use smeltery_core::cache::RecipeMatchCache;
use smeltery_core::config::SimConfig;
use smeltery_core::devices::DeviceRegistry;
use smeltery_core::furnace::FurnaceSnapshot;
use smeltery_core::stepper::{ComputedDelta, SimulationStepper, Simulator, StepError};
use smeltery_core::test_utils::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn tick_n(reg: &mut DeviceRegistry, n: usize) {
    for _ in 0..n {
        reg.tick_all(Instant::now());
    }
}

/// Offload rounds: apply the previous round's results, submit, wait.
fn round_n(reg: &mut DeviceRegistry, n: usize) {
    for _ in 0..n {
        reg.tick_all(Instant::now());
        assert!(reg.wait_idle(WAIT));
    }
}

// ===========================================================================
// Scenario A: heat up, hold, complete
// ===========================================================================

#[test]
fn heats_to_fuel_target_and_completes_on_time() {
    let mut reg = sync_registry();
    reg.create("basic", loc(0)).unwrap();
    reg.get_mut(&loc(0)).unwrap().set_fuel(Some(stack(coal(), 2)));

    for expected in (10..=100).step_by(10) {
        reg.tick_all(Instant::now());
        assert_eq!(reg.get(&loc(0)).unwrap().temperature(), expected);
    }

    // Hot and in band: load the ore.
    reg.get_mut(&loc(0)).unwrap().inputs_mut()[0] = Some(stack(iron_ore(), 2));

    tick_n(&mut reg, 7);
    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.temperature(), 100);
    assert_eq!(furnace.progress_ms(), 7000);
    assert!(furnace.output().is_empty());

    let report = reg.tick_all(Instant::now());
    assert_eq!(report.completed, 1);
    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.output().quantity(&iron_ingot()), 1);
    assert_eq!(furnace.inputs()[0], None);
    assert_eq!(furnace.active_recipe(), None);
    assert_eq!(furnace.temperature(), 100);
    assert!(furnace.is_burning());
}

#[test]
fn temperature_holds_while_fuel_lasts() {
    let mut reg = sync_registry();
    reg.create("basic", loc(0)).unwrap();
    reg.get_mut(&loc(0)).unwrap().set_fuel(Some(stack(coal(), 3)));

    tick_n(&mut reg, 10);
    for _ in 0..(2 * COAL_BURN_TICKS as usize) {
        reg.tick_all(Instant::now());
        assert_eq!(reg.get(&loc(0)).unwrap().temperature(), 100);
    }
}

// ===========================================================================
// Scenario B: fuel runs out mid-smelt
// ===========================================================================

#[test]
fn fuel_exhaustion_mid_smelt_spoils() {
    let mut reg = sync_registry();
    reg.create("basic", loc(0)).unwrap();
    reg.get_mut(&loc(0)).unwrap().set_fuel(Some(stack(coal(), 1)));
    tick_n(&mut reg, 10);
    reg.get_mut(&loc(0)).unwrap().inputs_mut()[0] = Some(stack(iron_ore(), 2));

    // Tick 11 burns the last of the coal; 12 and 13 cool to 90 and 80,
    // still in band.
    tick_n(&mut reg, 3);
    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.temperature(), 80);
    assert!(!furnace.is_burning());
    assert_eq!(furnace.progress_ms(), 3000);
    assert_eq!(furnace.outside_ideal_ms(), 0);

    // Below the band from here on.
    tick_n(&mut reg, 4);
    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.temperature(), 40);
    assert_eq!(furnace.outside_ideal_ms(), 4000);
    assert_eq!(furnace.progress_ms(), 3000);

    let report = reg.tick_all(Instant::now());
    assert_eq!(report.spoiled, 1);
    assert_eq!(report.completed, 0);
    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.output().quantity(&slag()), 1);
    assert_eq!(furnace.output().quantity(&iron_ingot()), 0);
    assert_eq!(furnace.inputs()[0], None);
    assert_eq!(furnace.temperature(), 30);
}

#[test]
fn removing_inputs_resets_without_output() {
    let mut reg = sync_registry();
    reg.create("basic", loc(0)).unwrap();
    let furnace = reg.get_mut(&loc(0)).unwrap();
    furnace.set_fuel(Some(stack(coal(), 2)));
    furnace.restore_temperature(100, 100);
    furnace.inputs_mut()[0] = Some(stack(iron_ore(), 2));

    tick_n(&mut reg, 3);
    assert_eq!(reg.get(&loc(0)).unwrap().progress_ms(), 3000);

    reg.get_mut(&loc(0)).unwrap().inputs_mut()[0] = Some(stack(iron_ore(), 1));
    let report = reg.tick_all(Instant::now());
    assert_eq!(report.reset, 1);
    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.progress_ms(), 0);
    assert_eq!(furnace.active_recipe(), None);
    assert!(furnace.output().is_empty());
    assert_eq!(furnace.inputs()[0], Some(stack(iron_ore(), 1)));
}

#[test]
fn full_output_holds_finished_smelt() {
    let mut reg = sync_registry();
    reg.create("basic", loc(0)).unwrap();
    let furnace = reg.get_mut(&loc(0)).unwrap();
    furnace.set_fuel(Some(stack(coal(), 2)));
    furnace.restore_temperature(100, 100);
    furnace.inputs_mut()[0] = Some(stack(iron_ore(), 2));
    let _ = furnace.output_mut().add(stack(iron_ingot(), OUTPUT_CAPACITY));

    tick_n(&mut reg, 10);
    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.progress_ms(), SMELT_IRON_MS);
    assert_eq!(furnace.inputs()[0], Some(stack(iron_ore(), 2)));

    // Emptying the output lets it complete on the next tick.
    let taken = reg.get_mut(&loc(0)).unwrap().output_mut().take_all();
    assert_eq!(taken, vec![stack(iron_ingot(), OUTPUT_CAPACITY)]);
    let report = reg.tick_all(Instant::now());
    assert_eq!(report.completed, 1);
}

// ===========================================================================
// Scenario C: concurrent furnaces stay separate
// ===========================================================================

#[test]
fn concurrent_furnaces_do_not_cross_contaminate() {
    let mut reg = async_registry();
    for x in 0..2 {
        reg.create("basic", loc(x)).unwrap();
        let furnace = reg.get_mut(&loc(x)).unwrap();
        furnace.set_fuel(Some(stack(coal(), 4)));
        furnace.restore_temperature(100, 100);
    }
    reg.get_mut(&loc(0)).unwrap().inputs_mut()[0] = Some(stack(iron_ore(), 2));
    {
        let gold = reg.get_mut(&loc(1)).unwrap();
        gold.inputs_mut()[1] = Some(stack(iron_ore(), 1));
        gold.inputs_mut()[3] = Some(stack(gold_ore(), 1));
    }

    round_n(&mut reg, 12);

    let iron = reg.get(&loc(0)).unwrap();
    assert_eq!(iron.output().quantity(&iron_ingot()), 1);
    assert_eq!(iron.output().quantity(&gold_ingot()), 0);
    assert!(iron.inputs().iter().all(Option::is_none));

    let gold = reg.get(&loc(1)).unwrap();
    assert_eq!(gold.output().quantity(&gold_ingot()), 1);
    assert_eq!(gold.output().quantity(&iron_ingot()), 0);
    assert!(gold.inputs().iter().all(Option::is_none));

    assert!(reg.shutdown());
}

#[test]
fn offload_matches_inline_stepping() {
    let setup = |reg: &mut DeviceRegistry| {
        for x in 0..4 {
            reg.create("basic", loc(x)).unwrap();
            let furnace = reg.get_mut(&loc(x)).unwrap();
            furnace.set_fuel(Some(stack(coal(), x as u32 + 1)));
            furnace.inputs_mut()[x as usize] = Some(stack(iron_ore(), 2));
        }
    };
    let mut inline = sync_registry();
    let mut offload = async_registry();
    setup(&mut inline);
    setup(&mut offload);

    tick_n(&mut inline, 25);
    // One extra round: the first only submits.
    round_n(&mut offload, 26);

    for x in 0..4 {
        let a = inline.get(&loc(x)).unwrap();
        let b = offload.get(&loc(x)).unwrap();
        assert_eq!(a.temperature(), b.temperature(), "furnace {x}");
        assert_eq!(a.fuel(), b.fuel(), "furnace {x}");
        assert_eq!(a.output(), b.output(), "furnace {x}");
        assert_eq!(a.inputs(), b.inputs(), "furnace {x}");
    }
    offload.shutdown();
}

// ===========================================================================
// Scenario D: a failing step leaves the furnace untouched
// ===========================================================================

/// Panics while armed, otherwise defers to the real stepper.
struct Flaky {
    inner: SimulationStepper,
    armed: AtomicBool,
}

impl Simulator for Flaky {
    fn step(&self, snapshot: &FurnaceSnapshot) -> Result<ComputedDelta, StepError> {
        if self.armed.load(Ordering::Acquire) {
            panic!("injected step failure");
        }
        self.inner.step(snapshot)
    }
}

fn flaky_registry(config: SimConfig) -> (DeviceRegistry, Arc<Flaky>) {
    let cache: Arc<RecipeMatchCache> = basic_cache();
    let flaky = Arc::new(Flaky {
        inner: SimulationStepper::new(Arc::clone(&cache), config.spoil_threshold_ms),
        armed: AtomicBool::new(true),
    });
    let reg = DeviceRegistry::with_simulator(cache, flaky.clone(), config).unwrap();
    (reg, flaky)
}

#[test]
fn panicking_worker_leaves_state_unchanged() {
    let (mut reg, flaky) = flaky_registry(SimConfig::default());
    reg.create("basic", loc(0)).unwrap();
    reg.get_mut(&loc(0)).unwrap().set_fuel(Some(stack(coal(), 2)));

    reg.tick_all(Instant::now());
    assert!(reg.wait_idle(WAIT));
    let report = reg.tick_all(Instant::now());
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 0);
    // Resubmitted after the failure drained.
    assert_eq!(report.submitted, 1);

    let furnace = reg.get(&loc(0)).unwrap();
    assert_eq!(furnace.temperature(), 0);
    assert!(!furnace.is_burning());
    assert_eq!(furnace.fuel(), Some(&stack(coal(), 2)));

    // The pool survives; disarm once the resubmitted step has failed too,
    // and the furnace proceeds.
    assert!(reg.wait_idle(WAIT));
    flaky.armed.store(false, Ordering::Release);
    reg.tick_all(Instant::now());
    assert!(reg.wait_idle(WAIT));
    let report = reg.tick_all(Instant::now());
    assert_eq!(report.applied, 1);
    assert_eq!(reg.get(&loc(0)).unwrap().temperature(), 10);
    assert!(reg.shutdown());
}

#[test]
fn panicking_inline_step_leaves_state_unchanged() {
    let (mut reg, flaky) = flaky_registry(SimConfig::synchronous());
    reg.create("basic", loc(0)).unwrap();
    reg.get_mut(&loc(0)).unwrap().set_fuel(Some(stack(coal(), 2)));

    let report = reg.tick_all(Instant::now());
    assert_eq!(report.failed, 1);
    assert_eq!(reg.get(&loc(0)).unwrap().fuel(), Some(&stack(coal(), 2)));

    flaky.armed.store(false, Ordering::Release);
    reg.tick_all(Instant::now());
    assert_eq!(reg.get(&loc(0)).unwrap().temperature(), 10);
}

// ===========================================================================
// In-flight dedup and shutdown
// ===========================================================================

/// Holds every step until released.
struct Slow {
    inner: SimulationStepper,
    release: AtomicBool,
    started: AtomicUsize,
}

impl Slow {
    /// Spin until `n` steps are held inside the simulator.
    fn wait_started(&self, n: usize) {
        let deadline = Instant::now() + WAIT;
        while self.started.load(Ordering::Acquire) < n {
            assert!(Instant::now() < deadline, "workers never picked up jobs");
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Simulator for Slow {
    fn step(&self, snapshot: &FurnaceSnapshot) -> Result<ComputedDelta, StepError> {
        self.started.fetch_add(1, Ordering::AcqRel);
        while !self.release.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
        self.inner.step(snapshot)
    }
}

fn slow_registry() -> (DeviceRegistry, Arc<Slow>) {
    let cache = basic_cache();
    let slow = Arc::new(Slow {
        inner: SimulationStepper::new(Arc::clone(&cache), SimConfig::default().spoil_threshold_ms),
        release: AtomicBool::new(false),
        started: AtomicUsize::new(0),
    });
    let config = SimConfig {
        shutdown_timeout_ms: 50,
        ..SimConfig::default()
    };
    let reg = DeviceRegistry::with_simulator(cache, slow.clone(), config).unwrap();
    (reg, slow)
}

#[test]
fn busy_furnace_is_not_resubmitted() {
    let (mut reg, slow) = slow_registry();
    reg.create("basic", loc(0)).unwrap();

    let first = reg.tick_all(Instant::now());
    assert_eq!(first.submitted, 1);
    assert_eq!(reg.in_flight(), 1);

    let second = reg.tick_all(Instant::now());
    assert_eq!(second.submitted, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(reg.in_flight(), 1);

    slow.release.store(true, Ordering::Release);
    assert!(reg.wait_idle(WAIT));
    let third = reg.tick_all(Instant::now());
    assert_eq!(third.applied, 1);
    assert_eq!(third.submitted, 1);
    reg.shutdown();
}

#[test]
fn shutdown_with_busy_workers_is_bounded() {
    let (mut reg, slow) = slow_registry();
    for x in 0..3 {
        reg.create("basic", loc(x)).unwrap();
        reg.get_mut(&loc(x)).unwrap().set_fuel(Some(stack(coal(), 1)));
    }
    assert_eq!(reg.tick_all(Instant::now()).submitted, 3);
    // Both workers are parked in the simulator; the third job is queued.
    slow.wait_started(2);

    let start = Instant::now();
    assert!(!reg.shutdown());
    assert!(reg.is_shut_down());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(reg.in_flight(), 0);

    slow.release.store(true, Ordering::Release);
    assert!(reg.wait_idle(WAIT));
    let report = reg.tick_all(Instant::now());
    assert_eq!(report.applied, 0);
    for x in 0..3 {
        assert_eq!(reg.get(&loc(x)).unwrap().temperature(), 0);
        assert_eq!(reg.get(&loc(x)).unwrap().fuel(), Some(&stack(coal(), 1)));
    }
}
