//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::cache::{CacheConfig, RecipeMatchCache};
use crate::catalog::{CatalogBuilder, FuelDef, FurnaceTypeParams, RecipeCatalog, RecipeDef, RecipeInput, RecipeOutput};
use crate::config::SimConfig;
use crate::devices::DeviceRegistry;
use crate::fixed::Fixed64;
use crate::furnace::FurnaceSnapshot;
use crate::id::{BlockLocation, FurnaceId, FurnaceTypeId};
use crate::item::{ItemProviders, ItemRef, ItemStack, OutputSlot};
use crate::stepper::{ComputedDelta, SmeltOutcome};
use slotmap::SlotMap;
use std::sync::Arc;
use std::time::Instant;

/// Simulated milliseconds per tick in every fixture.
pub const TICK_MS: u64 = 1000;
pub const COAL_BURN_TICKS: u32 = 10;
pub const COAL_TEMPERATURE: u32 = 100;
pub const SMELT_IRON_MS: u64 = 8000;
pub const OUTPUT_CAPACITY: u32 = 64;

// ===========================================================================
// Items
// ===========================================================================

pub fn coal() -> ItemRef {
    ItemRef::vanilla("COAL")
}
pub fn iron_ore() -> ItemRef {
    ItemRef::vanilla("IRON_ORE")
}
pub fn iron_ingot() -> ItemRef {
    ItemRef::vanilla("IRON_INGOT")
}
pub fn slag() -> ItemRef {
    ItemRef::vanilla("SLAG")
}
pub fn gold_ore() -> ItemRef {
    ItemRef::vanilla("GOLD_ORE")
}
pub fn gold_ingot() -> ItemRef {
    ItemRef::vanilla("GOLD_INGOT")
}

pub fn stack(item: ItemRef, amount: u32) -> ItemStack {
    ItemStack::new(item, amount)
}

pub fn providers() -> Arc<ItemProviders> {
    Arc::new(ItemProviders::with_vanilla())
}

// ===========================================================================
// Catalogs
// ===========================================================================

/// `max 100, ideal [80, 100], change 10` with the given fuel fraction.
pub fn basic_params(name: &str, max_fuel_fraction: Fixed64) -> FurnaceTypeParams {
    FurnaceTypeParams {
        name: name.to_string(),
        max_temperature: 100,
        temperature_change: 10,
        min_ideal: 80,
        max_ideal: 100,
        max_fuel_fraction,
        input_slots: 4,
    }
}

/// 2 iron ore -> 1 iron ingot in 8 s, 1 slag when spoiled.
pub fn smelt_iron() -> RecipeDef {
    RecipeDef {
        name: "smelt_iron".to_string(),
        duration_ms: SMELT_IRON_MS,
        inputs: vec![RecipeInput {
            label: "ore".to_string(),
            item: iron_ore(),
            amount: 2,
        }],
        outputs: vec![RecipeOutput {
            item: iron_ingot(),
            amount: 1,
        }],
        spoiled_outputs: vec![RecipeOutput { item: slag(), amount: 1 }],
    }
}

/// 1 iron ore + 1 gold ore -> 1 gold ingot in 4 s.
pub fn smelt_gold() -> RecipeDef {
    RecipeDef {
        name: "smelt_gold".to_string(),
        duration_ms: 4000,
        inputs: vec![
            RecipeInput {
                label: "flux".to_string(),
                item: iron_ore(),
                amount: 1,
            },
            RecipeInput {
                label: "ore".to_string(),
                item: gold_ore(),
                amount: 1,
            },
        ],
        outputs: vec![RecipeOutput {
            item: gold_ingot(),
            amount: 1,
        }],
        spoiled_outputs: vec![],
    }
}

pub fn coal_fuel() -> FuelDef {
    FuelDef {
        item: coal(),
        burn_ticks: COAL_BURN_TICKS,
        temperature: COAL_TEMPERATURE,
    }
}

fn catalog_with_fraction(max_fuel_fraction: Fixed64) -> Arc<RecipeCatalog> {
    let mut b = CatalogBuilder::with_providers(providers());
    let basic = b
        .register_furnace_type(basic_params("basic", max_fuel_fraction))
        .expect("fixture furnace type");
    b.register_recipe(basic, smelt_iron()).expect("fixture recipe");
    b.register_recipe(basic, smelt_gold()).expect("fixture recipe");
    b.register_fuel(coal_fuel());
    Arc::new(b.build())
}

/// One furnace type `basic` with `smelt_iron` then `smelt_gold`, and coal.
pub fn basic_catalog() -> Arc<RecipeCatalog> {
    catalog_with_fraction(Fixed64::ONE)
}

/// Like [`basic_catalog`] but fuel alone only reaches half of max.
pub fn half_fuel_catalog() -> Arc<RecipeCatalog> {
    catalog_with_fraction(Fixed64::from_num(0.5))
}

pub fn basic_type(catalog: &RecipeCatalog) -> FurnaceTypeId {
    catalog.furnace_type_id("basic").expect("fixture furnace type")
}

pub fn cache_for(catalog: Arc<RecipeCatalog>) -> Arc<RecipeMatchCache> {
    Arc::new(RecipeMatchCache::new(catalog, providers(), CacheConfig::default()))
}

pub fn basic_cache() -> Arc<RecipeMatchCache> {
    cache_for(basic_catalog())
}

// ===========================================================================
// Snapshots and deltas
// ===========================================================================

/// Distinct live furnace ids.
pub fn furnace_ids(n: usize) -> Vec<FurnaceId> {
    let mut map: SlotMap<FurnaceId, ()> = SlotMap::with_key();
    (0..n).map(|_| map.insert(())).collect()
}

/// A cold, empty `basic` furnace.
pub fn basic_snapshot(catalog: &RecipeCatalog, now: Instant) -> FurnaceSnapshot {
    FurnaceSnapshot {
        id: FurnaceId::default(),
        furnace_type: basic_type(catalog),
        temperature: 0,
        target_temperature: 0,
        burning: false,
        burn_ticks_remaining: 0,
        active_recipe: None,
        progress_ms: 0,
        outside_ideal_ms: 0,
        inputs: vec![None; 4],
        fuel: None,
        output: OutputSlot::new(OUTPUT_CAPACITY),
        elapsed_ms: TICK_MS,
        now,
    }
}

/// A hot `basic` furnace mid-burn with `smelt_iron` active and its inputs
/// present.
pub fn smelting_snapshot(catalog: &RecipeCatalog, now: Instant) -> FurnaceSnapshot {
    let furnace_type = basic_type(catalog);
    let recipe = catalog
        .furnace_type(furnace_type)
        .and_then(|def| def.recipes.first().copied())
        .expect("fixture recipe");
    let mut snap = basic_snapshot(catalog, now);
    snap.temperature = 90;
    snap.target_temperature = 100;
    snap.burning = true;
    snap.burn_ticks_remaining = 5;
    snap.active_recipe = Some(recipe);
    snap.inputs[0] = Some(stack(iron_ore(), 2));
    snap
}

/// A delta that changes nothing.
pub fn idle_delta(snapshot: &FurnaceSnapshot) -> ComputedDelta {
    ComputedDelta {
        furnace: snapshot.id,
        temperature: snapshot.temperature,
        target_temperature: snapshot.target_temperature,
        burning: snapshot.burning,
        burn_ticks_remaining: snapshot.burn_ticks_remaining,
        consume_fuel: false,
        matched_recipe: None,
        active_recipe: snapshot.active_recipe,
        progress_ms: snapshot.progress_ms,
        outside_ideal_ms: snapshot.outside_ideal_ms,
        outcome: SmeltOutcome::InProgress,
        stall: None,
    }
}

// ===========================================================================
// Furnaces and registries
// ===========================================================================

pub fn loc(x: i32) -> BlockLocation {
    BlockLocation::new("world", x, 64, 0)
}

/// A standalone cold `basic` furnace, for tests that drive apply directly.
pub fn new_furnace(catalog: &RecipeCatalog) -> crate::furnace::FurnaceState {
    let id = furnace_ids(1)[0];
    crate::furnace::FurnaceState::new(id, basic_type(catalog), loc(0), 4, OUTPUT_CAPACITY)
}

pub fn registry(config: SimConfig) -> DeviceRegistry {
    DeviceRegistry::new(basic_catalog(), providers(), config).expect("fixture registry")
}

pub fn sync_registry() -> DeviceRegistry {
    registry(SimConfig::synchronous())
}

pub fn async_registry() -> DeviceRegistry {
    registry(SimConfig::default())
}
