//! One tick of furnace simulation as a pure function of a snapshot.
//!
//! The stepper never touches live state. It reads the catalog, the match
//! cache and the item providers, and describes the tick's effect as a
//! [`ComputedDelta`] that the tick thread applies later.
//!
//! Order inside a step: burn, temperature, recipe acquisition, progress.

use crate::cache::RecipeMatchCache;
use crate::catalog::{FurnaceTypeDef, RecipeCatalog, covers};
use crate::furnace::FurnaceSnapshot;
use crate::id::{FurnaceId, FurnaceTypeId, RecipeId};
use crate::item::ItemProviders;
use std::sync::Arc;

/// Time a smelt may spend outside the ideal band before it spoils.
pub const DEFAULT_SPOIL_THRESHOLD_MS: u64 = 5000;

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// How the smelt attempt stands after the step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmeltOutcome {
    /// Still smelting, or idle with no recipe.
    #[default]
    InProgress,
    /// Progress reached the recipe duration: consume inputs, emit outputs.
    Completed,
    /// Too long outside the ideal band: consume inputs, emit spoiled outputs.
    Spoiled,
    /// Inputs no longer satisfy the recipe: drop progress, no output.
    Reset,
}

/// Why a finished smelt is held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    OutputFull,
}

/// State changes computed for one tick of one furnace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedDelta {
    pub furnace: FurnaceId,
    pub temperature: u32,
    pub target_temperature: u32,
    pub burning: bool,
    pub burn_ticks_remaining: u32,
    /// One unit of fuel must be taken from the fuel slot.
    pub consume_fuel: bool,
    /// Recipe acquired during this step, if the furnace had none.
    pub matched_recipe: Option<RecipeId>,
    /// Recipe the progress fields refer to.
    pub active_recipe: Option<RecipeId>,
    pub progress_ms: u64,
    pub outside_ideal_ms: u64,
    pub outcome: SmeltOutcome,
    pub stall: Option<StallReason>,
}

/// Failures that keep a step from producing a delta.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("snapshot names unknown furnace type {0:?}")]
    UnknownFurnaceType(FurnaceTypeId),
    #[error("snapshot names unknown recipe {0:?}")]
    UnknownRecipe(RecipeId),
}

// ---------------------------------------------------------------------------
// Simulator seam
// ---------------------------------------------------------------------------

/// Computes a delta from a snapshot. Runs on worker threads.
pub trait Simulator: Send + Sync {
    fn step(&self, snapshot: &FurnaceSnapshot) -> Result<ComputedDelta, StepError>;
}

/// The furnace state machine.
#[derive(Debug, Clone)]
pub struct SimulationStepper {
    cache: Arc<RecipeMatchCache>,
    spoil_threshold_ms: u64,
}

impl SimulationStepper {
    pub fn new(cache: Arc<RecipeMatchCache>, spoil_threshold_ms: u64) -> Self {
        Self {
            cache,
            spoil_threshold_ms,
        }
    }

    pub fn cache(&self) -> &Arc<RecipeMatchCache> {
        &self.cache
    }

    pub fn catalog(&self) -> &Arc<RecipeCatalog> {
        self.cache.catalog()
    }
}

struct BurnUpdate {
    burning: bool,
    remaining: u32,
    target: u32,
    consume_fuel: bool,
}

fn burn_update(
    snapshot: &FurnaceSnapshot,
    furnace: &FurnaceTypeDef,
    catalog: &RecipeCatalog,
    providers: &ItemProviders,
) -> BurnUpdate {
    if snapshot.burn_ticks_remaining > 0 {
        return BurnUpdate {
            burning: true,
            remaining: snapshot.burn_ticks_remaining - 1,
            target: snapshot.target_temperature,
            consume_fuel: false,
        };
    }
    let fuel = snapshot
        .fuel
        .as_ref()
        .and_then(|stack| catalog.fuel_for(stack, providers));
    match fuel {
        Some(fuel) => BurnUpdate {
            burning: true,
            remaining: fuel.burn_ticks,
            target: fuel.temperature.min(furnace.max_fuel_temperature()),
            consume_fuel: true,
        },
        None => BurnUpdate {
            burning: false,
            remaining: 0,
            target: 0,
            consume_fuel: false,
        },
    }
}

/// Move `current` one step toward `target`, never past it, then clamp to
/// the furnace's range.
pub fn approach_temperature(current: u32, target: u32, furnace: &FurnaceTypeDef) -> u32 {
    let change = furnace.temperature_change;
    let next = if current < target {
        current.saturating_add(change).min(target)
    } else if current > target {
        current.saturating_sub(change).max(target)
    } else {
        current
    };
    next.min(furnace.max_temperature)
}

impl Simulator for SimulationStepper {
    fn step(&self, snapshot: &FurnaceSnapshot) -> Result<ComputedDelta, StepError> {
        let catalog = self.cache.catalog();
        let providers = self.cache.providers();
        let furnace = catalog
            .furnace_type(snapshot.furnace_type)
            .ok_or(StepError::UnknownFurnaceType(snapshot.furnace_type))?;

        let burn = burn_update(snapshot, furnace, catalog, providers);
        let temperature = approach_temperature(snapshot.temperature, burn.target, furnace);

        let mut delta = ComputedDelta {
            furnace: snapshot.id,
            temperature,
            target_temperature: burn.target,
            burning: burn.burning,
            burn_ticks_remaining: burn.remaining,
            consume_fuel: burn.consume_fuel,
            matched_recipe: None,
            active_recipe: snapshot.active_recipe,
            progress_ms: snapshot.progress_ms,
            outside_ideal_ms: snapshot.outside_ideal_ms,
            outcome: SmeltOutcome::InProgress,
            stall: None,
        };

        if delta.active_recipe.is_none() {
            delta.matched_recipe = self.cache.get(snapshot.furnace_type, &snapshot.inputs, snapshot.now);
            delta.active_recipe = delta.matched_recipe;
        }
        let Some(recipe_id) = delta.active_recipe else {
            return Ok(delta);
        };
        let recipe = catalog
            .recipe(recipe_id)
            .ok_or(StepError::UnknownRecipe(recipe_id))?;

        if !covers(&recipe.inputs, &snapshot.inputs, providers) {
            delta.active_recipe = None;
            delta.matched_recipe = None;
            delta.progress_ms = 0;
            delta.outside_ideal_ms = 0;
            delta.outcome = SmeltOutcome::Reset;
            return Ok(delta);
        }

        if furnace.in_ideal_band(temperature) {
            delta.outside_ideal_ms = 0;
            delta.progress_ms = snapshot.progress_ms.saturating_add(snapshot.elapsed_ms);
            if delta.progress_ms >= recipe.duration_ms {
                if snapshot.output.has_space_for(recipe.output_total()) {
                    delta.outcome = SmeltOutcome::Completed;
                } else {
                    delta.progress_ms = recipe.duration_ms;
                    delta.stall = Some(StallReason::OutputFull);
                }
            }
        } else {
            delta.outside_ideal_ms = snapshot.outside_ideal_ms.saturating_add(snapshot.elapsed_ms);
            if delta.outside_ideal_ms >= self.spoil_threshold_ms {
                delta.outcome = SmeltOutcome::Spoiled;
            }
        }

        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use std::time::Instant;

    fn stepper() -> SimulationStepper {
        SimulationStepper::new(basic_cache(), DEFAULT_SPOIL_THRESHOLD_MS)
    }

    fn basic_def() -> FurnaceTypeDef {
        let catalog = basic_catalog();
        catalog.furnace_type(basic_type(&catalog)).unwrap().clone()
    }

    #[test]
    fn approach_clamps_to_target() {
        let def = basic_def();
        assert_eq!(approach_temperature(95, 100, &def), 100);
        assert_eq!(approach_temperature(5, 0, &def), 0);
        assert_eq!(approach_temperature(50, 50, &def), 50);
    }

    #[test]
    fn approach_clamps_to_max_temperature() {
        let def = basic_def();
        assert_eq!(approach_temperature(250, 300, &def), 100);
    }

    #[test]
    fn cold_furnace_without_fuel_stays_idle() {
        let s = stepper();
        let snap = basic_snapshot(s.catalog(), Instant::now());
        let delta = s.step(&snap).unwrap();
        assert!(!delta.burning);
        assert!(!delta.consume_fuel);
        assert_eq!(delta.temperature, 0);
        assert_eq!(delta.target_temperature, 0);
        assert_eq!(delta.active_recipe, None);
    }

    #[test]
    fn zero_crossing_consumes_one_fuel() {
        let s = stepper();
        let mut snap = basic_snapshot(s.catalog(), Instant::now());
        snap.fuel = Some(stack(coal(), 3));
        let delta = s.step(&snap).unwrap();
        assert!(delta.consume_fuel);
        assert!(delta.burning);
        assert_eq!(delta.burn_ticks_remaining, COAL_BURN_TICKS);
        assert_eq!(delta.target_temperature, 100);
        assert_eq!(delta.temperature, 10);
    }

    #[test]
    fn burning_furnace_does_not_refuel() {
        let s = stepper();
        let mut snap = basic_snapshot(s.catalog(), Instant::now());
        snap.fuel = Some(stack(coal(), 3));
        snap.burning = true;
        snap.burn_ticks_remaining = 4;
        snap.target_temperature = 100;
        let delta = s.step(&snap).unwrap();
        assert!(!delta.consume_fuel);
        assert_eq!(delta.burn_ticks_remaining, 3);
        assert_eq!(delta.target_temperature, 100);
    }

    #[test]
    fn fuel_target_is_capped_by_fuel_fraction() {
        let catalog = half_fuel_catalog();
        let cache = cache_for(catalog.clone());
        let s = SimulationStepper::new(cache, DEFAULT_SPOIL_THRESHOLD_MS);
        let mut snap = basic_snapshot(&catalog, Instant::now());
        snap.fuel = Some(stack(coal(), 1));
        let delta = s.step(&snap).unwrap();
        assert_eq!(delta.target_temperature, 50);
    }

    #[test]
    fn non_fuel_item_is_ignored() {
        let s = stepper();
        let mut snap = basic_snapshot(s.catalog(), Instant::now());
        snap.fuel = Some(stack(iron_ore(), 3));
        let delta = s.step(&snap).unwrap();
        assert!(!delta.consume_fuel);
        assert!(!delta.burning);
    }

    #[test]
    fn recipe_is_acquired_from_inputs() {
        let s = stepper();
        let mut snap = basic_snapshot(s.catalog(), Instant::now());
        snap.inputs[1] = Some(stack(iron_ore(), 1));
        snap.inputs[3] = Some(stack(iron_ore(), 1));
        let delta = s.step(&snap).unwrap();
        let smelt = s.catalog().furnace_type(snap.furnace_type).unwrap().recipes[0];
        assert_eq!(delta.matched_recipe, Some(smelt));
        assert_eq!(delta.active_recipe, Some(smelt));
        // Cold: counts as outside the band.
        assert_eq!(delta.outside_ideal_ms, TICK_MS);
        assert_eq!(delta.progress_ms, 0);
    }

    #[test]
    fn in_band_progress_resets_outside_time() {
        let s = stepper();
        let mut snap = smelting_snapshot(s.catalog(), Instant::now());
        snap.outside_ideal_ms = 3000;
        snap.progress_ms = 2000;
        let delta = s.step(&snap).unwrap();
        assert_eq!(delta.progress_ms, 2000 + TICK_MS);
        assert_eq!(delta.outside_ideal_ms, 0);
        assert_eq!(delta.outcome, SmeltOutcome::InProgress);
    }

    #[test]
    fn completes_at_duration() {
        let s = stepper();
        let mut snap = smelting_snapshot(s.catalog(), Instant::now());
        snap.progress_ms = SMELT_IRON_MS - TICK_MS;
        let delta = s.step(&snap).unwrap();
        assert_eq!(delta.progress_ms, SMELT_IRON_MS);
        assert_eq!(delta.outcome, SmeltOutcome::Completed);
    }

    #[test]
    fn full_output_stalls_completion() {
        let s = stepper();
        let mut snap = smelting_snapshot(s.catalog(), Instant::now());
        snap.progress_ms = SMELT_IRON_MS;
        let _ = snap.output.add(stack(iron_ingot(), snap.output.capacity));
        let delta = s.step(&snap).unwrap();
        assert_eq!(delta.outcome, SmeltOutcome::InProgress);
        assert_eq!(delta.stall, Some(StallReason::OutputFull));
        assert_eq!(delta.progress_ms, SMELT_IRON_MS);
    }

    #[test]
    fn spoils_after_threshold_outside_band() {
        let s = stepper();
        let mut snap = smelting_snapshot(s.catalog(), Instant::now());
        snap.temperature = 40;
        snap.target_temperature = 0;
        snap.burning = false;
        snap.burn_ticks_remaining = 0;
        snap.outside_ideal_ms = DEFAULT_SPOIL_THRESHOLD_MS - TICK_MS;
        snap.progress_ms = 4000;
        let delta = s.step(&snap).unwrap();
        assert_eq!(delta.outcome, SmeltOutcome::Spoiled);
        assert_eq!(delta.progress_ms, 4000);
    }

    #[test]
    fn removed_inputs_reset_progress() {
        let s = stepper();
        let mut snap = smelting_snapshot(s.catalog(), Instant::now());
        snap.progress_ms = 5000;
        snap.inputs = vec![None; snap.inputs.len()];
        let delta = s.step(&snap).unwrap();
        assert_eq!(delta.outcome, SmeltOutcome::Reset);
        assert_eq!(delta.progress_ms, 0);
        assert_eq!(delta.active_recipe, None);
    }

    #[test]
    fn unknown_furnace_type_is_an_error() {
        let s = stepper();
        let mut snap = basic_snapshot(s.catalog(), Instant::now());
        snap.furnace_type = FurnaceTypeId(99);
        assert_eq!(s.step(&snap), Err(StepError::UnknownFurnaceType(FurnaceTypeId(99))));
    }

    #[test]
    fn unknown_recipe_is_an_error() {
        let s = stepper();
        let mut snap = basic_snapshot(s.catalog(), Instant::now());
        snap.active_recipe = Some(RecipeId(99));
        assert_eq!(s.step(&snap), Err(StepError::UnknownRecipe(RecipeId(99))));
    }
}
