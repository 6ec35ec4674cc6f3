//! Live furnace state, its immutable snapshots, and delta application.
//!
//! A [`FurnaceState`] is owned by the device registry and only mutated on the
//! tick thread. Workers see a [`FurnaceSnapshot`]: a deep copy of every field
//! and slot. [`FurnaceState::apply`] is the single place where a computed
//! delta, fuel consumption, input consumption and output emission are
//! committed.

use crate::catalog::{RecipeCatalog, RecipeOutput, covers};
use crate::id::{BlockLocation, FurnaceId, FurnaceTypeId, RecipeId};
use crate::item::{ItemProviders, ItemStack, OutputSlot, take_matching};
use crate::stepper::{ComputedDelta, SmeltOutcome, approach_temperature};
use std::time::Instant;

/// Immutable copy of a furnace taken before async computation.
#[derive(Debug, Clone, PartialEq)]
pub struct FurnaceSnapshot {
    pub id: FurnaceId,
    pub furnace_type: FurnaceTypeId,
    pub temperature: u32,
    pub target_temperature: u32,
    pub burning: bool,
    pub burn_ticks_remaining: u32,
    pub active_recipe: Option<RecipeId>,
    pub progress_ms: u64,
    pub outside_ideal_ms: u64,
    pub inputs: Vec<Option<ItemStack>>,
    pub fuel: Option<ItemStack>,
    pub output: OutputSlot,
    /// Simulated time covered by this step.
    pub elapsed_ms: u64,
    /// Host clock at snapshot time; drives match cache expiry.
    pub now: Instant,
}

/// What applying a delta actually committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcome: SmeltOutcome,
    /// Recipe that completed or spoiled.
    pub recipe: Option<RecipeId>,
    pub fuel_consumed: bool,
    /// Products that did not fit the output slot. The host decides where
    /// they go (typically dropped at the furnace).
    pub overflow: Vec<ItemStack>,
}

/// One physical furnace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FurnaceState {
    id: FurnaceId,
    furnace_type: FurnaceTypeId,
    location: BlockLocation,
    temperature: u32,
    target_temperature: u32,
    burning: bool,
    burn_ticks_remaining: u32,
    active_recipe: Option<RecipeId>,
    progress_ms: u64,
    outside_ideal_ms: u64,
    inputs: Vec<Option<ItemStack>>,
    fuel: Option<ItemStack>,
    output: OutputSlot,
}

impl FurnaceState {
    /// A cold, empty furnace.
    pub fn new(
        id: FurnaceId,
        furnace_type: FurnaceTypeId,
        location: BlockLocation,
        input_slots: usize,
        output_capacity: u32,
    ) -> Self {
        Self {
            id,
            furnace_type,
            location,
            temperature: 0,
            target_temperature: 0,
            burning: false,
            burn_ticks_remaining: 0,
            active_recipe: None,
            progress_ms: 0,
            outside_ideal_ms: 0,
            inputs: vec![None; input_slots],
            fuel: None,
            output: OutputSlot::new(output_capacity),
        }
    }

    pub fn id(&self) -> FurnaceId {
        self.id
    }

    pub fn furnace_type(&self) -> FurnaceTypeId {
        self.furnace_type
    }

    pub fn location(&self) -> &BlockLocation {
        &self.location
    }

    pub fn temperature(&self) -> u32 {
        self.temperature
    }

    pub fn target_temperature(&self) -> u32 {
        self.target_temperature
    }

    pub fn is_burning(&self) -> bool {
        self.burning
    }

    pub fn burn_ticks_remaining(&self) -> u32 {
        self.burn_ticks_remaining
    }

    pub fn active_recipe(&self) -> Option<RecipeId> {
        self.active_recipe
    }

    pub fn progress_ms(&self) -> u64 {
        self.progress_ms
    }

    pub fn outside_ideal_ms(&self) -> u64 {
        self.outside_ideal_ms
    }

    pub fn inputs(&self) -> &[Option<ItemStack>] {
        &self.inputs
    }

    /// Input slots for host edits. The slice keeps the slot count fixed.
    pub fn inputs_mut(&mut self) -> &mut [Option<ItemStack>] {
        &mut self.inputs
    }

    pub fn fuel(&self) -> Option<&ItemStack> {
        self.fuel.as_ref()
    }

    /// Replace the fuel slot, returning the previous contents.
    pub fn set_fuel(&mut self, fuel: Option<ItemStack>) -> Option<ItemStack> {
        std::mem::replace(&mut self.fuel, fuel)
    }

    pub fn output(&self) -> &OutputSlot {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputSlot {
        &mut self.output
    }

    /// Restore a persisted temperature, clamped to the type's maximum.
    pub fn restore_temperature(&mut self, temperature: u32, max_temperature: u32) {
        self.temperature = temperature.min(max_temperature);
    }

    /// Deep copy for a worker.
    pub fn snapshot(&self, elapsed_ms: u64, now: Instant) -> FurnaceSnapshot {
        FurnaceSnapshot {
            id: self.id,
            furnace_type: self.furnace_type,
            temperature: self.temperature,
            target_temperature: self.target_temperature,
            burning: self.burning,
            burn_ticks_remaining: self.burn_ticks_remaining,
            active_recipe: self.active_recipe,
            progress_ms: self.progress_ms,
            outside_ideal_ms: self.outside_ideal_ms,
            inputs: self.inputs.clone(),
            fuel: self.fuel.clone(),
            output: self.output.clone(),
            elapsed_ms,
            now,
        }
    }

    fn clear_smelt(&mut self) {
        self.active_recipe = None;
        self.progress_ms = 0;
        self.outside_ideal_ms = 0;
    }

    /// Commit a delta computed from a snapshot of this furnace.
    ///
    /// Slot contents may have changed since the snapshot (host edits between
    /// ticks), so fuel and input consumption are re-validated against the
    /// live slots. A refuel whose fuel is gone is dropped; a completion
    /// whose inputs are gone becomes a reset.
    pub fn apply(&mut self, delta: ComputedDelta, catalog: &RecipeCatalog, providers: &ItemProviders) -> ApplyReport {
        debug_assert_eq!(delta.furnace, self.id);
        let mut report = ApplyReport {
            outcome: delta.outcome,
            ..ApplyReport::default()
        };

        let previous_temperature = self.temperature;
        self.temperature = delta.temperature;
        self.target_temperature = delta.target_temperature;
        self.burning = delta.burning;
        self.burn_ticks_remaining = delta.burn_ticks_remaining;

        if delta.consume_fuel {
            if self.take_fuel_unit(catalog, providers) {
                report.fuel_consumed = true;
            } else {
                tracing::debug!(furnace = ?self.id, "fuel vanished before refuel was applied");
                self.burning = false;
                self.burn_ticks_remaining = 0;
                self.target_temperature = 0;
                // The delta heated toward fuel that was never burned.
                self.temperature = catalog
                    .furnace_type(self.furnace_type)
                    .map_or(previous_temperature, |def| approach_temperature(previous_temperature, 0, def));
            }
        }

        match delta.outcome {
            SmeltOutcome::InProgress => {
                if let Some(recipe) = delta.matched_recipe {
                    tracing::debug!(furnace = ?self.id, ?recipe, "recipe matched");
                }
                self.active_recipe = delta.active_recipe;
                self.progress_ms = delta.progress_ms;
                self.outside_ideal_ms = delta.outside_ideal_ms;
            }
            SmeltOutcome::Reset => {
                tracing::debug!(furnace = ?self.id, "inputs removed, smelt reset");
                self.clear_smelt();
            }
            SmeltOutcome::Completed | SmeltOutcome::Spoiled => {
                self.finish_smelt(&delta, catalog, providers, &mut report);
                self.clear_smelt();
            }
        }

        report
    }

    fn take_fuel_unit(&mut self, catalog: &RecipeCatalog, providers: &ItemProviders) -> bool {
        let Some(stack) = self.fuel.as_mut() else {
            return false;
        };
        if catalog.fuel_for(stack, providers).is_none() {
            return false;
        }
        stack.amount -= 1;
        if stack.amount == 0 {
            self.fuel = None;
        }
        true
    }

    fn finish_smelt(
        &mut self,
        delta: &ComputedDelta,
        catalog: &RecipeCatalog,
        providers: &ItemProviders,
        report: &mut ApplyReport,
    ) {
        let Some((recipe_id, recipe)) = delta
            .active_recipe
            .and_then(|id| catalog.recipe(id).map(|r| (id, r)))
        else {
            report.outcome = SmeltOutcome::Reset;
            return;
        };

        if !covers(&recipe.inputs, &self.inputs, providers) {
            tracing::debug!(furnace = ?self.id, recipe = %recipe.name, "inputs changed before completion, smelt reset");
            report.outcome = SmeltOutcome::Reset;
            return;
        }

        for input in &recipe.inputs {
            take_matching(&mut self.inputs, &input.item, input.amount, providers);
        }

        let products: &[RecipeOutput] = if delta.outcome == SmeltOutcome::Completed {
            &recipe.outputs
        } else {
            &recipe.spoiled_outputs
        };
        for product in products {
            let Some(stack) = providers.get_item(&product.item.kind, &product.item.id, product.amount) else {
                tracing::warn!(furnace = ?self.id, item = %product.item, "item provider could not build product");
                continue;
            };
            let item = stack.item.clone();
            let overflow = self.output.add(stack);
            if overflow > 0 {
                report.overflow.push(ItemStack::new(item, overflow));
            }
        }

        report.recipe = Some(recipe_id);
        tracing::debug!(
            furnace = ?self.id,
            recipe = %recipe.name,
            outcome = ?delta.outcome,
            "smelt finished"
        );
    }
}
