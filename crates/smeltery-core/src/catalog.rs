//! Furnace types, recipes and fuels.
//!
//! Content is registered through a [`CatalogBuilder`] and frozen into an
//! immutable [`RecipeCatalog`] that workers share behind an `Arc`.
//! Configuration defects are repaired on registration and recorded as
//! [`CatalogWarning`]s; recipes that cannot be repaired are rejected.

use crate::fixed::{Fixed64, fixed64_to_f64, scale_floor};
use crate::id::{FurnaceTypeId, RecipeId};
use crate::item::{ItemProviders, ItemRef, ItemStack, count_matching};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Input slots given to a furnace type that asks for none.
pub const DEFAULT_INPUT_SLOTS: usize = 4;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One input requirement of a recipe. `label` names the slot group in
/// configuration; matching itself is positional-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeInput {
    pub label: String,
    pub item: ItemRef,
    pub amount: u32,
}

/// One product of a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeOutput {
    pub item: ItemRef,
    pub amount: u32,
}

/// A smelting recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDef {
    pub name: String,
    /// In-band smelting time needed to complete, in milliseconds.
    pub duration_ms: u64,
    pub inputs: Vec<RecipeInput>,
    pub outputs: Vec<RecipeOutput>,
    /// Produced instead of `outputs` when the attempt spoils.
    pub spoiled_outputs: Vec<RecipeOutput>,
}

impl RecipeDef {
    /// Total item count of the regular outputs.
    pub fn output_total(&self) -> u32 {
        self.outputs.iter().fold(0u32, |acc, o| acc.saturating_add(o.amount))
    }
}

/// A burnable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuelDef {
    pub item: ItemRef,
    /// Ticks one unit keeps the furnace burning.
    pub burn_ticks: u32,
    /// Target temperature the fuel drives toward.
    pub temperature: u32,
}

/// A furnace type after repair. Satisfies
/// `min_ideal <= max_ideal <= max_temperature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FurnaceTypeDef {
    pub name: String,
    pub max_temperature: u32,
    /// Degrees moved toward the target per tick.
    pub temperature_change: u32,
    pub min_ideal: u32,
    pub max_ideal: u32,
    /// Fraction of `max_temperature` reachable from fuel alone, in `[0, 1]`.
    pub max_fuel_fraction: Fixed64,
    pub input_slots: usize,
    /// Recipes in declared order. The first match wins.
    pub recipes: Vec<RecipeId>,
}

impl FurnaceTypeDef {
    /// `floor(max_temperature * max_fuel_fraction)`.
    pub fn max_fuel_temperature(&self) -> u32 {
        scale_floor(self.max_temperature, self.max_fuel_fraction)
    }

    pub fn in_ideal_band(&self, temperature: u32) -> bool {
        (self.min_ideal..=self.max_ideal).contains(&temperature)
    }
}

/// Unvalidated furnace type parameters, as read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FurnaceTypeParams {
    pub name: String,
    pub max_temperature: u32,
    pub temperature_change: u32,
    pub min_ideal: u32,
    pub max_ideal: u32,
    pub max_fuel_fraction: Fixed64,
    pub input_slots: usize,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// A configuration defect that was repaired (or a recipe that was dropped)
/// while building the catalog.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogWarning {
    #[error("furnace '{furnace}': max temperature 0 raised to 1")]
    MaxTemperatureZero { furnace: String },
    #[error("furnace '{furnace}': max ideal {max_ideal} above max temperature {max_temperature}, clamped")]
    IdealAboveMax {
        furnace: String,
        max_ideal: u32,
        max_temperature: u32,
    },
    #[error("furnace '{furnace}': min ideal {min_ideal} above max ideal {max_ideal}, clamped")]
    IdealBandInverted {
        furnace: String,
        min_ideal: u32,
        max_ideal: u32,
    },
    #[error("furnace '{furnace}': temperature change 0 raised to 1")]
    ZeroTemperatureChange { furnace: String },
    #[error("furnace '{furnace}': fuel fraction {fraction} outside [0, 1], clamped")]
    FuelFractionOutOfRange { furnace: String, fraction: f64 },
    #[error("furnace '{furnace}': fuel percentage {value} is not finite, using 100")]
    FuelPercentageNotFinite { furnace: String, value: f64 },
    #[error("furnace '{furnace}': no input slots, using {DEFAULT_INPUT_SLOTS}")]
    NoInputSlots { furnace: String },
    #[error("recipe '{recipe}': amount of {item} raised to 1")]
    AmountCoerced { recipe: String, item: ItemRef },
    #[error("fuel {item}: burn time 0 raised to 1 tick")]
    FuelBurnTimeCoerced { item: ItemRef },
    #[error("furnace '{furnace}': recipe '{recipe}' rejected: {reason}")]
    RecipeRejected {
        furnace: String,
        recipe: String,
        reason: String,
    },
    #[error("fuel {item} rejected: unknown item provider")]
    FuelRejected { item: ItemRef },
}

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown furnace type: {0:?}")]
    UnknownFurnaceType(FurnaceTypeId),
    #[error("duplicate furnace type: {0}")]
    DuplicateFurnaceType(String),
    #[error("duplicate recipe name")]
    DuplicateRecipe,
    #[error("smelt time must be positive")]
    NonPositiveDuration,
    #[error("no inputs")]
    NoInputs,
    #[error("no outputs")]
    NoOutputs,
    #[error("unknown item provider '{0}'")]
    UnknownItemProvider(String),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`RecipeCatalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    furnace_types: Vec<FurnaceTypeDef>,
    type_name_to_id: HashMap<String, FurnaceTypeId>,
    recipes: Vec<RecipeDef>,
    fuels: Vec<FuelDef>,
    warnings: Vec<CatalogWarning>,
    /// When set, item references are checked against the registered kinds.
    providers: Option<Arc<ItemProviders>>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder that rejects recipes and fuels naming unknown provider kinds.
    pub fn with_providers(providers: Arc<ItemProviders>) -> Self {
        Self {
            providers: Some(providers),
            ..Self::default()
        }
    }

    /// Record a repaired defect. Loaders use this for problems found
    /// before an entry reaches the builder.
    pub fn warn(&mut self, warning: CatalogWarning) {
        tracing::warn!(%warning, "catalog entry repaired");
        self.warnings.push(warning);
    }

    /// Register a furnace type, repairing out-of-range parameters.
    pub fn register_furnace_type(&mut self, params: FurnaceTypeParams) -> Result<FurnaceTypeId, CatalogError> {
        if self.type_name_to_id.contains_key(&params.name) {
            return Err(CatalogError::DuplicateFurnaceType(params.name));
        }
        let name = params.name;

        let mut max_temperature = params.max_temperature;
        if max_temperature == 0 {
            self.warn(CatalogWarning::MaxTemperatureZero { furnace: name.clone() });
            max_temperature = 1;
        }

        let mut max_ideal = params.max_ideal;
        if max_ideal > max_temperature {
            self.warn(CatalogWarning::IdealAboveMax {
                furnace: name.clone(),
                max_ideal,
                max_temperature,
            });
            max_ideal = max_temperature;
        }

        let mut min_ideal = params.min_ideal;
        if min_ideal > max_ideal {
            self.warn(CatalogWarning::IdealBandInverted {
                furnace: name.clone(),
                min_ideal,
                max_ideal,
            });
            min_ideal = max_ideal;
        }

        let mut temperature_change = params.temperature_change;
        if temperature_change == 0 {
            self.warn(CatalogWarning::ZeroTemperatureChange { furnace: name.clone() });
            temperature_change = 1;
        }

        let mut max_fuel_fraction = params.max_fuel_fraction;
        if max_fuel_fraction < Fixed64::ZERO || max_fuel_fraction > Fixed64::ONE {
            self.warn(CatalogWarning::FuelFractionOutOfRange {
                furnace: name.clone(),
                fraction: fixed64_to_f64(max_fuel_fraction),
            });
            max_fuel_fraction = max_fuel_fraction.clamp(Fixed64::ZERO, Fixed64::ONE);
        }

        let mut input_slots = params.input_slots;
        if input_slots == 0 {
            self.warn(CatalogWarning::NoInputSlots { furnace: name.clone() });
            input_slots = DEFAULT_INPUT_SLOTS;
        }

        let id = FurnaceTypeId(self.furnace_types.len() as u32);
        self.type_name_to_id.insert(name.clone(), id);
        self.furnace_types.push(FurnaceTypeDef {
            name,
            max_temperature,
            temperature_change,
            min_ideal,
            max_ideal,
            max_fuel_fraction,
            input_slots,
            recipes: Vec::new(),
        });
        Ok(id)
    }

    /// Register a recipe on a furnace type, appended after its existing
    /// recipes. Rejections are also recorded as warnings.
    pub fn register_recipe(&mut self, furnace: FurnaceTypeId, mut recipe: RecipeDef) -> Result<RecipeId, CatalogError> {
        let furnace_name = self
            .furnace_types
            .get(furnace.0 as usize)
            .map(|f| f.name.clone())
            .ok_or(CatalogError::UnknownFurnaceType(furnace))?;

        if let Err(err) = self.check_recipe(furnace, &recipe) {
            self.warn(CatalogWarning::RecipeRejected {
                furnace: furnace_name,
                recipe: recipe.name,
                reason: err.to_string(),
            });
            return Err(err);
        }

        let mut coerced = Vec::new();
        for input in &mut recipe.inputs {
            if input.amount == 0 {
                input.amount = 1;
                coerced.push(input.item.clone());
            }
        }
        for output in recipe.outputs.iter_mut().chain(recipe.spoiled_outputs.iter_mut()) {
            if output.amount == 0 {
                output.amount = 1;
                coerced.push(output.item.clone());
            }
        }
        for item in coerced {
            self.warn(CatalogWarning::AmountCoerced {
                recipe: recipe.name.clone(),
                item,
            });
        }

        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(recipe);
        self.furnace_types[furnace.0 as usize].recipes.push(id);
        Ok(id)
    }

    fn check_recipe(&self, furnace: FurnaceTypeId, recipe: &RecipeDef) -> Result<(), CatalogError> {
        if recipe.duration_ms == 0 {
            return Err(CatalogError::NonPositiveDuration);
        }
        if recipe.inputs.is_empty() {
            return Err(CatalogError::NoInputs);
        }
        if recipe.outputs.is_empty() {
            return Err(CatalogError::NoOutputs);
        }
        let duplicate = self.furnace_types[furnace.0 as usize]
            .recipes
            .iter()
            .any(|id| self.recipes[id.0 as usize].name == recipe.name);
        if duplicate {
            return Err(CatalogError::DuplicateRecipe);
        }
        if let Some(providers) = &self.providers {
            let items = recipe
                .inputs
                .iter()
                .map(|i| &i.item)
                .chain(recipe.outputs.iter().map(|o| &o.item))
                .chain(recipe.spoiled_outputs.iter().map(|o| &o.item));
            for item in items {
                if !providers.has_kind(&item.kind) {
                    return Err(CatalogError::UnknownItemProvider(item.kind.clone()));
                }
            }
        }
        Ok(())
    }

    /// Register a fuel. Returns false if the fuel was rejected.
    pub fn register_fuel(&mut self, mut fuel: FuelDef) -> bool {
        if let Some(providers) = &self.providers {
            if !providers.has_kind(&fuel.item.kind) {
                self.warn(CatalogWarning::FuelRejected { item: fuel.item });
                return false;
            }
        }
        if fuel.burn_ticks == 0 {
            self.warn(CatalogWarning::FuelBurnTimeCoerced { item: fuel.item.clone() });
            fuel.burn_ticks = 1;
        }
        self.fuels.push(fuel);
        true
    }

    pub fn furnace_type_id(&self, name: &str) -> Option<FurnaceTypeId> {
        self.type_name_to_id.get(name).copied()
    }

    pub fn warnings(&self) -> &[CatalogWarning] {
        &self.warnings
    }

    /// Freeze the catalog.
    pub fn build(self) -> RecipeCatalog {
        RecipeCatalog {
            furnace_types: self.furnace_types,
            type_name_to_id: self.type_name_to_id,
            recipes: self.recipes,
            fuels: self.fuels,
            warnings: self.warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable catalog. Frozen after build(). Thread-safe to share.
#[derive(Debug)]
pub struct RecipeCatalog {
    furnace_types: Vec<FurnaceTypeDef>,
    type_name_to_id: HashMap<String, FurnaceTypeId>,
    recipes: Vec<RecipeDef>,
    fuels: Vec<FuelDef>,
    warnings: Vec<CatalogWarning>,
}

impl RecipeCatalog {
    pub fn furnace_type(&self, id: FurnaceTypeId) -> Option<&FurnaceTypeDef> {
        self.furnace_types.get(id.0 as usize)
    }

    pub fn furnace_type_id(&self, name: &str) -> Option<FurnaceTypeId> {
        self.type_name_to_id.get(name).copied()
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&RecipeDef> {
        self.recipes.get(id.0 as usize)
    }

    pub fn fuels(&self) -> &[FuelDef] {
        &self.fuels
    }

    /// Warnings recorded while the catalog was built.
    pub fn warnings(&self) -> &[CatalogWarning] {
        &self.warnings
    }

    pub fn furnace_type_count(&self) -> usize {
        self.furnace_types.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    /// First recipe of `furnace`, in declared order, whose inputs are
    /// covered by the slot contents. Full scan; callers go through the
    /// match cache.
    pub fn find_recipe(
        &self,
        furnace: FurnaceTypeId,
        slots: &[Option<ItemStack>],
        providers: &ItemProviders,
    ) -> Option<RecipeId> {
        if slots.iter().flatten().all(ItemStack::is_empty) {
            return None;
        }
        self.furnace_type(furnace)?
            .recipes
            .iter()
            .copied()
            .find(|&id| {
                self.recipe(id)
                    .is_some_and(|r| covers(&r.inputs, slots, providers))
            })
    }

    /// The fuel definition matching a fuel slot stack, if it burns.
    pub fn fuel_for(&self, stack: &ItemStack, providers: &ItemProviders) -> Option<&FuelDef> {
        if stack.is_empty() {
            return None;
        }
        self.fuels
            .iter()
            .find(|f| providers.matches_ref(stack, &f.item))
    }
}

/// Multiset cover test: requirements are summed per item and compared with
/// the summed amounts across all matching slots, so several partial stacks
/// can satisfy one requirement.
pub fn covers(inputs: &[RecipeInput], slots: &[Option<ItemStack>], providers: &ItemProviders) -> bool {
    let mut required: BTreeMap<&ItemRef, u32> = BTreeMap::new();
    for input in inputs {
        let entry = required.entry(&input.item).or_insert(0);
        *entry = entry.saturating_add(input.amount);
    }
    required
        .into_iter()
        .all(|(item, need)| count_matching(slots, item, providers) >= need)
}
