//! Serde structs for furnace content files.
//!
//! Numbers are read as signed integers so that negative or zero values in
//! hand-written files reach the catalog builder, which repairs or rejects
//! them with a warning instead of failing the whole file.

use serde::{Deserialize, Serialize};
use smeltery_core::item::VANILLA;

// ===========================================================================
// Top level
// ===========================================================================

/// Everything in one content file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogData {
    #[serde(default)]
    pub furnaces: Vec<FurnaceTypeData>,
    #[serde(default)]
    pub fuels: Vec<FuelData>,
}

// ===========================================================================
// Furnace types
// ===========================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FurnaceTypeData {
    pub name: String,
    pub max_temperature: i64,
    pub temperature_change: i64,
    pub min_ideal_temperature: i64,
    pub max_ideal_temperature: i64,
    /// Share of `max_temperature` reachable from fuel alone, 0 to 100.
    #[serde(default = "default_fuel_percentage")]
    pub max_temperature_gain_from_fuel_percentage: f64,
    #[serde(default)]
    pub input_slots: Option<i64>,
    #[serde(default)]
    pub recipes: Vec<RecipeData>,
}

fn default_fuel_percentage() -> f64 {
    100.0
}

// ===========================================================================
// Recipes
// ===========================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecipeData {
    pub name: String,
    /// Milliseconds of in-band smelting.
    pub smelt_time: i64,
    #[serde(default)]
    pub inputs: Vec<RecipeInputData>,
    #[serde(default)]
    pub outputs: Vec<ItemData>,
    #[serde(default)]
    pub bad_outputs: Vec<ItemData>,
}

/// A recipe input. `slot` labels the requirement; matching ignores slot
/// positions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecipeInputData {
    #[serde(default)]
    pub slot: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub id: String,
    #[serde(default = "default_amount")]
    pub amount: i64,
}

/// An item reference with an amount, used for outputs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemData {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub id: String,
    #[serde(default = "default_amount")]
    pub amount: i64,
}

fn default_kind() -> String {
    VANILLA.to_string()
}

fn default_amount() -> i64 {
    1
}

// ===========================================================================
// Fuels
// ===========================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FuelData {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub id: String,
    /// Ticks one unit burns.
    pub burn_time: i64,
    pub temperature: i64,
}
