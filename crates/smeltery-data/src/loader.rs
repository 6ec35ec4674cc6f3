//! Reads content files and resolves them into a frozen catalog.
//!
//! Provides format detection (RON/JSON/TOML), (de)serialization helpers,
//! and the conversion from [`CatalogData`] into engine definitions.

use crate::schema::{CatalogData, FurnaceTypeData, ItemData, RecipeData};
use serde::Serialize;
use serde::de::DeserializeOwned;
use smeltery_core::catalog::{
    CatalogBuilder, CatalogError, CatalogWarning, DEFAULT_INPUT_SLOTS, FuelDef, FurnaceTypeParams, RecipeCatalog, RecipeDef,
    RecipeInput, RecipeOutput,
};
use smeltery_core::config::SimConfig;
use smeltery_core::fixed::percent_to_fraction;
use smeltery_core::item::{ItemProviders, ItemRef};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while reading or writing data files.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A serialization error occurred.
    #[error("could not encode {file}: {detail}")]
    Encode { file: PathBuf, detail: String },

    /// The content could not be turned into a catalog.
    #[error("invalid content in {file}: {source}")]
    Catalog {
        file: PathBuf,
        #[source]
        source: CatalogError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// (De)serialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Serialize a value in the format matching the file extension and write it.
pub fn serialize_file<T: Serialize>(path: &Path, value: &T) -> Result<(), DataLoadError> {
    let format = detect_format(path)?;
    let encode_error = |detail: String| DataLoadError::Encode {
        file: path.to_path_buf(),
        detail,
    };

    let content = match format {
        Format::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            .map_err(|e| encode_error(e.to_string()))?,
        Format::Json => serde_json::to_string_pretty(value).map_err(|e| encode_error(e.to_string()))?,
        Format::Toml => toml::to_string_pretty(value).map_err(|e| encode_error(e.to_string()))?,
    };
    std::fs::write(path, content)?;
    Ok(())
}

// ===========================================================================
// Catalog resolution
// ===========================================================================

fn to_u32(v: i64) -> u32 {
    v.clamp(0, i64::from(u32::MAX)) as u32
}

fn to_u64(v: i64) -> u64 {
    v.max(0) as u64
}

fn furnace_params(data: &FurnaceTypeData, builder: &mut CatalogBuilder) -> FurnaceTypeParams {
    let mut percent = data.max_temperature_gain_from_fuel_percentage;
    if !percent.is_finite() {
        builder.warn(CatalogWarning::FuelPercentageNotFinite {
            furnace: data.name.clone(),
            value: percent,
        });
        percent = 100.0;
    }
    FurnaceTypeParams {
        name: data.name.clone(),
        max_temperature: to_u32(data.max_temperature),
        temperature_change: to_u32(data.temperature_change),
        min_ideal: to_u32(data.min_ideal_temperature),
        max_ideal: to_u32(data.max_ideal_temperature),
        max_fuel_fraction: percent_to_fraction(percent),
        input_slots: data
            .input_slots
            .map_or(DEFAULT_INPUT_SLOTS, |n| to_u32(n) as usize),
    }
}

fn outputs(items: &[ItemData]) -> Vec<RecipeOutput> {
    items
        .iter()
        .map(|o| RecipeOutput {
            item: ItemRef::new(o.kind.clone(), o.id.clone()),
            amount: to_u32(o.amount),
        })
        .collect()
}

fn recipe_def(data: &RecipeData) -> RecipeDef {
    RecipeDef {
        name: data.name.clone(),
        duration_ms: to_u64(data.smelt_time),
        inputs: data
            .inputs
            .iter()
            .map(|i| RecipeInput {
                label: i.slot.clone(),
                item: ItemRef::new(i.kind.clone(), i.id.clone()),
                amount: to_u32(i.amount),
            })
            .collect(),
        outputs: outputs(&data.outputs),
        spoiled_outputs: outputs(&data.bad_outputs),
    }
}

/// Resolve parsed content into a catalog.
///
/// Out-of-range furnace parameters are repaired and invalid recipes or fuels
/// are skipped; both are recorded in the catalog's warnings. Only a
/// duplicate furnace type name fails the build.
pub fn build_catalog(data: &CatalogData, providers: Arc<ItemProviders>) -> Result<RecipeCatalog, CatalogError> {
    let mut builder = CatalogBuilder::with_providers(providers);

    for furnace in &data.furnaces {
        let params = furnace_params(furnace, &mut builder);
        let id = builder.register_furnace_type(params)?;
        for recipe in &furnace.recipes {
            // Rejections are recorded as warnings by the builder.
            let _ = builder.register_recipe(id, recipe_def(recipe));
        }
    }

    for fuel in &data.fuels {
        builder.register_fuel(FuelDef {
            item: ItemRef::new(fuel.kind.clone(), fuel.id.clone()),
            burn_ticks: to_u32(fuel.burn_time),
            temperature: to_u32(fuel.temperature),
        });
    }

    Ok(builder.build())
}

/// Read a content file and build the catalog from it.
pub fn load_catalog(path: &Path, providers: Arc<ItemProviders>) -> Result<RecipeCatalog, DataLoadError> {
    let data: CatalogData = deserialize_file(path)?;
    let catalog = build_catalog(&data, providers).map_err(|source| DataLoadError::Catalog {
        file: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        file = %path.display(),
        furnace_types = catalog.furnace_type_count(),
        recipes = catalog.recipe_count(),
        fuels = catalog.fuels().len(),
        warnings = catalog.warnings().len(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Read simulation settings. Missing fields take their defaults.
pub fn load_sim_config(path: &Path) -> Result<SimConfig, DataLoadError> {
    deserialize_file(path)
}

// ===========================================================================
// Tests
// ===========================================================================
