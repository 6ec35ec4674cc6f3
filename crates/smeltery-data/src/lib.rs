//! Smeltery Data -- on-disk content and save files.
//!
//! Furnace types, recipes and fuels are read from RON, TOML or JSON (picked
//! by file extension) and resolved into a frozen
//! [`smeltery_core::catalog::RecipeCatalog`]. Saved furnaces round-trip
//! through the same formats.

pub mod loader;
pub mod save;
pub mod schema;

pub use loader::{DataLoadError, build_catalog, load_catalog, load_sim_config};
pub use save::{SaveFile, read_save, write_save};
