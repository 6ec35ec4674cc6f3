//! Smeltery Core -- a tick-driven furnace simulation engine.
//!
//! Furnaces heat up by burning fuel, cool down when it runs out, and turn
//! input items into output items when a recipe is held inside the furnace
//! type's ideal temperature band long enough. Staying outside the band too
//! long spoils the attempt.
//!
//! # Tick Pipeline
//!
//! The host calls [`devices::DeviceRegistry::tick_all`] once per tick
//! interval. With offload enabled:
//!
//! 1. **Drain** -- Apply up to `max_results_per_drain` deltas computed since
//!    the last tick, on the calling thread.
//! 2. **Snapshot** -- Deep-copy every furnace with no computation in flight.
//! 3. **Submit** -- Hand snapshots to the worker pool, which runs the
//!    [`stepper::SimulationStepper`] and queues a [`stepper::ComputedDelta`].
//!
//! Without offload the registry steps and applies each furnace inline.
//! Either way, live state is only written on the tick thread.
//!
//! # Key Types
//!
//! - [`catalog::RecipeCatalog`] -- Immutable furnace types, recipes and
//!   fuels, built through [`catalog::CatalogBuilder`].
//! - [`cache::RecipeMatchCache`] -- TTL memoization of recipe matching.
//! - [`furnace::FurnaceState`] -- One furnace's temperature, burn, smelt
//!   progress and slots.
//! - [`stepper::Simulator`] -- The worker-side step seam.
//! - [`pipeline::AsyncOffloadPipeline`] -- Worker pool plus result queue.
//! - [`devices::DeviceRegistry`] -- Location-keyed owner of all furnaces.
//! - [`item::ItemProviders`] -- Item systems resolved once at startup.
//! - [`persist`] -- Versioned binary save records via bitcode.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod devices;
pub mod fixed;
pub mod furnace;
pub mod id;
pub mod item;
pub mod persist;
pub mod pipeline;
pub mod stepper;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
