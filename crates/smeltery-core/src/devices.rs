//! The device registry: owner of every live furnace.
//!
//! Furnaces are keyed by block location and addressed internally by a
//! generational [`FurnaceId`]. The registry is the only writer of furnace
//! state. [`DeviceRegistry::tick_all`] is the host's single entry point per
//! tick: in offload mode it drains ready results and submits fresh
//! snapshots; otherwise it steps and applies every furnace inline.

use crate::cache::RecipeMatchCache;
use crate::catalog::RecipeCatalog;
use crate::config::SimConfig;
use crate::furnace::{ApplyReport, FurnaceState};
use crate::id::{BlockLocation, FurnaceId, FurnaceTypeId};
use crate::item::{ItemProviders, ItemStack};
use crate::persist::{self, DeserializeError, FurnaceRecord, SerializeError};
use crate::pipeline::{AsyncOffloadPipeline, PipelineError, Submission, run_guarded};
use crate::stepper::{SimulationStepper, Simulator, SmeltOutcome};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one [`DeviceRegistry::tick_all`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Snapshots handed to workers.
    pub submitted: usize,
    /// Furnaces skipped because their previous computation is in flight.
    pub skipped: usize,
    /// Deltas applied to live furnaces.
    pub applied: usize,
    /// Computations that failed or panicked.
    pub failed: usize,
    pub completed: usize,
    pub spoiled: usize,
    pub reset: usize,
    /// Products that did not fit an output slot, per furnace.
    pub overflow: Vec<(FurnaceId, ItemStack)>,
}

impl TickReport {
    fn record(&mut self, id: FurnaceId, applied: ApplyReport) {
        self.applied += 1;
        match applied.outcome {
            SmeltOutcome::Completed => self.completed += 1,
            SmeltOutcome::Spoiled => self.spoiled += 1,
            SmeltOutcome::Reset => self.reset += 1,
            SmeltOutcome::InProgress => {}
        }
        self.overflow
            .extend(applied.overflow.into_iter().map(|stack| (id, stack)));
    }
}

/// Location-keyed owner of live furnaces.
pub struct DeviceRegistry {
    catalog: Arc<RecipeCatalog>,
    providers: Arc<ItemProviders>,
    cache: Arc<RecipeMatchCache>,
    simulator: Arc<dyn Simulator>,
    /// `None` in synchronous mode.
    pipeline: Option<AsyncOffloadPipeline>,
    config: SimConfig,
    furnaces: SlotMap<FurnaceId, FurnaceState>,
    by_location: HashMap<BlockLocation, FurnaceId>,
    shut_down: bool,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("furnaces", &self.furnaces.len())
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    /// A registry driven by the standard [`SimulationStepper`].
    pub fn new(
        catalog: Arc<RecipeCatalog>,
        providers: Arc<ItemProviders>,
        config: SimConfig,
    ) -> Result<Self, PipelineError> {
        let cache = Arc::new(RecipeMatchCache::new(catalog, providers, config.cache_config()));
        let stepper = SimulationStepper::new(Arc::clone(&cache), config.spoil_threshold_ms);
        Self::with_simulator(cache, Arc::new(stepper), config)
    }

    /// A registry driven by a custom simulator. Catalog and providers are
    /// taken from the cache.
    pub fn with_simulator(
        cache: Arc<RecipeMatchCache>,
        simulator: Arc<dyn Simulator>,
        config: SimConfig,
    ) -> Result<Self, PipelineError> {
        let pipeline = if config.async_offload {
            Some(AsyncOffloadPipeline::new(Arc::clone(&simulator), config.pipeline_config())?)
        } else {
            None
        };
        Ok(Self {
            catalog: Arc::clone(cache.catalog()),
            providers: Arc::clone(cache.providers()),
            cache,
            simulator,
            pipeline,
            config,
            furnaces: SlotMap::with_key(),
            by_location: HashMap::new(),
            shut_down: false,
        })
    }

    pub fn catalog(&self) -> &Arc<RecipeCatalog> {
        &self.catalog
    }

    pub fn providers(&self) -> &Arc<ItemProviders> {
        &self.providers
    }

    pub fn cache(&self) -> &Arc<RecipeMatchCache> {
        &self.cache
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lookup and lifecycle
    // -----------------------------------------------------------------------

    /// Register a furnace of `type_name` at `location`. Returns the existing
    /// furnace if one is already there. Unknown types yield `None`.
    pub fn create(&mut self, type_name: &str, location: BlockLocation) -> Option<&FurnaceState> {
        let Some(furnace_type) = self.catalog.furnace_type_id(type_name) else {
            tracing::warn!(furnace_type = type_name, %location, "unknown furnace type, furnace not created");
            return None;
        };
        self.create_with_type(furnace_type, location)
    }

    /// [`Self::create`] by catalog id.
    pub fn create_with_type(&mut self, furnace_type: FurnaceTypeId, location: BlockLocation) -> Option<&FurnaceState> {
        if let Some(&id) = self.by_location.get(&location) {
            return self.furnaces.get(id);
        }
        let Some(def) = self.catalog.furnace_type(furnace_type) else {
            tracing::warn!(?furnace_type, %location, "unknown furnace type, furnace not created");
            return None;
        };
        let input_slots = def.input_slots;
        let output_capacity = self.config.output_capacity;
        let id = self.furnaces.insert_with_key(|id| {
            FurnaceState::new(id, furnace_type, location.clone(), input_slots, output_capacity)
        });
        tracing::debug!(furnace = ?id, ?furnace_type, %location, "furnace created");
        self.by_location.insert(location, id);
        self.furnaces.get(id)
    }

    pub fn get(&self, location: &BlockLocation) -> Option<&FurnaceState> {
        self.by_location.get(location).and_then(|&id| self.furnaces.get(id))
    }

    /// Mutable access for host slot edits between ticks.
    pub fn get_mut(&mut self, location: &BlockLocation) -> Option<&mut FurnaceState> {
        let id = *self.by_location.get(location)?;
        self.furnaces.get_mut(id)
    }

    pub fn get_by_id(&self, id: FurnaceId) -> Option<&FurnaceState> {
        self.furnaces.get(id)
    }

    /// Remove the furnace at `location`. A computation still in flight for
    /// it is discarded when drained.
    pub fn remove(&mut self, location: &BlockLocation) -> Option<FurnaceState> {
        let id = self.by_location.remove(location)?;
        let removed = self.furnaces.remove(id);
        if removed.is_some() {
            tracing::debug!(furnace = ?id, %location, "furnace removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.furnaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.furnaces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FurnaceState> {
        self.furnaces.values()
    }

    /// Furnaces with a computation submitted but not yet drained.
    pub fn in_flight(&self) -> usize {
        self.pipeline.as_ref().map_or(0, AsyncOffloadPipeline::in_flight)
    }

    pub fn is_in_flight(&self, id: FurnaceId) -> bool {
        self.pipeline.as_ref().is_some_and(|p| p.is_in_flight(id))
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Advance every furnace by one tick interval.
    ///
    /// In offload mode, results computed since the last call are applied
    /// first (at most `max_results_per_drain`), then every furnace without a
    /// computation in flight is snapshotted and submitted. A furnace's state
    /// therefore trails its submitted snapshot by at least one tick.
    pub fn tick_all(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        if self.shut_down {
            return report;
        }
        let elapsed_ms = self.config.tick_interval_ms;
        let max_results = self.config.max_results_per_drain;
        let catalog: &RecipeCatalog = &self.catalog;
        let providers: &ItemProviders = &self.providers;
        let simulator = &self.simulator;
        let furnaces = &mut self.furnaces;

        let Some(pipeline) = self.pipeline.as_mut() else {
            for (id, furnace) in furnaces.iter_mut() {
                let snapshot = furnace.snapshot(elapsed_ms, now);
                match run_guarded(simulator.as_ref(), &snapshot) {
                    Ok(delta) => report.record(id, furnace.apply(delta, catalog, providers)),
                    Err(failure) => {
                        tracing::warn!(furnace = ?id, %failure, "furnace step failed");
                        report.failed += 1;
                    }
                }
            }
            return report;
        };

        let drained = pipeline.drain(max_results, |id, delta| {
            match furnaces.get_mut(id) {
                Some(furnace) => report.record(id, furnace.apply(delta, catalog, providers)),
                None => tracing::debug!(furnace = ?id, "dropping result for removed furnace"),
            }
        });
        report.failed = drained.failed;

        for (id, furnace) in furnaces.iter() {
            if pipeline.is_in_flight(id) {
                report.skipped += 1;
                continue;
            }
            match pipeline.submit(furnace.snapshot(elapsed_ms, now)) {
                Submission::Accepted => report.submitted += 1,
                Submission::AlreadyInFlight => report.skipped += 1,
                Submission::ShuttingDown => break,
            }
        }
        report
    }

    /// Wait until every submitted computation has posted its result, up to
    /// `timeout`. Always true in synchronous mode.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pipeline.as_ref().is_none_or(|p| p.wait_idle(timeout))
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Flat records for every furnace: type, location and temperature.
    pub fn save_all(&self) -> Vec<FurnaceRecord> {
        self.furnaces.values().filter_map(|f| self.record_for(f)).collect()
    }

    fn record_for(&self, furnace: &FurnaceState) -> Option<FurnaceRecord> {
        let def = self.catalog.furnace_type(furnace.furnace_type())?;
        Some(FurnaceRecord::new(def.name.clone(), furnace.location(), furnace.temperature()))
    }

    /// Rebuild furnaces from records. Only temperature is restored, clamped
    /// to the type's maximum. Records naming unknown types, or locations
    /// that already hold a furnace, are skipped.
    /// Returns how many furnaces were restored.
    pub fn load_all(&mut self, records: &[FurnaceRecord]) -> usize {
        let catalog = Arc::clone(&self.catalog);
        let mut loaded = 0;
        for record in records {
            let location = record.location();
            if self.by_location.contains_key(&location) {
                tracing::warn!(%location, "furnace already present, duplicate record skipped");
                continue;
            }
            if self.create(&record.furnace_type, location.clone()).is_none() {
                continue;
            }
            let Some(furnace) = self.get_mut(&location) else {
                continue;
            };
            let max = catalog
                .furnace_type(furnace.furnace_type())
                .map_or(0, |def| def.max_temperature);
            furnace.restore_temperature(record.temperature, max);
            loaded += 1;
        }
        tracing::info!(loaded, skipped = records.len() - loaded, "furnaces loaded");
        loaded
    }

    /// Save then remove every furnace in `world`.
    pub fn unload_world(&mut self, world: &str) -> Vec<FurnaceRecord> {
        let mut locations: Vec<BlockLocation> = self
            .by_location
            .keys()
            .filter(|loc| loc.world == world)
            .cloned()
            .collect();
        locations.sort();

        let mut records = Vec::with_capacity(locations.len());
        for location in locations {
            if let Some(furnace) = self.remove(&location) {
                records.extend(self.record_for(&furnace));
            }
        }
        tracing::info!(world, unloaded = records.len(), "world unloaded");
        records
    }

    /// Binary dump of [`Self::save_all`].
    pub fn dump(&self) -> Result<Vec<u8>, SerializeError> {
        persist::encode_records(&self.save_all())
    }

    /// Load furnaces from a binary dump. Returns how many were restored.
    pub fn restore(&mut self, data: &[u8]) -> Result<usize, DeserializeError> {
        let records = persist::decode_records(data)?;
        Ok(self.load_all(&records))
    }

    /// Stop the worker pool and refuse further ticks. Returns false if
    /// workers were still busy when the shutdown timeout expired.
    pub fn shutdown(&mut self) -> bool {
        self.shut_down = true;
        let timeout = self.config.shutdown_timeout();
        self.pipeline.as_mut().is_none_or(|p| p.shutdown(timeout))
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}
