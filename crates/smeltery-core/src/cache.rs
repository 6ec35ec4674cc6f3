//! Time-bounded memoization of recipe matching.
//!
//! Workers ask the cache "which recipe do these input slots match for this
//! furnace type". Misses and expired entries fall through to a full catalog
//! scan. Cleanup of expired entries is lazy and runs on a slower cadence
//! than lookups; a stale entry is never returned, it is recomputed.

use crate::catalog::RecipeCatalog;
use crate::id::{FurnaceTypeId, RecipeId};
use crate::item::{ItemProviders, ItemRef, ItemStack};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Canonical encoding of the non-empty input slots. Empty slots and slot
/// positions do not contribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey(Vec<(ItemRef, u32)>);

impl SlotKey {
    pub fn from_slots(slots: &[Option<ItemStack>]) -> Self {
        let mut entries: Vec<(ItemRef, u32)> = slots
            .iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(|s| (s.item.clone(), s.amount))
            .collect();
        entries.sort();
        Self(entries)
    }
}

/// Cache timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a computed match stays valid.
    pub ttl: Duration,
    /// Minimum time between expired-entry purges.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

/// Hit/miss counters. A miss is one catalog scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    recipe: Option<RecipeId>,
    expires_at: Instant,
}

type CacheKey = (FurnaceTypeId, SlotKey);

/// Recipe match cache shared by the stepper and all workers.
#[derive(Debug)]
pub struct RecipeMatchCache {
    catalog: Arc<RecipeCatalog>,
    providers: Arc<ItemProviders>,
    config: CacheConfig,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// When the next purge may run. `None` until the first lookup.
    next_cleanup: Mutex<Option<Instant>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RecipeMatchCache {
    pub fn new(catalog: Arc<RecipeCatalog>, providers: Arc<ItemProviders>, config: CacheConfig) -> Self {
        Self {
            catalog,
            providers,
            config,
            entries: RwLock::new(HashMap::new()),
            next_cleanup: Mutex::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &Arc<RecipeCatalog> {
        &self.catalog
    }

    pub fn providers(&self) -> &Arc<ItemProviders> {
        &self.providers
    }

    /// The recipe the slots match for `furnace`, memoized for the TTL.
    pub fn get(&self, furnace: FurnaceTypeId, slots: &[Option<ItemStack>], now: Instant) -> Option<RecipeId> {
        self.maybe_cleanup(now);

        let key = (furnace, SlotKey::from_slots(slots));
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                if now < entry.expires_at {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return entry.recipe;
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let recipe = self.catalog.find_recipe(furnace, slots, &self.providers);
        let expires_at = now.checked_add(self.config.ttl).unwrap_or(now);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, CacheEntry { recipe, expires_at });
        recipe
    }

    /// Drop every entry for one furnace type.
    pub fn invalidate(&self, furnace: FurnaceTypeId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(t, _), _| *t != furnace);
        tracing::debug!(?furnace, dropped = before - entries.len(), "recipe cache invalidated");
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Purge expired entries if the cleanup interval has elapsed. Skipped
    /// when another thread is already purging.
    fn maybe_cleanup(&self, now: Instant) {
        let Ok(mut next) = self.next_cleanup.try_lock() else {
            return;
        };
        match *next {
            None => {
                *next = now.checked_add(self.config.cleanup_interval);
            }
            Some(due) if now >= due => {
                let purged = self.purge_expired(now);
                if purged > 0 {
                    tracing::debug!(purged, "purged expired recipe matches");
                }
                *next = now.checked_add(self.config.cleanup_interval);
            }
            Some(_) => {}
        }
    }

    /// Remove every entry expired at `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBuilder, FurnaceTypeParams, RecipeDef, RecipeInput, RecipeOutput};
    use crate::fixed::Fixed64;

    fn ore() -> ItemRef {
        ItemRef::vanilla("IRON_ORE")
    }

    fn setup() -> (RecipeMatchCache, FurnaceTypeId, FurnaceTypeId, RecipeId) {
        let mut b = CatalogBuilder::new();
        let params = |name: &str| FurnaceTypeParams {
            name: name.to_string(),
            max_temperature: 100,
            temperature_change: 10,
            min_ideal: 80,
            max_ideal: 100,
            max_fuel_fraction: Fixed64::ONE,
            input_slots: 4,
        };
        let basic = b.register_furnace_type(params("basic")).unwrap();
        let blast = b.register_furnace_type(params("blast")).unwrap();
        let recipe = RecipeDef {
            name: "smelt_iron".to_string(),
            duration_ms: 8000,
            inputs: vec![RecipeInput {
                label: "ore".to_string(),
                item: ore(),
                amount: 2,
            }],
            outputs: vec![RecipeOutput {
                item: ItemRef::vanilla("IRON_INGOT"),
                amount: 1,
            }],
            spoiled_outputs: vec![],
        };
        let smelt = b.register_recipe(basic, recipe.clone()).unwrap();
        b.register_recipe(blast, recipe).unwrap();
        let cache = RecipeMatchCache::new(
            Arc::new(b.build()),
            Arc::new(ItemProviders::with_vanilla()),
            CacheConfig::default(),
        );
        (cache, basic, blast, smelt)
    }

    fn slots(amount: u32) -> Vec<Option<ItemStack>> {
        vec![Some(ItemStack::new(ore(), amount)), None, None, None]
    }

    #[test]
    fn slot_key_ignores_empty_positions() {
        let a = vec![None, Some(ItemStack::new(ore(), 2)), None];
        let b = vec![Some(ItemStack::new(ore(), 2)), None, None, None];
        assert_eq!(SlotKey::from_slots(&a), SlotKey::from_slots(&b));
    }

    #[test]
    fn slot_key_distinguishes_amounts() {
        assert_ne!(SlotKey::from_slots(&slots(2)), SlotKey::from_slots(&slots(3)));
    }

    #[test]
    fn second_lookup_within_ttl_is_a_hit() {
        let (cache, basic, _, smelt) = setup();
        let now = Instant::now();
        assert_eq!(cache.get(basic, &slots(2), now), Some(smelt));
        assert_eq!(cache.get(basic, &slots(2), now + Duration::from_secs(1)), Some(smelt));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn negative_results_are_cached() {
        let (cache, basic, _, _) = setup();
        let now = Instant::now();
        assert_eq!(cache.get(basic, &slots(1), now), None);
        assert_eq!(cache.get(basic, &slots(1), now), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn expired_entry_is_recomputed() {
        let (cache, basic, _, smelt) = setup();
        let now = Instant::now();
        cache.get(basic, &slots(2), now);
        assert_eq!(cache.get(basic, &slots(2), now + Duration::from_secs(5)), Some(smelt));
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn invalidate_drops_only_one_type() {
        let (cache, basic, blast, _) = setup();
        let now = Instant::now();
        cache.get(basic, &slots(2), now);
        cache.get(blast, &slots(2), now);
        assert_eq!(cache.len(), 2);

        cache.invalidate(basic);
        assert_eq!(cache.len(), 1);
        cache.get(blast, &slots(2), now);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn lazy_cleanup_runs_after_interval() {
        let (cache, basic, _, _) = setup();
        let start = Instant::now();
        cache.get(basic, &slots(2), start);
        cache.get(basic, &slots(3), start);
        assert_eq!(cache.len(), 2);

        // Entries expired but the purge is not due yet.
        cache.get(basic, &slots(2), start + Duration::from_secs(10));
        assert_eq!(cache.len(), 2);

        // Purge due: the slots(3) entry goes, slots(2) was just refreshed
        // at +10s and expired at +15s too.
        cache.get(basic, &slots(4), start + Duration::from_secs(31));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_empties_cache() {
        let (cache, basic, _, _) = setup();
        cache.get(basic, &slots(2), Instant::now());
        cache.clear();
        assert!(cache.is_empty());
    }
}
