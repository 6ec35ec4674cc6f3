//! Simulation tunables.
//!
//! Every field has a default, so a partial configuration file (or none at
//! all) yields a working setup.

use crate::cache::CacheConfig;
use crate::pipeline::PipelineConfig;
use crate::stepper::DEFAULT_SPOIL_THRESHOLD_MS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Step furnaces on the worker pool. When false, `tick_all` steps and
    /// applies inline on the calling thread.
    pub async_offload: bool,
    pub worker_threads: usize,
    /// Upper bound on results applied per tick.
    pub max_results_per_drain: usize,
    /// Simulated time one tick covers.
    pub tick_interval_ms: u64,
    pub spoil_threshold_ms: u64,
    pub cache_ttl_ms: u64,
    pub cache_cleanup_interval_ms: u64,
    /// How long shutdown waits for outstanding work.
    pub shutdown_timeout_ms: u64,
    /// Item capacity of each furnace's output slot.
    pub output_capacity: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            async_offload: true,
            worker_threads: 2,
            max_results_per_drain: 256,
            tick_interval_ms: 1000,
            spoil_threshold_ms: DEFAULT_SPOIL_THRESHOLD_MS,
            cache_ttl_ms: 5000,
            cache_cleanup_interval_ms: 30_000,
            shutdown_timeout_ms: 2000,
            output_capacity: 64,
        }
    }
}

impl SimConfig {
    /// Defaults with offload disabled.
    pub fn synchronous() -> Self {
        Self {
            async_offload: false,
            ..Self::default()
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_millis(self.cache_ttl_ms),
            cleanup_interval: Duration::from_millis(self.cache_cleanup_interval_ms),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            worker_threads: self.worker_threads.max(1),
            shutdown_timeout: self.shutdown_timeout(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
