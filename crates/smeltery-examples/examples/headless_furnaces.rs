//! Headless furnace runner: config, catalog, registry, ticks and a save.
//!
//! Loads `data/sim.toml` and `data/furnaces.toml`, places an iron furnace
//! and a gold furnace, feeds them, runs half a minute of simulated ticks,
//! then saves and reloads the furnaces through a TOML save file.
//!
//! Run with: `cargo run -p smeltery-examples --example headless_furnaces -- --debug`

use smeltery_core::devices::DeviceRegistry;
use smeltery_core::id::BlockLocation;
use smeltery_core::item::{ItemProviders, ItemRef, ItemStack};
use smeltery_data::{load_catalog, load_sim_config, read_save, write_save};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const TICKS: usize = 30;

fn vanilla(id: &str, amount: u32) -> ItemStack {
    ItemStack::new(ItemRef::vanilla(id), amount)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = if std::env::args().any(|arg| arg == "--debug") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    // Logs go to stderr so the printed report stays readable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
    let config = load_sim_config(&data.join("sim.toml"))?;
    let providers = Arc::new(ItemProviders::with_vanilla());
    let catalog = Arc::new(load_catalog(&data.join("furnaces.toml"), Arc::clone(&providers))?);
    for warning in catalog.warnings() {
        println!("catalog warning: {warning}");
    }

    let mut registry = DeviceRegistry::new(catalog, providers, config)?;

    // --- Place and feed two furnaces ---

    let iron_at = BlockLocation::from_position("world", 10.4, 64.0, -3.7);
    let gold_at = BlockLocation::new("world", 12, 64, -4);
    for location in [&iron_at, &gold_at] {
        registry.create("basic", location.clone());
        if let Some(furnace) = registry.get_mut(location) {
            furnace.set_fuel(Some(vanilla("COAL", 4)));
        }
    }
    if let Some(furnace) = registry.get_mut(&iron_at) {
        furnace.inputs_mut()[0] = Some(vanilla("IRON_ORE", 2));
    }

    // --- Tick ---

    for tick in 1..=TICKS {
        let report = registry.tick_all(Instant::now());
        // Feed the gold furnace once it is hot, so the smelt starts in band.
        if tick == 10 {
            if let Some(furnace) = registry.get_mut(&gold_at) {
                furnace.inputs_mut()[0] = Some(vanilla("IRON_ORE", 1));
                furnace.inputs_mut()[1] = Some(vanilla("GOLD_ORE", 1));
            }
        }
        if report.completed + report.spoiled > 0 {
            println!(
                "tick {tick}: {} completed, {} spoiled",
                report.completed, report.spoiled
            );
        }
        // A real host sleeps for the tick interval; give the workers the
        // same chance to finish.
        registry.wait_idle(Duration::from_millis(registry.config().tick_interval_ms));
    }

    for furnace in registry.iter() {
        println!(
            "{}: {} degrees, burning: {}, output: {:?}",
            furnace.location(),
            furnace.temperature(),
            furnace.is_burning(),
            furnace.output().stacks
        );
    }
    let stats = registry.cache().stats();
    println!("recipe cache: {} hits, {} misses", stats.hits, stats.misses);

    // --- Save and reload ---

    let save_path = std::env::temp_dir().join("smeltery_headless_furnaces.toml");
    let records = registry.unload_world("world");
    write_save(&save_path, &records)?;
    registry.shutdown();

    let restored = read_save(&save_path)?;
    let mut fresh = DeviceRegistry::new(
        Arc::clone(registry.catalog()),
        Arc::clone(registry.providers()),
        registry.config().clone(),
    )?;
    let loaded = fresh.load_all(&restored);
    println!("reloaded {loaded} furnaces from {}", save_path.display());
    for furnace in fresh.iter() {
        println!("{}: {} degrees", furnace.location(), furnace.temperature());
    }
    fresh.shutdown();
    Ok(())
}
