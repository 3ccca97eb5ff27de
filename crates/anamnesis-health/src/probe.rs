//! Per-layer probes. Each is a plain function timed with
//! `std::time::Instant`, checking a live cheap operation rather than
//! sampling a rolling window of traffic — L1-L5 are not pooled network
//! providers.

use std::path::Path;
use std::time::Instant;

use anamnesis_capture::CaptureStore;
use anamnesis_crystals::CrystalStore;
use anamnesis_inventory::InventoryStore;
use anamnesis_texture::TextureStore;

use crate::types::LayerHealth;

pub fn probe_capture(store: &CaptureStore) -> LayerHealth {
    let started = Instant::now();
    match store.health_check() {
        Ok(()) => LayerHealth::ok("SELECT 1", started.elapsed().as_secs_f64() * 1000.0),
        Err(e) => LayerHealth::down(e.to_string(), started.elapsed().as_secs_f64() * 1000.0),
    }
}

pub fn probe_anchors_dir(directory: &Path) -> LayerHealth {
    let started = Instant::now();
    match std::fs::metadata(directory) {
        Ok(meta) if meta.is_dir() => {
            LayerHealth::ok("directory present", started.elapsed().as_secs_f64() * 1000.0)
        }
        Ok(_) => LayerHealth::down(
            format!("{} exists but is not a directory", directory.display()),
            started.elapsed().as_secs_f64() * 1000.0,
        ),
        Err(e) => LayerHealth::down(
            format!("{}: {e}", directory.display()),
            started.elapsed().as_secs_f64() * 1000.0,
        ),
    }
}

pub async fn probe_texture(store: &TextureStore) -> LayerHealth {
    let started = Instant::now();
    match store.health_check().await {
        Ok(()) => LayerHealth::ok("INFO FOR DB", started.elapsed().as_secs_f64() * 1000.0),
        Err(e) => LayerHealth::down(e.to_string(), started.elapsed().as_secs_f64() * 1000.0),
    }
}

pub fn probe_crystals(store: &CrystalStore) -> LayerHealth {
    let started = Instant::now();
    match store.health_check() {
        Ok(()) => LayerHealth::ok("SELECT 1", started.elapsed().as_secs_f64() * 1000.0),
        Err(e) => LayerHealth::down(e.to_string(), started.elapsed().as_secs_f64() * 1000.0),
    }
}

pub fn probe_inventory(store: &InventoryStore) -> LayerHealth {
    let started = Instant::now();
    match store.health_check() {
        Ok(()) => LayerHealth::ok("SELECT 1", started.elapsed().as_secs_f64() * 1000.0),
        Err(e) => LayerHealth::down(e.to_string(), started.elapsed().as_secs_f64() * 1000.0),
    }
}
