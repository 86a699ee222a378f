//! ATK demo driver.
//!
//! Usage: `atk-demo [archive.json] [hardware.json]`
//!
//! Brings up the hardware manager on the software renderer, plays a short
//! scripted scene through the sound system and tears everything down with a
//! reset and finalize.

mod scene;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use atk_hardware::{HardwareManager, HardwareManagerParameter, SoftwareRenderer};
use atk_sound::SoundArchive;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("ATK demo starting...");

    let mut args = std::env::args().skip(1).map(PathBuf::from);
    let archive = match args.next() {
        Some(path) => SoundArchive::load_from_file(&path)
            .with_context(|| format!("loading sound archive {:?}", path))?,
        None => scene::demo_archive(),
    };
    let parameter = match args.next() {
        Some(path) => HardwareManagerParameter::load_from_file(&path)
            .with_context(|| format!("loading hardware parameter {:?}", path))?,
        None => HardwareManagerParameter::default(),
    };

    let renderer = SoftwareRenderer::with_latency(1);
    let monitor = renderer.monitor();
    let hardware = Arc::new(HardwareManager::initialize(parameter, Box::new(renderer))?);

    let mut scene = scene::Scene::new(hardware.clone(), archive)?;
    scene.play()?;
    scene.shutdown()?;

    let stats = monitor.stats();
    info!(
        rendered = stats.rendered_frames,
        suspended = stats.suspended_frames,
        dropped_voices = hardware.dropped_voice_count(),
        "ATK demo finished"
    );
    hardware.finalize();
    Ok(())
}
