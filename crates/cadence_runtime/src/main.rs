//! Cadence Engine Runtime
//!
//! Boots the frame scheduling core and drives a headless world loop:
//! periodic tasks, the four update phases and a streamed resource collection.

mod world;

use anyhow::{Context, Result};
use cadence_services::Settings;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Cadence frame scheduling runtime")]
struct Args {
    /// Settings file (JSON). Missing files fall back to defaults.
    #[arg(long, default_value = "cadence.json")]
    settings: PathBuf,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Log filter, overrides the settings file (e.g. `debug`, `cadence_asset=trace`).
    #[arg(long)]
    log_level: Option<String>,

    /// Collection descriptor to preload (binary, or JSON with a `.json` extension).
    #[arg(long)]
    collection: Option<PathBuf>,

    /// Write the effective settings to `--settings` and exit.
    #[arg(long)]
    write_default_settings: bool,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load_or_default(&args.settings)
        .with_context(|| format!("loading settings from {}", args.settings.display()))?;

    let level = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    init_logging(level);

    if args.write_default_settings {
        settings
            .save(&args.settings)
            .with_context(|| format!("writing settings to {}", args.settings.display()))?;
        tracing::info!(path = %args.settings.display(), "settings written");
        return Ok(());
    }

    tracing::info!("Cadence Engine v{}", cadence_core::VERSION);

    let world = world::World::new(&settings, args.collection.as_deref())?;
    let summary = world.run(args.frames);

    tracing::info!(
        frames = summary.frames,
        tasks_ran = summary.tasks_ran,
        tasks_failed = summary.tasks_failed,
        phase_runs = summary.phase_runs,
        preload_finished_at = ?summary.preload_finished_at,
        "simulation complete"
    );
    Ok(())
}
