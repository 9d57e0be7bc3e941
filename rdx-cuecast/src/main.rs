use anyhow::{Context, Result};
use cuecast::prelude::*;
use cuecast::schedule_file;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load configuration from CUECAST_CONFIG (if set) and the environment.
    let config_file = env::var_os("CUECAST_CONFIG").map(PathBuf::from);
    let config = CuecastConfig::load(config_file.as_deref()).context("loading configuration")?;

    // 3. The schedule comes from the first argument or the configuration.
    let schedule_path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.schedule.path.clone())
        .context("usage: cuecastd <schedule.csv> (or set schedule.path)")?;

    // 4. Create the engine and fill its store.
    let engine = SchedulerEngine::new(config, SystemClock);
    let today = engine.now().date();
    let fields = schedule_file::load(&schedule_path, today)
        .with_context(|| format!("loading {}", schedule_path.display()))?;
    engine.store().import_fields(fields).await;

    // 5. Attach observers before the first tick.
    spawn_event_logger(&engine).await;

    // 6. Run the engine.
    engine.run().await?;

    Ok(())
}

/// Logs every notification.
async fn spawn_event_logger(engine: &SchedulerEngine) {
    engine
        .bus()
        .on_notification(|notification| match notification {
            Notification::PhaseChanged { phase, at } => info!("[PHASE] {} => {}", at, phase),
            Notification::Countdown { event_id, remaining } => {
                debug!("[COUNTDOWN] {} in {}s", event_id, remaining.num_seconds())
            }
            Notification::PlaybackEnded { id, outcome } => info!("[PLAYBACK] {} {:?}", id, outcome),
            Notification::EventsChanged { change, events } => {
                info!("[EVENTS] {:?}, {} in list", change, events.len())
            }
            Notification::System(event) => info!("[SYSTEM] {:?}", event),
        })
        .await;
}
