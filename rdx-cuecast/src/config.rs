//! Defines all configuration structures for the Cuecast engine.
//!
//! These structs are deserialized with `serde` and loaded through the `config`
//! crate, so the tick speed, bus sizing and schedule file location can be set
//! from a TOML file and overridden with `CUECAST__*` environment variables
//! (e.g. `CUECAST__SCHEDULE__PATH=./data/schedule.csv`).

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fastest supported tick rate.
pub const MAX_TICKS_PER_SECOND: u64 = 1000;

/// The top-level configuration for the `SchedulerEngine`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CuecastConfig {
    /// How often the engine re-evaluates the schedule.
    #[serde(default)]
    pub resolution: TickResolution,

    /// Sizing of the notification bus.
    #[serde(default)]
    pub bus: BusConfig,

    /// Where the schedule lives on disk.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Defines the polling speed of the scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickResolution {
    /// 10 ticks per second. Keeps countdowns visually smooth.
    High,
    /// 4 ticks per second.
    #[default]
    Medium,
    /// 1 tick per second.
    Low,
    /// A user-defined speed in ticks per second.
    Custom { ticks_per_second: u64 },
}

/// Capacities for the notification bus.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Buffer of the broadcast stream. Slower subscribers lag behind.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Queue length of each callback observer. Overflow is dropped.
    #[serde(default = "default_observer_capacity")]
    pub observer_capacity: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// CSV file to load at startup.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Write the schedule back to `path` after every edit.
    #[serde(default)]
    pub autosave: bool,
}

impl TickResolution {
    /// Time between two ticks. Custom speeds are clamped to
    /// `1..=MAX_TICKS_PER_SECOND`, so the period is never zero.
    pub fn interval(&self) -> Duration {
        let ticks_per_second = match self {
            TickResolution::High => 10,
            TickResolution::Medium => 4,
            TickResolution::Low => 1,
            TickResolution::Custom { ticks_per_second } => {
                (*ticks_per_second).clamp(1, MAX_TICKS_PER_SECOND)
            }
        };
        Duration::from_secs(1) / ticks_per_second as u32
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
            observer_capacity: default_observer_capacity(),
        }
    }
}

impl CuecastConfig {
    /// Loads the configuration from an optional TOML file, then applies
    /// `CUECAST__*` environment overrides on top.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("CUECAST").separator("__"))
            .build()?
            .try_deserialize()
    }
}

// --- Default value functions for serde ---

fn default_broadcast_capacity() -> usize {
    256
}

fn default_observer_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolution_maps_to_tick_interval() {
        assert_eq!(TickResolution::High.interval(), Duration::from_millis(100));
        assert_eq!(TickResolution::Low.interval(), Duration::from_secs(1));
        assert_eq!(
            TickResolution::Custom { ticks_per_second: 0 }.interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn very_fast_custom_resolution_keeps_a_nonzero_period() {
        for ticks_per_second in [1000, 2000, u64::MAX] {
            let interval = TickResolution::Custom { ticks_per_second }.interval();
            assert_eq!(interval, Duration::from_millis(1));
        }
        assert_eq!(
            TickResolution::Custom { ticks_per_second: 3 }.interval(),
            Duration::from_nanos(333_333_333)
        );
    }

    #[test]
    fn loads_a_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
resolution = "high"

[bus]
observer_capacity = 8

[schedule]
path = "data/schedule.csv"
autosave = true
"#
        )
        .unwrap();

        let config = CuecastConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.resolution, TickResolution::High);
        assert_eq!(config.bus.observer_capacity, 8);
        assert_eq!(config.bus.broadcast_capacity, 256);
        assert_eq!(config.schedule.path, Some(PathBuf::from("data/schedule.csv")));
        assert!(config.schedule.autosave);
    }
}
