//! # Cuecast
//!
//! A tick-driven scheduler that fires timed video events and reports playback
//! phases to whoever is listening.
//!
//! Cuecast keeps an editable list of events, each with a wall-clock time and an
//! opaque media reference, and decides on every tick whether the schedule is
//! idle, counting down to the next event, or playing one.
//!
//! ## Core Concepts
//!
//! - **EventStore**: The single owner of all events. Every edit is atomic, and
//!   readers always get a consistent, time-ordered snapshot.
//! - **ClockSource**: Where "now" comes from. `SystemClock` in production,
//!   `ManualClock` in tests.
//! - **SchedulerEngine**: Polls the clock and the store on a fixed tick and moves
//!   between `Idle`, `CountingDown` and `Playing`. It re-derives what should be
//!   true on every tick instead of arming timers, so edits and system sleep
//!   need no special handling.
//! - **NotificationBus**: Carries phase changes and list changes to the
//!   presentation and control surfaces without ever blocking the tick.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cuecast::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create the engine with the default configuration.
//!     let engine = SchedulerEngine::new(CuecastConfig::default(), SystemClock);
//!
//!     // 2. Listen for phase changes, as a presentation surface would.
//!     engine
//!         .bus()
//!         .on_notification(|notification| {
//!             if let Notification::PhaseChanged { phase, .. } = notification {
//!                 println!("Now: {}", phase);
//!             }
//!         })
//!         .await;
//!
//!     // 3. Schedule something.
//!     let at = engine.now() + chrono::Duration::seconds(10);
//!     engine
//!         .store()
//!         .create(EventFields::new(Some(at), "intro.mp4", "Intro", "Opening titles"))
//!         .await;
//!
//!     // 4. Run the engine. It will shut down on Ctrl+C.
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Cuecast";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod bus;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod notification;
pub mod schedule_file;
pub mod state;
pub mod store;
pub mod time;

/// A prelude module for easy importing of the most common Cuecast types.
pub mod prelude {
    pub use crate::bus::NotificationBus;
    pub use crate::common::{EventId, ObserverId};
    pub use crate::config::{CuecastConfig, TickResolution};
    pub use crate::engine::SchedulerEngine;
    pub use crate::error::{ScheduleFileError, StoreError};
    pub use crate::event::{Event, EventFields, EventPatch};
    pub use crate::notification::{Notification, StoreChange, SystemEvent};
    pub use crate::state::{Phase, PhaseKind, PlaybackOutcome};
    pub use crate::store::EventStore;
    pub use crate::time::{ClockSource, ManualClock, SystemClock};
}
