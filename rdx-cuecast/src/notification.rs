//! Defines all notifications carried by the `NotificationBus`.
//!
//! Observers (presentation surface, control surface) subscribe to these
//! strongly-typed notifications; they never see the engine's internals.

use crate::common::{EventId, ObserverId};
use crate::event::Event;
use crate::state::{Phase, PlaybackOutcome};
use chrono::{Duration, NaiveDateTime};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum Notification {
    /// The scheduler entered a new phase, or the event it is about changed.
    PhaseChanged { phase: Phase, at: NaiveDateTime },
    /// The whole-second countdown to the next event moved.
    Countdown { event_id: EventId, remaining: Duration },
    /// The presentation surface reported the current event as finished.
    PlaybackEnded { id: EventId, outcome: PlaybackOutcome },
    /// The event list was mutated. Carries the new ordered view.
    EventsChanged {
        change: StoreChange,
        events: Arc<[Event]>,
    },
    System(SystemEvent),
}

/// Which store mutation produced an `EventsChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Added(EventId),
    Removed(EventId),
    Updated(EventId),
    Imported { count: usize },
}

/// Events related to the lifecycle of the engine and the bus itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the engine's run loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the engine's run loop has exited.
    EngineShutdown,
    ObserverAdded { id: ObserverId },
    ObserverRemoved { id: ObserverId },
}

impl Notification {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Notification::PhaseChanged { .. } => "phase",
            Notification::Countdown { .. } => "countdown",
            Notification::PlaybackEnded { .. } => "playback",
            Notification::EventsChanged { .. } => "events",
            Notification::System(_) => "system",
        }
    }
}
