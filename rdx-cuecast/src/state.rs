//! Scheduler phases and the engine-owned scheduler state.

use crate::common::EventId;
use crate::event::Event;
use chrono::{Duration, NaiveDateTime};
use std::fmt;

/// What the scheduler is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing is counting down and nothing is playing.
    #[default]
    Idle,
    /// Waiting for `event`, which is due in `remaining`.
    CountingDown { event: Event, remaining: Duration },
    /// `event` is on air.
    Playing { event: Event },
}

/// The variant of a `Phase` without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Idle,
    CountingDown,
    Playing,
}

/// How the presentation surface reported the end of playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::CountingDown { .. } => PhaseKind::CountingDown,
            Phase::Playing { .. } => PhaseKind::Playing,
        }
    }

    /// The event the phase is about, if any.
    pub fn event(&self) -> Option<&Event> {
        match self {
            Phase::Idle => None,
            Phase::CountingDown { event, .. } | Phase::Playing { event } => Some(event),
        }
    }

    pub fn playing(&self) -> Option<&Event> {
        match self {
            Phase::Playing { event } => Some(event),
            _ => None,
        }
    }

    /// Whether `other` is the same state for observers: same kind about the
    /// same event with the same content. The countdown value is ignored.
    pub fn same_state(&self, other: &Phase) -> bool {
        self.kind() == other.kind() && self.event() == other.event()
    }

    /// Whole seconds left while counting down.
    pub fn remaining_secs(&self) -> Option<i64> {
        match self {
            Phase::CountingDown { remaining, .. } => Some(remaining.num_seconds()),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::CountingDown { event, remaining } => write!(
                f,
                "counting down to {} '{}' ({}s)",
                event.id,
                event.title(),
                remaining.num_seconds()
            ),
            Phase::Playing { event } => write!(f, "playing {} '{}'", event.id, event.title()),
        }
    }
}

/// Ephemeral scheduler state, owned exclusively by the engine and rebuilt
/// against a fresh store snapshot on every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerState {
    pub phase: Phase,
    /// The most recent event that transitioned to `Playing`.
    pub last_fired: Option<EventId>,
    /// `scheduled_at` of `last_fired` at the moment it fired.
    pub last_fired_slot: Option<NaiveDateTime>,
    /// Latest scheduled time already consumed by a firing.
    pub watermark: Option<NaiveDateTime>,
    /// Set once the presentation surface reports the current event ended.
    pub playback_ended: Option<PlaybackOutcome>,
    /// Clock time at which the current `Playing` phase began.
    pub started_at: Option<NaiveDateTime>,
}

impl SchedulerState {
    /// Whether the clock may still fire `event`.
    pub fn is_fresh(&self, event: &Event) -> bool {
        let Some(at) = event.scheduled_at() else {
            return false;
        };
        if self.watermark.is_some_and(|mark| at <= mark) {
            return false;
        }
        !(self.last_fired == Some(event.id) && self.last_fired_slot == Some(at))
    }

    /// Records that `event` went on air at `now`.
    pub(crate) fn fire(&mut self, event: Event, now: NaiveDateTime) {
        self.last_fired = Some(event.id);
        self.last_fired_slot = event.scheduled_at();
        if let Some(at) = event.scheduled_at().filter(|at| *at <= now) {
            self.watermark = Some(self.watermark.map_or(at, |mark| mark.max(at)));
        }
        self.playback_ended = None;
        self.started_at = Some(now);
        self.phase = Phase::Playing { event };
    }

    /// Leaves any `Playing` phase bookkeeping behind.
    pub(crate) fn settle(&mut self, phase: Phase) {
        self.playback_ended = None;
        self.started_at = None;
        self.phase = phase;
    }
}
