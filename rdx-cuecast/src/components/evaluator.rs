//! The per-tick decision procedure of the scheduler.
//!
//! `next_state` is pure: it looks at one ordered snapshot of the store and one
//! reading of the clock and returns the state the engine should move to.

use crate::event::Event;
use crate::state::{Phase, SchedulerState};
use chrono::{Duration, NaiveDateTime};

/// Scheduled events split around `now`, both in ordered-view order.
struct Partition<'a> {
    due: Vec<&'a Event>,
    future: Vec<&'a Event>,
}

fn partition(snapshot: &[Event], now: NaiveDateTime) -> Partition<'_> {
    let mut due = Vec::new();
    let mut future = Vec::new();
    for event in snapshot {
        match event.scheduled_at() {
            Some(at) if at <= now => due.push(event),
            Some(_) => future.push(event),
            None => {}
        }
    }
    Partition { due, future }
}

/// The due event with the greatest scheduled time; the first inserted wins a tie.
fn latest<'a>(due: &[&'a Event]) -> Option<&'a Event> {
    due.iter().copied().fold(None, |best: Option<&Event>, event| match best {
        Some(b) if b.scheduled_at() >= event.scheduled_at() => Some(b),
        _ => Some(event),
    })
}

/// Computes the state that follows `current` given `snapshot` at `now`.
pub fn next_state(current: &SchedulerState, snapshot: &[Event], now: NaiveDateTime) -> SchedulerState {
    let mut next = current.clone();
    let Partition { due, future } = partition(snapshot, now);
    let latest_due = latest(&due);

    if let Phase::Playing { event: playing } = &current.phase {
        let still_listed = snapshot.iter().find(|event| event.id == playing.id);
        if let (None, Some(refreshed)) = (current.playback_ended, still_listed) {
            match latest_due.filter(|c| c.id != playing.id && current.is_fresh(c)) {
                Some(newer) => next.fire(newer.clone(), now),
                None => next.phase = Phase::Playing { event: refreshed.clone() },
            }
            return next;
        }
    }

    if let Some(candidate) = latest_due.filter(|c| current.is_fresh(c)) {
        next.fire(candidate.clone(), now);
        return next;
    }

    let phase = match future.first() {
        Some(event) => Phase::CountingDown {
            event: (*event).clone(),
            remaining: event.remaining_from(now).unwrap_or_else(Duration::zero),
        },
        None => Phase::Idle,
    };
    next.settle(phase);
    next
}

/// The latest event already due at `now`, used to consume the schedule on a
/// manual trigger.
pub fn latest_due(snapshot: &[Event], now: NaiveDateTime) -> Option<&Event> {
    latest(&partition(snapshot, now).due)
}
