//! The scheduled event record and its editable fields.

use crate::common::EventId;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A scheduled (time, media, metadata) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(flatten)]
    pub fields: EventFields,
}

/// The mutable part of an `Event`. Also the shape of an id-less record coming
/// from a schedule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    /// `None` marks an unscheduled event, playable only by a manual trigger.
    pub scheduled_at: Option<NaiveDateTime>,
    /// Opaque reference to playable content. Never inspected by the scheduler.
    pub media_ref: String,
    pub title: String,
    pub description: String,
}

/// A partial update applied by `EventStore::update`.
///
/// `scheduled_at: Some(None)` clears the schedule, turning the event into an
/// unscheduled one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub scheduled_at: Option<Option<NaiveDateTime>>,
    pub media_ref: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Event {
    pub fn new(id: EventId, fields: EventFields) -> Self {
        Self { id, fields }
    }

    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        self.fields.scheduled_at
    }

    pub fn title(&self) -> &str {
        &self.fields.title
    }

    pub fn media_ref(&self) -> &str {
        &self.fields.media_ref
    }

    /// Time left until this event is due, measured from `now`. Negative once
    /// the event has passed; `None` for unscheduled events.
    pub fn remaining_from(&self, now: NaiveDateTime) -> Option<Duration> {
        self.fields.scheduled_at.map(|at| at - now)
    }

    /// Whether the event is scheduled at or before `now`.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        matches!(self.fields.scheduled_at, Some(at) if at <= now)
    }
}

impl EventFields {
    pub fn new(
        scheduled_at: Option<NaiveDateTime>,
        media_ref: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            scheduled_at,
            media_ref: media_ref.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self == &EventPatch::default()
    }

    /// Applies every present field onto `fields`.
    pub(crate) fn apply(self, fields: &mut EventFields) {
        if let Some(scheduled_at) = self.scheduled_at {
            fields.scheduled_at = scheduled_at;
        }
        if let Some(media_ref) = self.media_ref {
            fields.media_ref = media_ref;
        }
        if let Some(title) = self.title {
            fields.title = title;
        }
        if let Some(description) = self.description {
            fields.description = description;
        }
    }
}
