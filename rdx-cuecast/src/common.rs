//! Contains common, primitive identifier types.
//!
//! Distinct id types keep events and observers from being mixed up at call
//! sites.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Uniquely and safely identifies an observer registered on the
    /// `NotificationBus`.
    ///
    /// Slotmap keys are versioned, so a removed observer's id is never handed
    /// out again.
    pub struct ObserverId;
}

/// Stable identifier of an event inside an `EventStore`.
///
/// Ids are allocated by the store from a monotonically increasing counter and
/// are never reused, even after the event is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::str::FromStr for EventId {
    type Err = std::num::ParseIntError;

    /// Accepts both `7` and `#7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(EventId)
    }
}
