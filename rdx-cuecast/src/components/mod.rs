//! Contains the building blocks the engine is assembled from.
//!
//! The evaluator decides what phase the scheduler should be in at a given
//! instant; observers carry the resulting notifications to whoever listens.
//! The `SchedulerEngine` and `NotificationBus` own collections of these.

pub mod evaluator;
pub mod observer;
