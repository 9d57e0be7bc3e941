//! Error types raised by the event store and the schedule file collaborator.

use crate::common::EventId;
use std::io;
use thiserror::Error;

/// Rejected `EventStore` operations. A failed operation never mutates the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("an event with id {0} already exists")]
    DuplicateId(EventId),

    #[error("no event with id {0}")]
    NotFound(EventId),
}

/// Errors raised while reading or writing a schedule CSV file.
#[derive(Debug, Error)]
pub enum ScheduleFileError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("row {row}: invalid {field} '{value}'")]
    InvalidTimestamp {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("row {row}: {field} field is required")]
    MissingField { row: usize, field: &'static str },
}

impl ScheduleFileError {
    pub fn invalid_timestamp(row: usize, field: &'static str, value: &str) -> Self {
        ScheduleFileError::InvalidTimestamp {
            row,
            field,
            value: value.to_string(),
        }
    }
}
