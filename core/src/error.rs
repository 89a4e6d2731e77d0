//! Error taxonomy for the booking engine.
//!
//! Three layers, matching how callers must react:
//!
//! - [`BookingError`]: the engine's public error set. Input errors and
//!   authorization failures surface immediately; `SlotConflict` means a race
//!   was lost and the caller must re-query availability and resubmit.
//! - [`ValidationError`]: pre-commit domain validation (slot count,
//!   contiguity, statuses, transitions). Refused, never silently dropped.
//! - [`StoreError`] (in [`crate::store`]): storage-layer failures.
//!
//! Nothing here is retried automatically; all recovery is caller-driven
//! resubmission.

use chrono::{NaiveTime, Weekday};
use thiserror::Error;

use crate::store::StoreError;
use crate::types::{BookingId, BookingStatus, SlotId, SlotStatus};

/// Domain validation failures raised before any transaction commits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The slot run does not match the service duration.
    #[error("expected {expected} slots, got {actual}")]
    WrongSlotCount {
        /// `duration_minutes / 15` for the service
        expected: u32,
        /// Slots actually supplied
        actual: u32,
    },

    /// Adjacent slots do not meet exactly.
    #[error("slot run breaks at position {index}: slots must be contiguous")]
    NotContiguous {
        /// Index of the first slot whose start does not equal the previous end
        index: usize,
    },

    /// The run spans more than one calendar date.
    #[error("slot run spans multiple dates")]
    MixedDates,

    /// A slot in the run is not in a claimable state.
    #[error("slot {id} is {status}")]
    SlotNotAvailable {
        /// The offending slot
        id: SlotId,
        /// Its current status
        status: SlotStatus,
    },

    /// The booking is not in a state that permits the requested operation.
    #[error("booking {id} is {status}; operation requires {required}")]
    InvalidTransition {
        /// The booking
        id: BookingId,
        /// Its current status
        status: BookingStatus,
        /// Human-readable requirement, e.g. "pending"
        required: &'static str,
    },

    /// Service duration is zero or not a multiple of 15 minutes.
    #[error("service duration {0}m is not a positive multiple of 15 minutes")]
    InvalidDuration(u32),

    /// Opening hours close at or before they open.
    #[error("opening hours for {weekday} close ({close_time}) at or before open ({open_time})")]
    InvalidOpeningHours {
        /// Weekday of the offending entry
        weekday: Weekday,
        /// Opening time
        open_time: NaiveTime,
        /// Closing time
        close_time: NaiveTime,
    },

    /// Rating outside 1..=5.
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),

    /// The booking already has a review.
    #[error("booking {0} already has a review")]
    DuplicateReview(BookingId),
}

/// The engine's public error set, surfaced to the presentation layer.
#[derive(Error, Debug)]
pub enum BookingError {
    /// A required field was empty or absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Date string did not parse as `YYYY-MM-DD`.
    #[error("invalid date: {0:?}")]
    InvalidDate(String),

    /// The requested date (or same-day start time) is in the past.
    #[error("requested time is in the past")]
    PastDate,

    /// Time string did not parse as `HH:MM`.
    #[error("invalid time: {0:?}")]
    InvalidTime(String),

    /// Unknown or malformed service reference.
    #[error("unknown service: {0:?}")]
    InvalidService(String),

    /// The requested run is not available (either never generated, or lost
    /// to a concurrent claim). The caller must re-query and resubmit.
    #[error("requested time slots are not available")]
    SlotConflict,

    /// Pre-commit domain validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No such booking.
    #[error("booking not found: {0}")]
    NotFound(BookingId),

    /// The booking belongs to another customer.
    #[error("booking belongs to another customer")]
    NotOwner,

    /// Storage-layer failure.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlotConflict { .. } => Self::SlotConflict,
            StoreError::BookingNotFound(id) => Self::NotFound(id),
            StoreError::InvalidBookingState { id, status, required } => {
                Self::Validation(ValidationError::InvalidTransition { id, status, required })
            }
            StoreError::DuplicateReview(id) => {
                Self::Validation(ValidationError::DuplicateReview(id))
            }
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_conflict_is_flattened_from_store_errors() {
        let err: BookingError = StoreError::SlotConflict {
            slots: vec![SlotId::new()],
        }
        .into();
        assert!(matches!(err, BookingError::SlotConflict));
    }

    #[test]
    fn booking_not_found_carries_the_id() {
        let id = BookingId::new();
        let err: BookingError = StoreError::BookingNotFound(id).into();
        assert!(matches!(err, BookingError::NotFound(got) if got == id));
    }
}
