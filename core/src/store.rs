//! Storage contracts for slots, bookings and the service catalog.
//!
//! # Design
//!
//! The traits here are the seam between the lifecycle engine and the
//! database. Every slot-status transition tied to a booking (claim, confirm,
//! cancel, retarget) is a **single atomic operation** on the store: the
//! implementation must lock the affected rows, re-verify their statuses and
//! commit or roll back as one unit, so that two concurrent claims for an
//! overlapping slot set cannot both succeed: the loser observes the
//! winner's effect and fails with [`StoreError::SlotConflict`].
//!
//! Shape validation (slot count, contiguity) is the caller's pre-commit
//! responsibility via [`crate::validation`]; the store re-verifies only what
//! can change under concurrency, i.e. statuses and existence.
//!
//! Reads ([`SlotStore::available_slots`], [`BookingStore::booking`]) need no
//! serializability: a slot shown free and claimed microseconds later simply
//! surfaces as `SlotConflict` on the next claim attempt.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `shearbook-postgres`): production, row-level
//!   `SELECT ... FOR UPDATE`
//! - `MemoryStore` (in `shearbook-testing`): in-process, one mutex
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
//! the engine can hold an `Arc<dyn Store>`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::audit::{DuplicateSlot, SlotCountMismatch};
use crate::types::{
    BookingId, BookingRecord, BookingStatus, CustomerId, NewSlot, OpeningHours, Review, Service,
    ServiceId, SlotId, SlotStatus, TimeSlot,
};

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A write would violate the `(date, start_time, end_time)` uniqueness
    /// invariant.
    #[error("duplicate slot: {date} {start_time} - {end_time}")]
    DuplicateSlot {
        /// Date of the offending slot
        date: NaiveDate,
        /// Start time of the offending slot
        start_time: NaiveTime,
        /// End time of the offending slot
        end_time: NaiveTime,
    },

    /// A claim lost the race: at commit time at least one target slot was no
    /// longer in the required status (or no longer existed).
    #[error("slot conflict: {} slot(s) unavailable at commit", slots.len())]
    SlotConflict {
        /// The slots that could not be claimed
        slots: Vec<SlotId>,
    },

    /// No booking row with this id.
    #[error("booking not found: {0}")]
    BookingNotFound(BookingId),

    /// The booking was not in a state permitting the transition when the
    /// row lock was taken.
    #[error("booking {id} is {status}; operation requires {required}")]
    InvalidBookingState {
        /// The booking
        id: BookingId,
        /// Status observed under lock
        status: BookingStatus,
        /// Requirement, e.g. "pending"
        required: &'static str,
    },

    /// The booking already has a review.
    #[error("booking {0} already has a review")]
    DuplicateReview(BookingId),

    /// A stored row failed to decode into a domain value.
    #[error("corrupted row: {0}")]
    Corrupted(String),

    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),
}

/// The authoritative set of time slots.
///
/// Enforces the no-duplicate invariant at write time and owns the bulk
/// status primitives the lifecycle builds on.
pub trait SlotStore: Send + Sync {
    /// Insert slots with insert-if-absent semantics keyed on
    /// `(date, start_time, end_time)`.
    ///
    /// Re-running the calendar generator must not create duplicates, so
    /// already-present windows are skipped silently. Returns the number of
    /// slots actually created.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn insert_slots(
        &self,
        slots: Vec<NewSlot>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>>;

    /// Look up the slot exactly matching `(date, start, end)`, any status.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn find_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TimeSlot>, StoreError>> + Send + '_>>;

    /// All `available` slots on or after `from`, ordered by
    /// `(date, start_time)`. Finite; restartable per call.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn available_slots(
        &self,
        from: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TimeSlot>, StoreError>> + Send + '_>>;

    /// Atomic bulk status update. Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn set_slot_status(
        &self,
        slot_ids: Vec<SlotId>,
        status: SlotStatus,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>>;

    /// Housekeeping: flip past, still-`available` slots to `expired`.
    ///
    /// Only slots whose end timestamp is strictly before `cutoff` are
    /// touched; at most `limit` per call. Idempotent and safe alongside live
    /// booking traffic. Returns the number of slots expired.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn expire_slots_before(
        &self,
        cutoff: NaiveDateTime,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>>;

    /// Audit query: groups of `(date, start, end)` with more than one slot.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn duplicate_slots(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DuplicateSlot>, StoreError>> + Send + '_>>;
}

/// Booking rows, their slot claims, and reviews.
///
/// Each mutating operation is one atomic transaction; `now` stamps
/// `created_at`/`updated_at` so callers keep control of time.
pub trait BookingStore: Send + Sync {
    /// Claim-and-create: verify every target slot is `available`, flip them
    /// to `pending` and insert the pending booking row plus its slot
    /// references, all in one transaction.
    ///
    /// # Errors
    ///
    /// - `SlotConflict`: at least one slot was not `available` at commit
    ///   time; nothing was claimed
    /// - `Database`: connection or query failed
    fn create_booking(
        &self,
        customer: CustomerId,
        service_id: ServiceId,
        slot_ids: Vec<SlotId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>>;

    /// Load a booking with its slots ordered by `(date, start_time)`.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn booking(
        &self,
        id: BookingId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BookingRecord>, StoreError>> + Send + '_>>;

    /// Staff confirmation: booking must still be `pending` under lock; its
    /// slots are re-validated (`pending` as claimed, or still `available`)
    /// and flipped to `booked`.
    ///
    /// # Errors
    ///
    /// - `BookingNotFound`: no such booking
    /// - `InvalidBookingState`: not `pending` when the lock was taken
    /// - `SlotConflict`: a referenced slot left the claimable states
    /// - `Database`: connection or query failed
    fn confirm_booking(
        &self,
        id: BookingId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>>;

    /// Cancellation (customer cancel or staff decline): booking must be
    /// `pending` or `confirmed`; all its slots revert to `available`
    /// unconditionally.
    ///
    /// # Errors
    ///
    /// - `BookingNotFound`: no such booking
    /// - `InvalidBookingState`: already cancelled or completed
    /// - `Database`: connection or query failed
    fn cancel_booking(
        &self,
        id: BookingId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>>;

    /// Retarget an existing `pending` or `confirmed` booking to a new
    /// service and slot run: release old slots, replace the slot
    /// references, verify the new slots are `available` and claim them at
    /// the tier matching the booking's status (`pending` booking claims to
    /// `pending`, `confirmed` to `booked`). One transaction; on failure the
    /// booking keeps its original slots.
    ///
    /// # Errors
    ///
    /// - `BookingNotFound`: no such booking
    /// - `InvalidBookingState`: already cancelled or completed
    /// - `SlotConflict`: a new slot was not `available` after the release
    /// - `Database`: connection or query failed
    fn retarget_booking(
        &self,
        id: BookingId,
        service_id: ServiceId,
        slot_ids: Vec<SlotId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>>;

    /// The first `limit` `confirmed` bookings (oldest first), with slots.
    ///
    /// Feed for the completion sweep; bounded so a pass has bounded cost.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn confirmed_bookings(
        &self,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BookingRecord>, StoreError>> + Send + '_>>;

    /// Flip the given bookings to `completed`, touching only rows still
    /// `confirmed` (a concurrent cancel wins). Slots are left `booked`.
    /// Returns the number of bookings updated.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn complete_bookings(
        &self,
        ids: Vec<BookingId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>>;

    /// Attach a review to its booking. At most one per booking.
    ///
    /// # Errors
    ///
    /// - `DuplicateReview`: the booking already has a review
    /// - `BookingNotFound`: no such booking
    /// - `Database`: connection or query failed
    fn insert_review(
        &self,
        review: Review,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Audit query: non-cancelled bookings whose stored slot count differs
    /// from `service.duration_minutes / 15`.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn slot_count_mismatches(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SlotCountMismatch>, StoreError>> + Send + '_>>;
}

/// Read access to the service catalog and opening hours.
///
/// The engine treats both as externally managed configuration.
pub trait ServiceCatalog: Send + Sync {
    /// Look up a service by id.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn service(
        &self,
        id: ServiceId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Service>, StoreError>> + Send + '_>>;

    /// All opening-hours entries (at most one per weekday).
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn opening_hours(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OpeningHours>, StoreError>> + Send + '_>>;
}

/// The full storage surface the engine depends on.
///
/// Blanket-implemented for anything providing all three contracts.
pub trait Store: SlotStore + BookingStore + ServiceCatalog {}

impl<T: SlotStore + BookingStore + ServiceCatalog> Store for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_conflict_error_reports_count() {
        let error = StoreError::SlotConflict {
            slots: vec![SlotId::new(), SlotId::new()],
        };
        assert!(format!("{error}").contains("2 slot(s)"));
    }

    #[test]
    fn invalid_state_error_names_the_requirement() {
        let error = StoreError::InvalidBookingState {
            id: BookingId::new(),
            status: BookingStatus::Cancelled,
            required: "pending or confirmed",
        };
        let display = format!("{error}");
        assert!(display.contains("cancelled"));
        assert!(display.contains("pending or confirmed"));
    }
}
