//! Pre-commit validation of a booking's slot run.
//!
//! The engine calls these checks before any transaction commits, on every
//! save that puts a booking into `pending` or `confirmed`. They are pure and
//! storage-independent; the store separately re-verifies statuses under
//! lock, because only statuses can change between validation and commit.

use crate::error::ValidationError;
use crate::types::{Service, SlotStatus, TimeSlot};

/// Validate the shape of a slot run against its service: the count must
/// equal `duration_minutes / 15` and the slots must form one contiguous
/// chain on a single date (each slot's start exactly equals the previous
/// slot's end).
///
/// Expects slots ordered by start time, which is how every store read
/// returns them.
///
/// # Errors
///
/// - [`ValidationError::WrongSlotCount`] on a count mismatch
/// - [`ValidationError::MixedDates`] if the run spans dates
/// - [`ValidationError::NotContiguous`] at the first gap or overlap
pub fn validate_run_shape(slots: &[TimeSlot], service: &Service) -> Result<(), ValidationError> {
    let expected = service.slots_required();
    let actual = u32::try_from(slots.len()).unwrap_or(u32::MAX);
    if actual != expected {
        return Err(ValidationError::WrongSlotCount { expected, actual });
    }

    for (index, pair) in slots.windows(2).enumerate() {
        if pair[1].date != pair[0].date {
            return Err(ValidationError::MixedDates);
        }
        if pair[1].start_time != pair[0].end_time {
            return Err(ValidationError::NotContiguous { index: index + 1 });
        }
    }

    Ok(())
}

/// Validate that every slot in the run is in one of `allowed` statuses.
///
/// For a fresh claim `allowed` is `[Available]`; for staff confirmation it
/// is `[Available, Pending]`, since the slots were already placed in
/// `pending` by this booking's own claim.
///
/// # Errors
///
/// - [`ValidationError::SlotNotAvailable`] naming the first offending slot
pub fn validate_statuses(
    slots: &[TimeSlot],
    allowed: &[SlotStatus],
) -> Result<(), ValidationError> {
    for slot in slots {
        if !allowed.contains(&slot.status) {
            return Err(ValidationError::SlotNotAvailable {
                id: slot.id,
                status: slot.status,
            });
        }
    }
    Ok(())
}

/// Full pre-claim validation: shape plus all-available.
///
/// # Errors
///
/// Any error from [`validate_run_shape`] or [`validate_statuses`].
pub fn validate_claim(slots: &[TimeSlot], service: &Service) -> Result<(), ValidationError> {
    validate_run_shape(slots, service)?;
    validate_statuses(slots, &[SlotStatus::Available])
}
