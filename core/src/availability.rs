//! Availability finding: exact-match contiguous runs and the browse view.
//!
//! The finder is deliberately an exact-match strategy, not a best-fit
//! scheduler: slot granularity is fixed at 15 minutes, so the desired start
//! fully determines the windows to probe. On the first missing or
//! unavailable window the search aborts with no backtracking; the caller
//! resubmits a different start.

use chrono::{Duration, NaiveDate, NaiveTime};
use std::collections::BTreeMap;

use crate::store::{SlotStore, StoreError};
use crate::types::{SlotStatus, TimeSlot, SLOT_MINUTES};

/// The `count` consecutive 15-minute windows beginning at `start`.
///
/// Returns `None` when the run would cross midnight (no such slots can
/// exist: slots never span dates).
#[must_use]
pub fn run_windows(start: NaiveTime, count: u32) -> Option<Vec<(NaiveTime, NaiveTime)>> {
    let step = Duration::minutes(i64::from(SLOT_MINUTES));
    let mut windows = Vec::with_capacity(count as usize);
    let mut cursor = start;
    for _ in 0..count {
        let (end, wrapped) = cursor.overflowing_add_signed(step);
        if wrapped != 0 {
            return None;
        }
        windows.push((cursor, end));
        cursor = end;
    }
    Some(windows)
}

/// Locate a contiguous run of `count` available slots on `date` starting
/// exactly at `start`.
///
/// Each window is looked up individually; a missing slot or one that is not
/// `available` ends the search immediately with `Ok(None)` (unavailable).
///
/// This read takes no locks: a run found here can still be lost to a
/// concurrent claim, which the store surfaces as a conflict at commit time.
///
/// # Errors
///
/// Propagates [`StoreError`] from the underlying lookups.
pub async fn find_contiguous_run<S: SlotStore + ?Sized>(
    store: &S,
    date: NaiveDate,
    start: NaiveTime,
    count: u32,
) -> Result<Option<Vec<TimeSlot>>, StoreError> {
    let Some(windows) = run_windows(start, count) else {
        return Ok(None);
    };

    let mut run = Vec::with_capacity(windows.len());
    for (window_start, window_end) in windows {
        match store.find_slot(date, window_start, window_end).await? {
            Some(slot) if slot.status == SlotStatus::Available => run.push(slot),
            _ => return Ok(None),
        }
    }
    Ok(Some(run))
}

/// Resolve the same windows to slots regardless of status.
///
/// Used when retargeting a booking: the new run may overlap the booking's
/// own claimed slots, which are released inside the same transaction that
/// claims the new run. Any window without a generated slot yields `Ok(None)`.
///
/// # Errors
///
/// Propagates [`StoreError`] from the underlying lookups.
pub async fn resolve_run<S: SlotStore + ?Sized>(
    store: &S,
    date: NaiveDate,
    start: NaiveTime,
    count: u32,
) -> Result<Option<Vec<TimeSlot>>, StoreError> {
    let Some(windows) = run_windows(start, count) else {
        return Ok(None);
    };

    let mut run = Vec::with_capacity(windows.len());
    for (window_start, window_end) in windows {
        match store.find_slot(date, window_start, window_end).await? {
            Some(slot) => run.push(slot),
            None => return Ok(None),
        }
    }
    Ok(Some(run))
}

/// The browse view: available start times grouped by date, both ordered.
///
/// This is the mapping the presentation layer renders into its date and
/// time pickers.
///
/// # Errors
///
/// Propagates [`StoreError`] from the underlying listing.
pub async fn availability_by_date<S: SlotStore + ?Sized>(
    store: &S,
    from: NaiveDate,
) -> Result<BTreeMap<NaiveDate, Vec<NaiveTime>>, StoreError> {
    let mut by_date: BTreeMap<NaiveDate, Vec<NaiveTime>> = BTreeMap::new();
    for slot in store.available_slots(from).await? {
        by_date.entry(slot.date).or_default().push(slot.start_time);
    }
    Ok(by_date)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn windows_step_by_fifteen_minutes() {
        let windows = run_windows(t(9, 15), 3).unwrap();
        assert_eq!(
            windows,
            vec![
                (t(9, 15), t(9, 30)),
                (t(9, 30), t(9, 45)),
                (t(9, 45), t(10, 0)),
            ]
        );
    }

    #[test]
    fn windows_refuse_to_cross_midnight() {
        // the last representable window of a day ends at 23:45
        assert!(run_windows(t(23, 30), 2).is_none());
        assert!(run_windows(t(23, 15), 2).is_some());
    }

    #[test]
    fn zero_windows_is_an_empty_run() {
        assert_eq!(run_windows(t(9, 0), 0), Some(Vec::new()));
    }
}
