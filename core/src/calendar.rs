//! Calendar expansion: weekly opening hours into dated 15-minute slots.
//!
//! Pure functions only; the engine feeds the result to
//! [`crate::store::SlotStore::insert_slots`], whose insert-if-absent
//! semantics make the whole generation pass idempotent.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashMap;

use crate::types::{NewSlot, OpeningHours, SLOT_MINUTES};

/// Expand one day's opening hours into 15-minute slots.
///
/// Emits a slot for every quarter hour that fits entirely inside
/// `[open_time, close_time)`: Monday 09:00-10:00 yields exactly
/// 09:00-09:15, 09:15-09:30, 09:30-09:45 and 09:45-10:00.
#[must_use]
pub fn day_slots(date: NaiveDate, hours: &OpeningHours) -> Vec<NewSlot> {
    let step = Duration::minutes(i64::from(SLOT_MINUTES));
    let mut slots = Vec::new();
    let mut start = hours.open_time;
    while start + step <= hours.close_time && start + step > start {
        if let Some(slot) = NewSlot::quarter_hour(date, start) {
            slots.push(slot);
        }
        start += step;
    }
    slots
}

/// Expand a rolling horizon of `horizon_days` starting at `today`.
///
/// Days whose weekday has no opening-hours entry are skipped and returned
/// in the second element so the caller can report them (skipping is not an
/// error: the shop is simply closed that day).
#[must_use]
pub fn horizon_slots(
    today: NaiveDate,
    horizon_days: u32,
    hours: &[OpeningHours],
) -> (Vec<NewSlot>, Vec<NaiveDate>) {
    let by_weekday: HashMap<Weekday, &OpeningHours> =
        hours.iter().map(|h| (h.weekday, h)).collect();

    let mut slots = Vec::new();
    let mut skipped = Vec::new();
    for offset in 0..horizon_days {
        let date = today + Duration::days(i64::from(offset));
        match by_weekday.get(&date.weekday()) {
            Some(day_hours) => slots.extend(day_slots(date, day_hours)),
            None => skipped.push(date),
        }
    }
    (slots, skipped)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2025-03-03 is a Monday
    const MONDAY: (i32, u32, u32) = (2025, 3, 3);

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(MONDAY.0, MONDAY.1, MONDAY.2).unwrap()
    }

    #[test]
    fn one_hour_yields_four_slots() {
        let hours = OpeningHours::new(Weekday::Mon, t(9, 0), t(10, 0)).unwrap();
        let slots = day_slots(monday(), &hours);
        let windows: Vec<(NaiveTime, NaiveTime)> =
            slots.iter().map(|s| (s.start_time, s.end_time)).collect();
        assert_eq!(
            windows,
            vec![
                (t(9, 0), t(9, 15)),
                (t(9, 15), t(9, 30)),
                (t(9, 30), t(9, 45)),
                (t(9, 45), t(10, 0)),
            ]
        );
    }

    #[test]
    fn partial_trailing_window_is_dropped() {
        // 09:00-09:20: only one full quarter hour fits
        let hours = OpeningHours::new(Weekday::Mon, t(9, 0), t(9, 20)).unwrap();
        assert_eq!(day_slots(monday(), &hours).len(), 1);
    }

    #[test]
    fn horizon_skips_days_without_hours() {
        // Only Monday is open; a 7-day horizon from Monday covers one open day
        let hours = vec![OpeningHours::new(Weekday::Mon, t(9, 0), t(10, 0)).unwrap()];
        let (slots, skipped) = horizon_slots(monday(), 7, &hours);
        assert_eq!(slots.len(), 4);
        assert_eq!(skipped.len(), 6);
        assert!(slots.iter().all(|s| s.date == monday()));
    }

    #[test]
    fn horizon_of_zero_is_empty() {
        let hours = vec![OpeningHours::new(Weekday::Mon, t(9, 0), t(10, 0)).unwrap()];
        let (slots, skipped) = horizon_slots(monday(), 0, &hours);
        assert!(slots.is_empty());
        assert!(skipped.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Slot count is always the number of whole quarter hours in the
            // opening interval.
            #[test]
            fn count_matches_interval(open_q in 0u32..40, len_q in 1u32..24) {
                let open = t((open_q * 15) / 60, (open_q * 15) % 60);
                let close_q = (open_q + len_q).min(95);
                prop_assume!(close_q > open_q);
                let close = t((close_q * 15) / 60, (close_q * 15) % 60);
                let hours = OpeningHours::new(Weekday::Mon, open, close).unwrap();
                let slots = day_slots(monday(), &hours);
                prop_assert_eq!(slots.len() as u32, close_q - open_q);
            }

            // Consecutive generated slots are contiguous.
            #[test]
            fn generated_slots_chain(len_q in 2u32..16) {
                let close = t(9 + (len_q * 15) / 60, (len_q * 15) % 60);
                let hours = OpeningHours::new(Weekday::Mon, t(9, 0), close).unwrap();
                let slots = day_slots(monday(), &hours);
                for pair in slots.windows(2) {
                    prop_assert_eq!(pair[0].end_time, pair[1].start_time);
                }
            }
        }
    }
}
