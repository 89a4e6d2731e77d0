//! In-memory store with production-equivalent atomicity.
//!
//! All state sits behind one mutex, so every storage operation is trivially
//! a single atomic unit: exactly the guarantee the PostgreSQL store provides
//! with row locks. Lifecycle and race tests run against this without a
//! database and observe the same conflict behavior.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};

use shearbook_core::audit::{DuplicateSlot, SlotCountMismatch};
use shearbook_core::store::{BookingStore, ServiceCatalog, SlotStore, StoreError};
use shearbook_core::types::{
    Booking, BookingId, BookingRecord, BookingStatus, CustomerId, NewSlot, OpeningHours, Review,
    Service, ServiceId, SlotId, SlotStatus, TimeSlot,
};

#[derive(Default)]
struct Inner {
    services: HashMap<ServiceId, Service>,
    opening_hours: HashMap<Weekday, OpeningHours>,
    slots: HashMap<SlotId, TimeSlot>,
    bookings: HashMap<BookingId, Booking>,
    booking_slots: HashMap<BookingId, Vec<SlotId>>,
    reviews: HashMap<BookingId, Review>,
}

impl Inner {
    fn sorted_slots(&self, ids: &[SlotId]) -> Vec<TimeSlot> {
        let mut slots: Vec<TimeSlot> = ids
            .iter()
            .filter_map(|id| self.slots.get(id).copied())
            .collect();
        slots.sort_by_key(|s| (s.date, s.start_time));
        slots
    }

    fn record(&self, id: BookingId) -> Option<BookingRecord> {
        let booking = self.bookings.get(&id)?.clone();
        let slot_ids = self.booking_slots.get(&id).cloned().unwrap_or_default();
        Some(BookingRecord {
            booking,
            slots: self.sorted_slots(&slot_ids),
        })
    }

    fn active_booking(
        &self,
        id: BookingId,
        required: &'static str,
    ) -> Result<Booking, StoreError> {
        let booking = self
            .bookings
            .get(&id)
            .cloned()
            .ok_or(StoreError::BookingNotFound(id))?;
        if !booking.status.is_active() {
            return Err(StoreError::InvalidBookingState {
                id,
                status: booking.status,
                required,
            });
        }
        Ok(booking)
    }
}

/// In-memory implementation of the storage contracts.
///
/// Also exposes a few plain setters (`add_service`, `add_opening_hours`,
/// `insert_slot_unchecked`) for fixture setup that production code does
/// through operator tooling.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    /// Register a service in the catalog.
    pub fn add_service(&self, service: Service) {
        self.lock().services.insert(service.id, service);
    }

    /// Set (or replace) the opening hours for one weekday.
    pub fn add_opening_hours(&self, hours: OpeningHours) {
        self.lock().opening_hours.insert(hours.weekday, hours);
    }

    /// Insert a slot row bypassing the uniqueness check.
    ///
    /// Exists so audit tests can fabricate the corruption the auditor is
    /// supposed to find.
    pub fn insert_slot_unchecked(&self, slot: TimeSlot) {
        self.lock().slots.insert(slot.id, slot);
    }

    /// Current state of one slot.
    #[must_use]
    pub fn slot(&self, id: SlotId) -> Option<TimeSlot> {
        self.lock().slots.get(&id).copied()
    }

    /// All slots on a date, ordered by start time.
    #[must_use]
    pub fn slots_on(&self, date: NaiveDate) -> Vec<TimeSlot> {
        let inner = self.lock();
        let mut slots: Vec<TimeSlot> = inner
            .slots
            .values()
            .filter(|s| s.date == date)
            .copied()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        slots
    }

    /// The review attached to a booking, if any.
    #[must_use]
    pub fn review(&self, id: BookingId) -> Option<Review> {
        self.lock().reviews.get(&id).cloned()
    }

    /// Drop all but the first `keep` slot references of a booking.
    ///
    /// Exists so audit tests can fabricate the slot-count corruption the
    /// auditor is supposed to find.
    pub fn truncate_booking_slots(&self, id: BookingId, keep: usize) {
        let mut inner = self.lock();
        if let Some(ids) = inner.booking_slots.get_mut(&id) {
            ids.truncate(keep);
        }
    }
}

impl SlotStore for MemoryStore {
    fn insert_slots(
        &self,
        slots: Vec<NewSlot>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut created = 0;
            for new in slots {
                let exists = inner.slots.values().any(|s| {
                    s.date == new.date
                        && s.start_time == new.start_time
                        && s.end_time == new.end_time
                });
                if exists {
                    continue;
                }
                inner.slots.insert(
                    new.id,
                    TimeSlot {
                        id: new.id,
                        date: new.date,
                        start_time: new.start_time,
                        end_time: new.end_time,
                        status: SlotStatus::Available,
                    },
                );
                created += 1;
            }
            Ok(created)
        })
    }

    fn find_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Pin<Box<dyn Future<Output = Result<Option<TimeSlot>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock();
            Ok(inner
                .slots
                .values()
                .find(|s| s.date == date && s.start_time == start && s.end_time == end)
                .copied())
        })
    }

    fn available_slots(
        &self,
        from: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TimeSlot>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock();
            let mut slots: Vec<TimeSlot> = inner
                .slots
                .values()
                .filter(|s| s.status == SlotStatus::Available && s.date >= from)
                .copied()
                .collect();
            slots.sort_by_key(|s| (s.date, s.start_time));
            Ok(slots)
        })
    }

    fn set_slot_status(
        &self,
        slot_ids: Vec<SlotId>,
        status: SlotStatus,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut changed = 0;
            for id in slot_ids {
                if let Some(slot) = inner.slots.get_mut(&id) {
                    slot.status = status;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    fn expire_slots_before(
        &self,
        cutoff: NaiveDateTime,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut candidates: Vec<SlotId> = inner
                .slots
                .values()
                .filter(|s| s.status == SlotStatus::Available && s.ends_at() < cutoff)
                .map(|s| s.id)
                .collect();
            candidates.sort();
            candidates.truncate(limit as usize);

            let mut expired = 0;
            for id in candidates {
                if let Some(slot) = inner.slots.get_mut(&id) {
                    slot.status = SlotStatus::Expired;
                    expired += 1;
                }
            }
            Ok(expired)
        })
    }

    fn duplicate_slots(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DuplicateSlot>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock();
            let mut groups: HashMap<(NaiveDate, NaiveTime, NaiveTime), u64> = HashMap::new();
            for slot in inner.slots.values() {
                *groups
                    .entry((slot.date, slot.start_time, slot.end_time))
                    .or_default() += 1;
            }
            let mut duplicates: Vec<DuplicateSlot> = groups
                .into_iter()
                .filter(|&(_, count)| count > 1)
                .map(|((date, start_time, end_time), count)| DuplicateSlot {
                    date,
                    start_time,
                    end_time,
                    count,
                })
                .collect();
            duplicates.sort_by_key(|d| (d.date, d.start_time));
            Ok(duplicates)
        })
    }
}

impl BookingStore for MemoryStore {
    fn create_booking(
        &self,
        customer: CustomerId,
        service_id: ServiceId,
        slot_ids: Vec<SlotId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();

            let blocked: Vec<SlotId> = slot_ids
                .iter()
                .copied()
                .filter(|id| {
                    inner
                        .slots
                        .get(id)
                        .is_none_or(|s| s.status != SlotStatus::Available)
                })
                .collect();
            if !blocked.is_empty() {
                return Err(StoreError::SlotConflict { slots: blocked });
            }

            for id in &slot_ids {
                if let Some(slot) = inner.slots.get_mut(id) {
                    slot.status = SlotStatus::Pending;
                }
            }

            let booking = Booking {
                id: BookingId::new(),
                customer,
                service_id,
                status: BookingStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            let id = booking.id;
            inner.bookings.insert(id, booking);
            inner.booking_slots.insert(id, slot_ids);

            inner
                .record(id)
                .ok_or_else(|| StoreError::Database("booking vanished mid-create".into()))
        })
    }

    fn booking(
        &self,
        id: BookingId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BookingRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move { Ok(self.lock().record(id)) })
    }

    fn confirm_booking(
        &self,
        id: BookingId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();

            let booking = inner
                .bookings
                .get(&id)
                .cloned()
                .ok_or(StoreError::BookingNotFound(id))?;
            if booking.status != BookingStatus::Pending {
                return Err(StoreError::InvalidBookingState {
                    id,
                    status: booking.status,
                    required: "pending",
                });
            }

            let slot_ids = inner.booking_slots.get(&id).cloned().unwrap_or_default();
            let blocked: Vec<SlotId> = slot_ids
                .iter()
                .copied()
                .filter(|sid| {
                    inner.slots.get(sid).is_none_or(|s| {
                        !matches!(s.status, SlotStatus::Available | SlotStatus::Pending)
                    })
                })
                .collect();
            if !blocked.is_empty() {
                return Err(StoreError::SlotConflict { slots: blocked });
            }

            for sid in &slot_ids {
                if let Some(slot) = inner.slots.get_mut(sid) {
                    slot.status = SlotStatus::Booked;
                }
            }
            if let Some(b) = inner.bookings.get_mut(&id) {
                b.status = BookingStatus::Confirmed;
                b.updated_at = now;
            }

            inner
                .record(id)
                .ok_or_else(|| StoreError::Database("booking vanished mid-confirm".into()))
        })
    }

    fn cancel_booking(
        &self,
        id: BookingId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.active_booking(id, "pending or confirmed")?;

            // Release unconditionally, whatever the slots' prior tier.
            let slot_ids = inner.booking_slots.get(&id).cloned().unwrap_or_default();
            for sid in &slot_ids {
                if let Some(slot) = inner.slots.get_mut(sid) {
                    slot.status = SlotStatus::Available;
                }
            }
            if let Some(b) = inner.bookings.get_mut(&id) {
                b.status = BookingStatus::Cancelled;
                b.updated_at = now;
            }

            inner
                .record(id)
                .ok_or_else(|| StoreError::Database("booking vanished mid-cancel".into()))
        })
    }

    fn retarget_booking(
        &self,
        id: BookingId,
        service_id: ServiceId,
        slot_ids: Vec<SlotId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let booking = inner.active_booking(id, "pending or confirmed")?;

            let old_ids = inner.booking_slots.get(&id).cloned().unwrap_or_default();

            // Check claimability before mutating anything: a new slot must
            // be available, or currently held by this very booking.
            let blocked: Vec<SlotId> = slot_ids
                .iter()
                .copied()
                .filter(|sid| {
                    let owned = old_ids.contains(sid);
                    inner
                        .slots
                        .get(sid)
                        .is_none_or(|s| s.status != SlotStatus::Available && !owned)
                })
                .collect();
            if !blocked.is_empty() {
                return Err(StoreError::SlotConflict { slots: blocked });
            }

            for sid in &old_ids {
                if let Some(slot) = inner.slots.get_mut(sid) {
                    slot.status = SlotStatus::Available;
                }
            }
            let claimed = booking.status.claimed_slot_status();
            for sid in &slot_ids {
                if let Some(slot) = inner.slots.get_mut(sid) {
                    slot.status = claimed;
                }
            }
            inner.booking_slots.insert(id, slot_ids);
            if let Some(b) = inner.bookings.get_mut(&id) {
                b.service_id = service_id;
                b.updated_at = now;
            }

            inner
                .record(id)
                .ok_or_else(|| StoreError::Database("booking vanished mid-retarget".into()))
        })
    }

    fn confirmed_bookings(
        &self,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BookingRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock();
            let mut confirmed: Vec<&Booking> = inner
                .bookings
                .values()
                .filter(|b| b.status == BookingStatus::Confirmed)
                .collect();
            confirmed.sort_by_key(|b| b.created_at);
            Ok(confirmed
                .into_iter()
                .take(limit as usize)
                .filter_map(|b| inner.record(b.id))
                .collect())
        })
    }

    fn complete_bookings(
        &self,
        ids: Vec<BookingId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut updated = 0;
            for id in ids {
                if let Some(b) = inner.bookings.get_mut(&id) {
                    if b.status == BookingStatus::Confirmed {
                        b.status = BookingStatus::Completed;
                        b.updated_at = now;
                        updated += 1;
                    }
                }
            }
            Ok(updated)
        })
    }

    fn insert_review(
        &self,
        review: Review,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock();
            if !inner.bookings.contains_key(&review.booking_id) {
                return Err(StoreError::BookingNotFound(review.booking_id));
            }
            if inner.reviews.contains_key(&review.booking_id) {
                return Err(StoreError::DuplicateReview(review.booking_id));
            }
            inner.reviews.insert(review.booking_id, review);
            Ok(())
        })
    }

    fn slot_count_mismatches(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SlotCountMismatch>, StoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let inner = self.lock();
            let mut mismatches = Vec::new();
            for booking in inner.bookings.values() {
                if booking.status == BookingStatus::Cancelled {
                    continue;
                }
                let Some(service) = inner.services.get(&booking.service_id) else {
                    continue;
                };
                let expected = u64::from(service.slots_required());
                let actual = inner
                    .booking_slots
                    .get(&booking.id)
                    .map_or(0, |ids| ids.len() as u64);
                if actual != expected {
                    mismatches.push(SlotCountMismatch {
                        booking_id: booking.id,
                        actual,
                        expected,
                    });
                }
            }
            mismatches.sort_by_key(|m| *m.booking_id.as_uuid());
            Ok(mismatches)
        })
    }
}

impl ServiceCatalog for MemoryStore {
    fn service(
        &self,
        id: ServiceId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Service>, StoreError>> + Send + '_>> {
        Box::pin(async move { Ok(self.lock().services.get(&id).cloned()) })
    }

    fn opening_hours(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OpeningHours>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock();
            let mut hours: Vec<OpeningHours> = inner.opening_hours.values().copied().collect();
            hours.sort_by_key(|h| h.weekday.num_days_from_monday());
            Ok(hours)
        })
    }
}
