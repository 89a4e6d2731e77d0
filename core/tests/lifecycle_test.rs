//! Booking lifecycle tests against the in-memory store.
//!
//! Covers the full state machine (create, confirm, decline, cancel, edit,
//! time-based completion), input validation, the availability view, slot
//! expiry, reviews and the integrity audit, all under a simulated clock.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use std::sync::Arc;

use shearbook_core::engine::{BookingEngine, BookingRequest};
use shearbook_core::error::{BookingError, ValidationError};
use shearbook_core::types::{
    BookingStatus, CustomerId, Money, OpeningHours, Service, ServiceId, SlotStatus,
};
use shearbook_testing::{mocks::FixedClock, MemoryStore};

/// Sunday noon; the generated horizon covers Monday 2025-03-03.
fn sunday_noon() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-02T12:00:00Z")
        .expect("hardcoded timestamp should always parse")
        .with_timezone(&Utc)
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date")
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

struct Fixture {
    engine: BookingEngine,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    haircut: Service,      // 30 minutes
    full_service: Service, // 45 minutes
}

/// Shop open Monday 09:00-10:00, slots generated two days out from Sunday.
async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(sunday_noon()));

    let haircut = Service::new(ServiceId::new(), "Haircut", 30, Money::from_cents(2500))
        .expect("valid service");
    let full_service = Service::new(
        ServiceId::new(),
        "Cut & beard",
        45,
        Money::from_cents(4000),
    )
    .expect("valid service");
    store.add_service(haircut.clone());
    store.add_service(full_service.clone());
    store.add_opening_hours(
        OpeningHours::new(Weekday::Mon, t(9, 0), t(10, 0)).expect("valid hours"),
    );

    let engine = BookingEngine::new(store.clone(), clock.clone());
    engine.generate_slots(2).await.expect("generation succeeds");

    Fixture {
        engine,
        store,
        clock,
        haircut,
        full_service,
    }
}

fn request(customer: CustomerId, service: &Service, start: &str) -> BookingRequest {
    BookingRequest {
        customer,
        service_id: service.id.to_string(),
        date: "2025-03-03".to_string(),
        start_time: start.to_string(),
    }
}

// ============================================================================
// Calendar generation
// ============================================================================

#[tokio::test]
async fn one_open_hour_generates_exactly_four_slots() {
    let fx = fixture().await;
    let slots = fx.store.slots_on(monday());
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
    assert!(slots.iter().all(|s| s.status == SlotStatus::Available));
}

#[tokio::test]
async fn regeneration_creates_nothing_new() {
    let fx = fixture().await;
    let second_run = fx.engine.generate_slots(2).await.unwrap();
    assert_eq!(second_run, 0);
    assert_eq!(fx.store.slots_on(monday()).len(), 4);
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn thirty_minute_booking_claims_two_pending_slots() {
    let fx = fixture().await;
    let customer = CustomerId::new();

    let record = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:15"))
        .await
        .unwrap();

    assert_eq!(record.booking.status, BookingStatus::Pending);
    let windows: Vec<(NaiveTime, NaiveTime)> = record
        .slots
        .iter()
        .map(|s| (s.start_time, s.end_time))
        .collect();
    assert_eq!(windows, vec![(t(9, 15), t(9, 30)), (t(9, 30), t(9, 45))]);
    assert!(record.slots.iter().all(|s| s.status == SlotStatus::Pending));
    assert_eq!(record.time_range(), Some((t(9, 15), t(9, 45))));
    assert_eq!(record.date(), Some(monday()));
}

#[tokio::test]
async fn forty_five_minute_booking_holds_a_three_slot_chain() {
    let fx = fixture().await;

    let record = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.full_service, "09:00"))
        .await
        .unwrap();

    assert_eq!(record.slots.len(), 3);
    for pair in record.slots.windows(2) {
        assert_eq!(pair[0].date, pair[1].date);
        assert_eq!(pair[0].end_time, pair[1].start_time);
    }
}

#[tokio::test]
async fn run_past_closing_is_a_conflict() {
    let fx = fixture().await;
    // 09:45 + 30min needs a 10:00-10:15 slot that was never generated
    let err = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:45"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotConflict));
}

#[tokio::test]
async fn input_validation_rejects_bad_fields() {
    let fx = fixture().await;
    let customer = CustomerId::new();

    let mut missing = request(customer, &fx.haircut, "09:15");
    missing.date = String::new();
    assert!(matches!(
        fx.engine.create_booking(&missing).await.unwrap_err(),
        BookingError::MissingField("date")
    ));

    let mut bad_date = request(customer, &fx.haircut, "09:15");
    bad_date.date = "03/03/2025".to_string();
    assert!(matches!(
        fx.engine.create_booking(&bad_date).await.unwrap_err(),
        BookingError::InvalidDate(_)
    ));

    let mut bad_time = request(customer, &fx.haircut, "quarter past nine");
    bad_time.start_time = "quarter past nine".to_string();
    assert!(matches!(
        fx.engine.create_booking(&bad_time).await.unwrap_err(),
        BookingError::InvalidTime(_)
    ));

    let mut past = request(customer, &fx.haircut, "09:15");
    past.date = "2025-02-28".to_string();
    assert!(matches!(
        fx.engine.create_booking(&past).await.unwrap_err(),
        BookingError::PastDate
    ));

    let mut unknown = request(customer, &fx.haircut, "09:15");
    unknown.service_id = ServiceId::new().to_string();
    assert!(matches!(
        fx.engine.create_booking(&unknown).await.unwrap_err(),
        BookingError::InvalidService(_)
    ));

    let mut malformed = request(customer, &fx.haircut, "09:15");
    malformed.service_id = "not-a-uuid".to_string();
    assert!(matches!(
        fx.engine.create_booking(&malformed).await.unwrap_err(),
        BookingError::InvalidService(_)
    ));
}

#[tokio::test]
async fn same_day_past_start_is_rejected() {
    let fx = fixture().await;
    // Monday 09:30, asking for 09:15 that morning
    fx.clock.set(
        DateTime::parse_from_rfc3339("2025-03-03T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc),
    );
    let err = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:15"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::PastDate));
}

// ============================================================================
// Confirm / decline / cancel
// ============================================================================

#[tokio::test]
async fn confirm_books_the_slots_and_blocks_reuse() {
    let fx = fixture().await;
    let record = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:15"))
        .await
        .unwrap();

    let confirmed = fx.engine.confirm_booking(record.booking.id).await.unwrap();
    assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);
    assert!(confirmed
        .slots
        .iter()
        .all(|s| s.status == SlotStatus::Booked));

    // the window is gone for everyone else
    let err = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:15"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotConflict));
}

#[tokio::test]
async fn confirm_requires_a_pending_booking() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    let record = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:15"))
        .await
        .unwrap();
    fx.engine
        .cancel_booking(record.booking.id, customer)
        .await
        .unwrap();

    let err = fx
        .engine
        .confirm_booking(record.booking.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Validation(ValidationError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn cancel_releases_slots_from_pending_and_confirmed() {
    let fx = fixture().await;
    let customer = CustomerId::new();

    // pending
    let pending = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:00"))
        .await
        .unwrap();
    fx.engine
        .cancel_booking(pending.booking.id, customer)
        .await
        .unwrap();
    for slot in &pending.slots {
        assert_eq!(fx.store.slot(slot.id).unwrap().status, SlotStatus::Available);
    }

    // confirmed
    let confirmed = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:00"))
        .await
        .unwrap();
    fx.engine.confirm_booking(confirmed.booking.id).await.unwrap();
    let cancelled = fx
        .engine
        .cancel_booking(confirmed.booking.id, customer)
        .await
        .unwrap();
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    for slot in &confirmed.slots {
        assert_eq!(fx.store.slot(slot.id).unwrap().status, SlotStatus::Available);
    }
}

#[tokio::test]
async fn cancel_by_a_stranger_is_refused() {
    let fx = fixture().await;
    let owner = CustomerId::new();
    let record = fx
        .engine
        .create_booking(&request(owner, &fx.haircut, "09:15"))
        .await
        .unwrap();

    let err = fx
        .engine
        .cancel_booking(record.booking.id, CustomerId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotOwner));
    // untouched
    assert_eq!(
        fx.engine.booking(record.booking.id).await.unwrap().booking.status,
        BookingStatus::Pending
    );
}

#[tokio::test]
async fn decline_needs_no_owner_and_releases_slots() {
    let fx = fixture().await;
    let record = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:15"))
        .await
        .unwrap();

    let declined = fx.engine.decline_booking(record.booking.id).await.unwrap();
    assert_eq!(declined.booking.status, BookingStatus::Cancelled);
    for slot in &record.slots {
        assert_eq!(fx.store.slot(slot.id).unwrap().status, SlotStatus::Available);
    }
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let fx = fixture().await;
    let ghost = shearbook_core::types::BookingId::new();
    assert!(matches!(
        fx.engine.confirm_booking(ghost).await.unwrap_err(),
        BookingError::NotFound(_)
    ));
    assert!(matches!(
        fx.engine
            .cancel_booking(ghost, CustomerId::new())
            .await
            .unwrap_err(),
        BookingError::NotFound(_)
    ));
}

// ============================================================================
// Edit
// ============================================================================

#[tokio::test]
async fn edit_can_shift_into_its_own_slots() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    let record = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:00"))
        .await
        .unwrap();

    // 09:00-09:30 -> 09:15-09:45 overlaps the booking's own 09:15 slot
    let updated = fx
        .engine
        .edit_booking(record.booking.id, &request(customer, &fx.haircut, "09:15"))
        .await
        .unwrap();

    assert_eq!(updated.time_range(), Some((t(9, 15), t(9, 45))));
    assert!(updated.slots.iter().all(|s| s.status == SlotStatus::Pending));
    // the vacated 09:00 slot is free again
    let slots = fx.store.slots_on(monday());
    assert_eq!(slots[0].status, SlotStatus::Available);
}

#[tokio::test]
async fn failed_edit_leaves_the_booking_unchanged() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    let record = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:00"))
        .await
        .unwrap();
    // another booking occupies 09:30-10:00
    fx.engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:30"))
        .await
        .unwrap();

    let err = fx
        .engine
        .edit_booking(record.booking.id, &request(customer, &fx.haircut, "09:30"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotConflict));

    let unchanged = fx.engine.booking(record.booking.id).await.unwrap();
    assert_eq!(unchanged.time_range(), Some((t(9, 0), t(9, 30))));
    assert!(unchanged
        .slots
        .iter()
        .all(|s| s.status == SlotStatus::Pending));
}

#[tokio::test]
async fn edit_of_a_confirmed_booking_keeps_slots_booked() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    let record = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:00"))
        .await
        .unwrap();
    fx.engine.confirm_booking(record.booking.id).await.unwrap();

    let updated = fx
        .engine
        .edit_booking(record.booking.id, &request(customer, &fx.haircut, "09:30"))
        .await
        .unwrap();

    assert_eq!(updated.booking.status, BookingStatus::Confirmed);
    assert!(updated.slots.iter().all(|s| s.status == SlotStatus::Booked));
    assert_eq!(updated.time_range(), Some((t(9, 30), t(10, 0))));
}

#[tokio::test]
async fn edit_can_change_the_service() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    let record = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:00"))
        .await
        .unwrap();

    let updated = fx
        .engine
        .edit_booking(
            record.booking.id,
            &request(customer, &fx.full_service, "09:00"),
        )
        .await
        .unwrap();

    assert_eq!(updated.booking.service_id, fx.full_service.id);
    assert_eq!(updated.slots.len(), 3);
}

// ============================================================================
// Bulk staff actions
// ============================================================================

#[tokio::test]
async fn bulk_confirm_isolates_failures() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    let good = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:00"))
        .await
        .unwrap();
    let cancelled = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:30"))
        .await
        .unwrap();
    fx.engine
        .cancel_booking(cancelled.booking.id, customer)
        .await
        .unwrap();

    let outcomes = fx
        .engine
        .confirm_many(&[cancelled.booking.id, good.booking.id])
        .await;

    assert!(outcomes[0].outcome.is_err());
    assert!(outcomes[1].outcome.is_ok());
    assert_eq!(
        fx.engine.booking(good.booking.id).await.unwrap().booking.status,
        BookingStatus::Confirmed
    );
}

// ============================================================================
// Availability view
// ============================================================================

#[tokio::test]
async fn availability_lists_free_starts_per_date() {
    let fx = fixture().await;
    fx.engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:15"))
        .await
        .unwrap();

    let map = fx.engine.list_availability(monday()).await.unwrap();
    assert_eq!(map.get(&monday()), Some(&vec![t(9, 0), t(9, 45)]));
}

// ============================================================================
// Time-based housekeeping
// ============================================================================

#[tokio::test]
async fn completion_sweep_completes_ended_bookings_once() {
    let fx = fixture().await;
    let record = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:15"))
        .await
        .unwrap();
    fx.engine.confirm_booking(record.booking.id).await.unwrap();

    // nothing ends before the appointment does
    assert_eq!(fx.engine.run_completion_sweep(10).await.unwrap(), 0);

    // Tuesday: the Monday 09:45 end has passed
    fx.clock.advance(Duration::days(2));
    assert_eq!(fx.engine.run_completion_sweep(10).await.unwrap(), 1);

    let completed = fx.engine.booking(record.booking.id).await.unwrap();
    assert_eq!(completed.booking.status, BookingStatus::Completed);
    // slots remain booked history
    assert!(completed.slots.iter().all(|s| s.status == SlotStatus::Booked));

    // idempotent: nothing left to complete
    assert_eq!(fx.engine.run_completion_sweep(10).await.unwrap(), 0);
}

#[tokio::test]
async fn completion_sweep_respects_the_batch_limit() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    for start in ["09:00", "09:30"] {
        let record = fx
            .engine
            .create_booking(&request(customer, &fx.haircut, start))
            .await
            .unwrap();
        fx.engine.confirm_booking(record.booking.id).await.unwrap();
    }

    fx.clock.advance(Duration::days(2));
    assert_eq!(fx.engine.run_completion_sweep(1).await.unwrap(), 1);
    assert_eq!(fx.engine.run_completion_sweep(10).await.unwrap(), 1);
}

#[tokio::test]
async fn expiry_marks_past_unused_slots_only() {
    let fx = fixture().await;
    let record = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:00"))
        .await
        .unwrap();
    fx.engine.confirm_booking(record.booking.id).await.unwrap();

    fx.clock.advance(Duration::days(2));
    // two booked, two available on Monday; only the available pair expires
    assert_eq!(fx.engine.expire_past_slots(100).await.unwrap(), 2);

    let slots = fx.store.slots_on(monday());
    let statuses: Vec<SlotStatus> = slots.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            SlotStatus::Booked,
            SlotStatus::Booked,
            SlotStatus::Expired,
            SlotStatus::Expired,
        ]
    );

    // re-running finds nothing
    assert_eq!(fx.engine.expire_past_slots(100).await.unwrap(), 0);
}

// ============================================================================
// Reviews
// ============================================================================

#[tokio::test]
async fn review_requires_a_completed_booking_and_its_owner() {
    let fx = fixture().await;
    let customer = CustomerId::new();
    let record = fx
        .engine
        .create_booking(&request(customer, &fx.haircut, "09:15"))
        .await
        .unwrap();
    let id = record.booking.id;

    // not completed yet
    assert!(matches!(
        fx.engine.add_review(id, customer, 5, None).await.unwrap_err(),
        BookingError::Validation(ValidationError::InvalidTransition { .. })
    ));

    fx.engine.confirm_booking(id).await.unwrap();
    fx.clock.advance(Duration::days(2));
    fx.engine.run_completion_sweep(10).await.unwrap();

    // wrong customer
    assert!(matches!(
        fx.engine
            .add_review(id, CustomerId::new(), 5, None)
            .await
            .unwrap_err(),
        BookingError::NotOwner
    ));

    // rating bounds
    assert!(matches!(
        fx.engine.add_review(id, customer, 0, None).await.unwrap_err(),
        BookingError::Validation(ValidationError::RatingOutOfRange(0))
    ));

    let review = fx
        .engine
        .add_review(id, customer, 4, Some("sharp fade".to_string()))
        .await
        .unwrap();
    assert_eq!(review.rating.value(), 4);
    assert_eq!(fx.store.review(id).unwrap().rating.value(), 4);

    // one review per booking
    assert!(matches!(
        fx.engine.add_review(id, customer, 5, None).await.unwrap_err(),
        BookingError::Validation(ValidationError::DuplicateReview(_))
    ));
}

// ============================================================================
// Integrity audit
// ============================================================================

#[tokio::test]
async fn audit_is_clean_on_a_healthy_store() {
    let fx = fixture().await;
    fx.engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:00"))
        .await
        .unwrap();
    let report = fx.engine.audit_integrity().await.unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn audit_reports_duplicates_and_count_mismatches() {
    let fx = fixture().await;
    let record = fx
        .engine
        .create_booking(&request(CustomerId::new(), &fx.haircut, "09:00"))
        .await
        .unwrap();

    // fabricate a duplicate of the 09:00 slot and drop one slot reference
    let first = fx.store.slots_on(monday())[0];
    fx.store.insert_slot_unchecked(shearbook_core::types::TimeSlot {
        id: shearbook_core::types::SlotId::new(),
        ..first
    });
    fx.store.truncate_booking_slots(record.booking.id, 1);

    let report = fx.engine.audit_integrity().await.unwrap();
    assert_eq!(report.duplicate_slots.len(), 1);
    assert_eq!(report.duplicate_slots[0].count, 2);
    assert_eq!(report.slot_count_mismatches.len(), 1);
    assert_eq!(report.slot_count_mismatches[0].actual, 1);
    assert_eq!(report.slot_count_mismatches[0].expected, 2);
}
