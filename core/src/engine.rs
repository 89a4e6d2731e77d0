//! The booking lifecycle engine.
//!
//! `BookingEngine` is the single entry point the presentation layer calls:
//! booking creation, edit, confirmation, decline, cancellation, the
//! availability view, and the scheduled passes (slot generation, completion
//! sweep, slot expiry, integrity audit).
//!
//! The engine owns the state machine and all pre-commit validation; the
//! store underneath owns atomicity. Nothing here retries: a lost race
//! surfaces as [`BookingError::SlotConflict`] and the caller re-queries and
//! resubmits.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{IntegrityAuditor, IntegrityReport};
use crate::availability;
use crate::calendar;
use crate::environment::Clock;
use crate::error::{BookingError, ValidationError};
use crate::store::Store;
use crate::types::{
    BookingId, BookingRecord, BookingStatus, CustomerId, Rating, Review, Service, ServiceId,
    SlotId, SlotStatus,
};
use crate::validation;

/// Raw booking input as the presentation layer collects it.
///
/// Dates and times arrive as strings (`YYYY-MM-DD`, `HH:MM`); the engine
/// parses and validates them so form handling stays out of the callers.
#[derive(Clone, Debug)]
pub struct BookingRequest {
    /// The acting customer (already authenticated upstream)
    pub customer: CustomerId,
    /// Service id as submitted
    pub service_id: String,
    /// Requested date, `YYYY-MM-DD`
    pub date: String,
    /// Requested start time, `HH:MM`
    pub start_time: String,
}

/// Outcome of one booking inside a bulk staff action.
#[derive(Debug)]
pub struct BulkOutcome {
    /// The booking acted on
    pub booking_id: BookingId,
    /// Its individual result; one failure never aborts the rest
    pub outcome: Result<(), BookingError>,
}

/// The slot-allocation and booking-lifecycle engine.
#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl BookingEngine {
    /// Creates an engine over a store and a clock.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn now_naive(&self) -> NaiveDateTime {
        self.clock.now().naive_utc()
    }

    /// Parse and validate the raw request fields.
    ///
    /// All-fields-required first, then format, then the past check against
    /// the injected clock.
    fn parse_request(
        &self,
        request: &BookingRequest,
    ) -> Result<(ServiceId, NaiveDate, NaiveTime), BookingError> {
        if request.service_id.trim().is_empty() {
            return Err(BookingError::MissingField("service_id"));
        }
        if request.date.trim().is_empty() {
            return Err(BookingError::MissingField("date"));
        }
        if request.start_time.trim().is_empty() {
            return Err(BookingError::MissingField("start_time"));
        }

        let service_id = Uuid::parse_str(request.service_id.trim())
            .map(ServiceId::from_uuid)
            .map_err(|_| BookingError::InvalidService(request.service_id.clone()))?;

        let date = NaiveDate::parse_from_str(request.date.trim(), "%Y-%m-%d")
            .map_err(|_| BookingError::InvalidDate(request.date.clone()))?;

        let raw_time = request.start_time.trim();
        let start_time = NaiveTime::parse_from_str(raw_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw_time, "%H:%M:%S"))
            .map_err(|_| BookingError::InvalidTime(request.start_time.clone()))?;

        if date.and_time(start_time) < self.now_naive() {
            return Err(BookingError::PastDate);
        }

        Ok((service_id, date, start_time))
    }

    async fn resolve_service(&self, id: ServiceId, raw: &str) -> Result<Service, BookingError> {
        self.store
            .service(id)
            .await?
            .ok_or_else(|| BookingError::InvalidService(raw.to_string()))
    }

    async fn load_booking(&self, id: BookingId) -> Result<BookingRecord, BookingError> {
        self.store
            .booking(id)
            .await?
            .ok_or(BookingError::NotFound(id))
    }

    /// Create a pending booking: find the contiguous run for the service
    /// duration, validate it, and claim it atomically with the booking row.
    ///
    /// # Errors
    ///
    /// Input errors (`MissingField`, `InvalidDate`, `PastDate`,
    /// `InvalidTime`, `InvalidService`), `Validation` for a malformed run,
    /// `SlotConflict` when the run is unavailable or lost to a race.
    #[tracing::instrument(skip(self, request), fields(customer = %request.customer))]
    pub async fn create_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingRecord, BookingError> {
        let (service_id, date, start_time) = self.parse_request(request)?;
        let service = self.resolve_service(service_id, &request.service_id).await?;

        let run = availability::find_contiguous_run(
            self.store.as_ref(),
            date,
            start_time,
            service.slots_required(),
        )
        .await?
        .ok_or(BookingError::SlotConflict)?;

        validation::validate_claim(&run, &service)?;

        let slot_ids: Vec<SlotId> = run.iter().map(|s| s.id).collect();
        let record = self
            .store
            .create_booking(request.customer, service.id, slot_ids, self.clock.now())
            .await?;

        info!(booking = %record.booking.id, %date, %start_time, "booking created");
        Ok(record)
    }

    /// Re-target an existing pending or confirmed booking to a new service
    /// and time: release-old, re-validate-new, claim-new as one transaction.
    /// On failure the booking is unchanged.
    ///
    /// # Errors
    ///
    /// Same set as [`Self::create_booking`], plus `NotFound` / `NotOwner`
    /// and `Validation` when the booking is no longer editable.
    #[tracing::instrument(skip(self, request), fields(booking = %id))]
    pub async fn edit_booking(
        &self,
        id: BookingId,
        request: &BookingRequest,
    ) -> Result<BookingRecord, BookingError> {
        let record = self.load_booking(id).await?;
        if record.booking.customer != request.customer {
            return Err(BookingError::NotOwner);
        }
        if !record.booking.status.is_active() {
            return Err(ValidationError::InvalidTransition {
                id,
                status: record.booking.status,
                required: "pending or confirmed",
            }
            .into());
        }

        let (service_id, date, start_time) = self.parse_request(request)?;
        let service = self.resolve_service(service_id, &request.service_id).await?;

        // The new run may overlap the booking's own slots, so resolve
        // without a status requirement; ownership decides claimability.
        let run = availability::resolve_run(
            self.store.as_ref(),
            date,
            start_time,
            service.slots_required(),
        )
        .await?
        .ok_or(BookingError::SlotConflict)?;

        validation::validate_run_shape(&run, &service)?;
        let owned: Vec<SlotId> = record.slots.iter().map(|s| s.id).collect();
        if run
            .iter()
            .any(|s| s.status != SlotStatus::Available && !owned.contains(&s.id))
        {
            return Err(BookingError::SlotConflict);
        }

        let slot_ids: Vec<SlotId> = run.iter().map(|s| s.id).collect();
        let updated = self
            .store
            .retarget_booking(id, service.id, slot_ids, self.clock.now())
            .await?;

        info!(booking = %id, %date, %start_time, "booking re-targeted");
        Ok(updated)
    }

    /// Staff confirmation: pending booking only; slots re-validated and
    /// flipped to `booked`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation` on a non-pending booking or broken run,
    /// `SlotConflict` if a slot left the claimable states.
    #[tracing::instrument(skip(self), fields(booking = %id))]
    pub async fn confirm_booking(&self, id: BookingId) -> Result<BookingRecord, BookingError> {
        let record = self.load_booking(id).await?;
        if record.booking.status != BookingStatus::Pending {
            return Err(ValidationError::InvalidTransition {
                id,
                status: record.booking.status,
                required: "pending",
            }
            .into());
        }

        let service = self
            .resolve_service(record.booking.service_id, "booked service")
            .await?;
        validation::validate_run_shape(&record.slots, &service)?;
        validation::validate_statuses(
            &record.slots,
            &[SlotStatus::Available, SlotStatus::Pending],
        )?;

        let updated = self.store.confirm_booking(id, self.clock.now()).await?;
        info!(booking = %id, "booking confirmed");
        Ok(updated)
    }

    /// Staff decline: releases every slot back to `available`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation` when already cancelled or completed.
    #[tracing::instrument(skip(self), fields(booking = %id))]
    pub async fn decline_booking(&self, id: BookingId) -> Result<BookingRecord, BookingError> {
        // Same transition as a customer cancel, minus the ownership check.
        let record = self.load_booking(id).await?;
        if !record.booking.status.is_active() {
            return Err(ValidationError::InvalidTransition {
                id,
                status: record.booking.status,
                required: "pending or confirmed",
            }
            .into());
        }
        let updated = self.store.cancel_booking(id, self.clock.now()).await?;
        info!(booking = %id, "booking declined");
        Ok(updated)
    }

    /// Customer cancellation: owner only; releases every slot back to
    /// `available` regardless of prior state.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `Validation` when already cancelled or
    /// completed.
    #[tracing::instrument(skip(self), fields(booking = %id))]
    pub async fn cancel_booking(
        &self,
        id: BookingId,
        customer: CustomerId,
    ) -> Result<BookingRecord, BookingError> {
        let record = self.load_booking(id).await?;
        if record.booking.customer != customer {
            return Err(BookingError::NotOwner);
        }
        if !record.booking.status.is_active() {
            return Err(ValidationError::InvalidTransition {
                id,
                status: record.booking.status,
                required: "pending or confirmed",
            }
            .into());
        }
        let updated = self.store.cancel_booking(id, self.clock.now()).await?;
        info!(booking = %id, "booking cancelled");
        Ok(updated)
    }

    /// Bulk staff confirmation with independent failure isolation: one
    /// booking's failure never aborts the others.
    pub async fn confirm_many(&self, ids: &[BookingId]) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            outcomes.push(BulkOutcome {
                booking_id: id,
                outcome: self.confirm_booking(id).await.map(|_| ()),
            });
        }
        outcomes
    }

    /// Bulk staff decline with independent failure isolation.
    pub async fn decline_many(&self, ids: &[BookingId]) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            outcomes.push(BulkOutcome {
                booking_id: id,
                outcome: self.decline_booking(id).await.map(|_| ()),
            });
        }
        outcomes
    }

    /// The browse view: available start times per date from `from` onward.
    ///
    /// # Errors
    ///
    /// `Storage` on a failed read.
    pub async fn list_availability(
        &self,
        from: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Vec<NaiveTime>>, BookingError> {
        Ok(availability::availability_by_date(self.store.as_ref(), from).await?)
    }

    /// Load a booking for display.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Storage`.
    pub async fn booking(&self, id: BookingId) -> Result<BookingRecord, BookingError> {
        self.load_booking(id).await
    }

    /// Time-triggered completion: check the first `batch_limit` confirmed
    /// bookings and complete those whose appointment end has passed.
    /// Idempotent; a completed booking is never reprocessed.
    ///
    /// # Errors
    ///
    /// `Storage` on a failed read or update.
    #[tracing::instrument(skip(self))]
    pub async fn run_completion_sweep(&self, batch_limit: u32) -> Result<u64, BookingError> {
        let now = self.now_naive();
        let candidates = self.store.confirmed_bookings(batch_limit).await?;
        let ended: Vec<BookingId> = candidates
            .iter()
            .filter(|record| record.ends_at().is_some_and(|end| end < now))
            .map(|record| record.booking.id)
            .collect();

        if ended.is_empty() {
            return Ok(0);
        }
        let updated = self
            .store
            .complete_bookings(ended, self.clock.now())
            .await?;
        info!(updated, "completion sweep");
        Ok(updated)
    }

    /// Housekeeping: expire past, never-used slots, at most `batch_limit`
    /// per call.
    ///
    /// # Errors
    ///
    /// `Storage` on a failed update.
    #[tracing::instrument(skip(self))]
    pub async fn expire_past_slots(&self, batch_limit: u32) -> Result<u64, BookingError> {
        let expired = self
            .store
            .expire_slots_before(self.now_naive(), batch_limit)
            .await?;
        if expired > 0 {
            info!(expired, "expired past slots");
        }
        Ok(expired)
    }

    /// Expand opening hours into concrete slots for the rolling horizon.
    /// Idempotent: already-present windows are skipped.
    ///
    /// # Errors
    ///
    /// `Storage` on a failed read or insert.
    #[tracing::instrument(skip(self))]
    pub async fn generate_slots(&self, horizon_days: u32) -> Result<u64, BookingError> {
        let today = self.clock.now().date_naive();
        let hours = self.store.opening_hours().await?;
        let (slots, skipped) = calendar::horizon_slots(today, horizon_days, &hours);
        for date in &skipped {
            debug!(%date, "no opening hours, skipping day");
        }
        let created = self.store.insert_slots(slots).await?;
        info!(created, horizon_days, "slot generation finished");
        Ok(created)
    }

    /// Run the read-only integrity audit.
    ///
    /// # Errors
    ///
    /// `Storage` on a failed audit query.
    pub async fn audit_integrity(&self) -> Result<IntegrityReport, BookingError> {
        let auditor = IntegrityAuditor::new(Arc::clone(&self.store));
        Ok(auditor.run().await?)
    }

    /// Leave a review on a completed booking. Owner only, one per booking.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotOwner`, `Validation` for a non-completed booking,
    /// an out-of-range rating or a duplicate review.
    pub async fn add_review(
        &self,
        booking_id: BookingId,
        customer: CustomerId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review, BookingError> {
        let record = self.load_booking(booking_id).await?;
        if record.booking.customer != customer {
            return Err(BookingError::NotOwner);
        }
        if record.booking.status != BookingStatus::Completed {
            return Err(ValidationError::InvalidTransition {
                id: booking_id,
                status: record.booking.status,
                required: "completed",
            }
            .into());
        }

        let review = Review {
            booking_id,
            customer,
            rating: Rating::new(rating)?,
            comment,
            created_at: self.clock.now(),
        };
        self.store.insert_review(review.clone()).await?;
        info!(booking = %booking_id, rating, "review added");
        Ok(review)
    }
}
