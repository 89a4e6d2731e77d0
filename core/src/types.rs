//! Domain types for the Shearbook booking engine.
//!
//! This module contains the value objects and entities shared by every
//! component: identifiers, money, slot and booking statuses, the service
//! catalog entries, opening hours, time slots, bookings and reviews.
//!
//! Slot dates and times are naive shop-local wall time; audit timestamps
//! (`created_at`, `updated_at`) are UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ValidationError;

/// Length of one bookable slot. Every service duration is a multiple of this.
pub const SLOT_MINUTES: u32 = 15;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a service catalog entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(Uuid);

impl ServiceId {
    /// Creates a new random `ServiceId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ServiceId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a time slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(Uuid);

impl SlotId {
    /// Creates a new random `SlotId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SlotId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a customer.
///
/// Identity management is upstream; the engine only compares owners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(Uuid);

impl CustomerId {
    /// Creates a new random `CustomerId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `CustomerId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents a service price in euro cents
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole euros with overflow checking
    #[must_use]
    pub const fn checked_from_euros(euros: u64) -> Option<Self> {
        match euros.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\u{20ac}{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Statuses
// ============================================================================

/// Lifecycle status of a time slot.
///
/// Transitions tied to a booking are owned exclusively by the booking
/// lifecycle (claim, confirm, cancel, edit); `Expired` is set by the
/// housekeeping sweep for past slots that were never used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Free for claiming
    Available,
    /// Claimed by a pending booking
    Pending,
    /// Held by a confirmed (or completed) booking
    Booked,
    /// In the past, never used
    Expired,
}

impl SlotStatus {
    /// Database/wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Pending => "pending",
            Self::Booked => "booked",
            Self::Expired => "expired",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "pending" => Some(Self::Pending),
            "booked" => Some(Self::Booked),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a booking.
///
/// Bookings are never deleted; cancellation is a status, not removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Created by a customer, awaiting staff action
    Pending,
    /// Approved by staff; slots are booked
    Confirmed,
    /// Withdrawn by either party; slots released
    Cancelled,
    /// Past its end time; history
    Completed,
}

impl BookingStatus {
    /// Database/wire representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// True for the states that still hold slots (pending, confirmed)
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Slot status this booking's claim places its slots in
    #[must_use]
    pub const fn claimed_slot_status(&self) -> SlotStatus {
        match self {
            Self::Pending => SlotStatus::Pending,
            _ => SlotStatus::Booked,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Service catalog
// ============================================================================

/// A bookable service: name, duration and price.
///
/// Durations are whole multiples of [`SLOT_MINUTES`], enforced at
/// construction. Services are immutable once referenced by a booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Identifier
    pub id: ServiceId,
    /// Unique display name
    pub name: String,
    /// Total duration in minutes
    pub duration_minutes: u32,
    /// Price in cents
    pub price: Money,
}

impl Service {
    /// Creates a service, validating the duration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDuration`] if the duration is zero
    /// or not a multiple of 15 minutes.
    pub fn new(
        id: ServiceId,
        name: impl Into<String>,
        duration_minutes: u32,
        price: Money,
    ) -> Result<Self, ValidationError> {
        if duration_minutes == 0 || duration_minutes % SLOT_MINUTES != 0 {
            return Err(ValidationError::InvalidDuration(duration_minutes));
        }
        Ok(Self {
            id,
            name: name.into(),
            duration_minutes,
            price,
        })
    }

    /// Number of 15-minute slots a booking of this service must hold
    #[must_use]
    pub const fn slots_required(&self) -> u32 {
        self.duration_minutes / SLOT_MINUTES
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({}m)", self.name, self.price, self.duration_minutes)
    }
}

/// Opening hours for one weekday.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    /// Day of week this entry applies to (at most one entry per weekday)
    pub weekday: Weekday,
    /// Shop opens
    pub open_time: NaiveTime,
    /// Shop closes; strictly after `open_time`
    pub close_time: NaiveTime,
}

impl OpeningHours {
    /// Creates an entry, validating that closing is after opening.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidOpeningHours`] if
    /// `close_time <= open_time`.
    pub fn new(
        weekday: Weekday,
        open_time: NaiveTime,
        close_time: NaiveTime,
    ) -> Result<Self, ValidationError> {
        if close_time <= open_time {
            return Err(ValidationError::InvalidOpeningHours {
                weekday,
                open_time,
                close_time,
            });
        }
        Ok(Self {
            weekday,
            open_time,
            close_time,
        })
    }
}

// ============================================================================
// Time slots
// ============================================================================

/// A 15-minute bookable unit of shop time.
///
/// `(date, start_time, end_time)` is unique across the store; duration is
/// derived, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Identifier
    pub id: SlotId,
    /// Calendar date
    pub date: NaiveDate,
    /// Start of the window
    pub start_time: NaiveTime,
    /// End of the window; always `start_time + 15min`
    pub end_time: NaiveTime,
    /// Current lifecycle status
    pub status: SlotStatus,
}

impl TimeSlot {
    /// Duration of the window
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Start as a full timestamp
    #[must_use]
    pub const fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// End as a full timestamp
    #[must_use]
    pub const fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} - {} ({})",
            self.date, self.start_time, self.end_time, self.status
        )
    }
}

/// A slot about to be inserted by the calendar generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewSlot {
    /// Pre-generated identifier
    pub id: SlotId,
    /// Calendar date
    pub date: NaiveDate,
    /// Start of the window
    pub start_time: NaiveTime,
    /// End of the window
    pub end_time: NaiveTime,
}

impl NewSlot {
    /// Builds the 15-minute slot starting at `start`.
    ///
    /// Returns `None` if the window would cross midnight.
    #[must_use]
    pub fn quarter_hour(date: NaiveDate, start: NaiveTime) -> Option<Self> {
        let end = start.overflowing_add_signed(Duration::minutes(i64::from(SLOT_MINUTES)));
        // overflowing_add_signed wraps; a wrap means the window left the day
        if end.1 != 0 {
            return None;
        }
        Some(Self {
            id: SlotId::new(),
            date,
            start_time: start,
            end_time: end.0,
        })
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// A customer's appointment: one service, a contiguous run of slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Identifier
    pub id: BookingId,
    /// Owning customer
    pub customer: CustomerId,
    /// The booked service
    pub service_id: ServiceId,
    /// Current lifecycle status
    pub status: BookingStatus,
    /// When the booking row was created
    pub created_at: DateTime<Utc>,
    /// Last status or retarget change
    pub updated_at: DateTime<Utc>,
}

/// A booking together with its claimed slots, ordered by `(date, start_time)`.
///
/// The derived views (time range, date, end timestamp) are projections over
/// the slot run, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    /// The booking row
    pub booking: Booking,
    /// Referenced slots in chronological order
    pub slots: Vec<TimeSlot>,
}

impl BookingRecord {
    /// Overall `(earliest start, latest end)` of the slot run
    #[must_use]
    pub fn time_range(&self) -> Option<(NaiveTime, NaiveTime)> {
        let first = self.slots.first()?;
        let last = self.slots.last()?;
        Some((first.start_time, last.end_time))
    }

    /// Date of the earliest slot
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        self.slots.first().map(|s| s.date)
    }

    /// Timestamp at which the appointment ends
    #[must_use]
    pub fn ends_at(&self) -> Option<NaiveDateTime> {
        self.slots.iter().map(TimeSlot::ends_at).max()
    }
}

impl fmt::Display for BookingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.date(), self.time_range()) {
            (Some(date), Some((start, end))) => write!(
                f,
                "booking {} on {date} {start} - {end} ({})",
                self.booking.id, self.booking.status
            ),
            _ => write!(f, "booking {} (no slots)", self.booking.id),
        }
    }
}

// ============================================================================
// Reviews
// ============================================================================

/// A star rating, 1 through 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rating(u8);

impl Rating {
    /// Creates a rating.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::RatingOutOfRange`] unless `1 <= value <= 5`.
    pub const fn new(value: u8) -> Result<Self, ValidationError> {
        if matches!(value, 1..=5) {
            Ok(Self(value))
        } else {
            Err(ValidationError::RatingOutOfRange(value))
        }
    }

    /// The numeric value
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

/// A customer's review of a completed booking. One per booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// The reviewed booking
    pub booking_id: BookingId,
    /// Reviewing customer (the booking's owner)
    pub customer: CustomerId,
    /// Star rating
    pub rating: Rating,
    /// Optional free-form comment
    pub comment: Option<String>,
    /// When the review was left
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn service_duration_must_be_quarter_hours() {
        let price = Money::from_cents(1500);
        assert!(Service::new(ServiceId::new(), "Cut", 45, price).is_ok());
        assert!(Service::new(ServiceId::new(), "Cut", 40, price).is_err());
        assert!(Service::new(ServiceId::new(), "Cut", 0, price).is_err());
    }

    #[test]
    fn slots_required_divides_duration() {
        let service =
            Service::new(ServiceId::new(), "Beard trim", 45, Money::from_cents(1000)).unwrap();
        assert_eq!(service.slots_required(), 3);
    }

    #[test]
    fn opening_hours_reject_inverted_times() {
        assert!(OpeningHours::new(Weekday::Mon, t(9, 0), t(17, 0)).is_ok());
        assert!(OpeningHours::new(Weekday::Mon, t(17, 0), t(9, 0)).is_err());
        assert!(OpeningHours::new(Weekday::Mon, t(9, 0), t(9, 0)).is_err());
    }

    #[test]
    fn quarter_hour_slot_spans_fifteen_minutes() {
        let slot = NewSlot::quarter_hour(d(2025, 3, 3), t(9, 15)).unwrap();
        assert_eq!(slot.end_time, t(9, 30));
    }

    #[test]
    fn quarter_hour_slot_cannot_cross_midnight() {
        assert!(NewSlot::quarter_hour(d(2025, 3, 3), t(23, 50)).is_none());
    }

    #[test]
    fn booking_record_projections() {
        let date = d(2025, 3, 3);
        let slots: Vec<TimeSlot> = [t(9, 15), t(9, 30)]
            .into_iter()
            .map(|start| TimeSlot {
                id: SlotId::new(),
                date,
                start_time: start,
                end_time: start + Duration::minutes(15),
                status: SlotStatus::Pending,
            })
            .collect();
        let record = BookingRecord {
            booking: Booking {
                id: BookingId::new(),
                customer: CustomerId::new(),
                service_id: ServiceId::new(),
                status: BookingStatus::Pending,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            slots,
        };
        assert_eq!(record.time_range(), Some((t(9, 15), t(9, 45))));
        assert_eq!(record.date(), Some(date));
        assert_eq!(record.ends_at(), Some(date.and_time(t(9, 45))));
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(1).is_ok());
        assert!(Rating::new(5).is_ok());
        assert!(Rating::new(6).is_err());
    }

    #[test]
    fn statuses_round_trip_their_db_representation() {
        for status in [
            SlotStatus::Available,
            SlotStatus::Pending,
            SlotStatus::Booked,
            SlotStatus::Expired,
        ] {
            assert_eq!(SlotStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SlotStatus::parse("held"), None);
    }
}
