//! The store handle: pool management, schema and shared row mapping.

use chrono::{NaiveDate, NaiveTime, Weekday};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

use shearbook_core::store::StoreError;
use shearbook_core::types::{
    Booking, BookingId, BookingStatus, CustomerId, Money, OpeningHours, Service, ServiceId,
    SlotId, SlotStatus, TimeSlot,
};

/// PostgreSQL-backed implementation of the Shearbook storage contracts.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect with pool defaults suitable for a small service.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] when the pool cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    ///
    /// Useful for health checks or manual queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema if it does not exist yet.
    ///
    /// Safe to run on every startup; every statement is `IF NOT EXISTS`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] when a statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Insert or update a service catalog entry, keyed on the unique name.
    ///
    /// Operator/seed surface; the engine itself only reads the catalog.
    /// A re-run refreshes duration and price but keeps the original id, so
    /// existing bookings stay attached to their service.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a failed write.
    pub async fn upsert_service(&self, service: &Service) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO services (id, name, duration_minutes, price_cents)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO UPDATE
             SET duration_minutes = EXCLUDED.duration_minutes,
                 price_cents = EXCLUDED.price_cents",
        )
        .bind(service.id.as_uuid())
        .bind(&service.name)
        .bind(i32::try_from(service.duration_minutes).unwrap_or(i32::MAX))
        .bind(i64::try_from(service.price.cents()).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Insert or replace one weekday's opening hours.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on a failed write.
    pub async fn upsert_opening_hours(&self, hours: &OpeningHours) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO opening_hours (weekday, open_time, close_time)
             VALUES ($1, $2, $3)
             ON CONFLICT (weekday) DO UPDATE
             SET open_time = EXCLUDED.open_time,
                 close_time = EXCLUDED.close_time",
        )
        .bind(weekday_to_db(hours.weekday))
        .bind(hours.open_time)
        .bind(hours.close_time)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

/// Schema statements, applied in order. Weekday numbering follows
/// `Weekday::num_days_from_monday` (0 = Monday .. 6 = Sunday).
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS services (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        duration_minutes INTEGER NOT NULL
            CHECK (duration_minutes > 0 AND duration_minutes % 15 = 0),
        price_cents BIGINT NOT NULL CHECK (price_cents >= 0)
    )",
    "CREATE TABLE IF NOT EXISTS opening_hours (
        weekday SMALLINT PRIMARY KEY CHECK (weekday BETWEEN 0 AND 6),
        open_time TIME NOT NULL,
        close_time TIME NOT NULL,
        CHECK (close_time > open_time)
    )",
    "CREATE TABLE IF NOT EXISTS time_slots (
        id UUID PRIMARY KEY,
        date DATE NOT NULL,
        start_time TIME NOT NULL,
        end_time TIME NOT NULL,
        status TEXT NOT NULL DEFAULT 'available'
            CHECK (status IN ('available', 'pending', 'booked', 'expired')),
        CHECK (end_time > start_time),
        UNIQUE (date, start_time, end_time)
    )",
    "CREATE INDEX IF NOT EXISTS idx_time_slots_date_start
        ON time_slots (date, start_time)",
    "CREATE INDEX IF NOT EXISTS idx_time_slots_status
        ON time_slots (status)",
    "CREATE TABLE IF NOT EXISTS bookings (
        id UUID PRIMARY KEY,
        customer_id UUID NOT NULL,
        service_id UUID NOT NULL REFERENCES services (id),
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'confirmed', 'cancelled', 'completed')),
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_bookings_status
        ON bookings (status, created_at)",
    "CREATE TABLE IF NOT EXISTS booking_slots (
        booking_id UUID NOT NULL REFERENCES bookings (id),
        slot_id UUID NOT NULL REFERENCES time_slots (id),
        PRIMARY KEY (booking_id, slot_id)
    )",
    "CREATE TABLE IF NOT EXISTS reviews (
        booking_id UUID PRIMARY KEY REFERENCES bookings (id),
        customer_id UUID NOT NULL,
        rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
        comment TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
];

pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

pub(crate) fn weekday_to_db(weekday: Weekday) -> i16 {
    i16::try_from(weekday.num_days_from_monday()).unwrap_or(0)
}

pub(crate) fn weekday_from_db(value: i16) -> Result<Weekday, StoreError> {
    match value {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(StoreError::Corrupted(format!("weekday out of range: {other}"))),
    }
}

pub(crate) fn slot_status_from_db(value: &str) -> Result<SlotStatus, StoreError> {
    SlotStatus::parse(value)
        .ok_or_else(|| StoreError::Corrupted(format!("unknown slot status: {value:?}")))
}

pub(crate) fn booking_status_from_db(value: &str) -> Result<BookingStatus, StoreError> {
    BookingStatus::parse(value)
        .ok_or_else(|| StoreError::Corrupted(format!("unknown booking status: {value:?}")))
}

/// Map a `time_slots` row (id, date, start_time, end_time, status).
pub(crate) fn slot_from_row(
    row: (Uuid, NaiveDate, NaiveTime, NaiveTime, String),
) -> Result<TimeSlot, StoreError> {
    Ok(TimeSlot {
        id: SlotId::from_uuid(row.0),
        date: row.1,
        start_time: row.2,
        end_time: row.3,
        status: slot_status_from_db(&row.4)?,
    })
}

/// Map a `bookings` row fetched with `sqlx::Row` access.
pub(crate) fn booking_from_row(row: &sqlx::postgres::PgRow) -> Result<Booking, StoreError> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Booking {
        id: BookingId::from_uuid(row.try_get("id").map_err(db_err)?),
        customer: CustomerId::from_uuid(row.try_get("customer_id").map_err(db_err)?),
        service_id: ServiceId::from_uuid(row.try_get("service_id").map_err(db_err)?),
        status: booking_status_from_db(&status)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

/// Map a `services` row (id, name, duration_minutes, price_cents).
pub(crate) fn service_from_row(
    row: (Uuid, String, i32, i64),
) -> Result<Service, StoreError> {
    let duration = u32::try_from(row.2)
        .map_err(|_| StoreError::Corrupted(format!("negative duration: {}", row.2)))?;
    let cents = u64::try_from(row.3)
        .map_err(|_| StoreError::Corrupted(format!("negative price: {}", row.3)))?;
    Service::new(
        ServiceId::from_uuid(row.0),
        row.1,
        duration,
        Money::from_cents(cents),
    )
    .map_err(|e| StoreError::Corrupted(e.to_string()))
}
