//! `BookingStore` implementation: transactional claims and the lifecycle.
//!
//! Every mutating operation here is one transaction. Slot rows are locked
//! with `SELECT ... FOR UPDATE` ordered by `(date, start_time)`; taking the
//! locks in a consistent order means two overlapping claims serialize
//! instead of deadlocking, and the second transaction re-reads statuses the
//! first already committed.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgConnection, Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use tracing::debug;

use shearbook_core::audit::SlotCountMismatch;
use shearbook_core::store::{BookingStore, StoreError};
use shearbook_core::types::{
    Booking, BookingId, BookingRecord, BookingStatus, CustomerId, Review, ServiceId, SlotId,
    SlotStatus, TimeSlot,
};

use crate::store::{booking_from_row, db_err, slot_from_row, PostgresStore};

/// Lock the given slot rows and return `(id, status)` pairs.
async fn lock_slots(
    tx: &mut PgConnection,
    ids: &[Uuid],
) -> Result<Vec<(Uuid, String)>, StoreError> {
    sqlx::query_as(
        "SELECT id, status FROM time_slots
         WHERE id = ANY($1)
         ORDER BY date, start_time
         FOR UPDATE",
    )
    .bind(ids)
    .fetch_all(tx)
    .await
    .map_err(db_err)
}

/// Lock the booking row and map it, or fail with `BookingNotFound`.
async fn lock_booking(tx: &mut PgConnection, id: BookingId) -> Result<Booking, StoreError> {
    let row = sqlx::query(
        "SELECT id, customer_id, service_id, status, created_at, updated_at
         FROM bookings WHERE id = $1 FOR UPDATE",
    )
    .bind(id.as_uuid())
    .fetch_optional(tx)
    .await
    .map_err(db_err)?
    .ok_or(StoreError::BookingNotFound(id))?;
    booking_from_row(&row)
}

/// Slot ids referenced by a booking, in `(date, start_time)` order.
async fn booking_slot_ids(
    tx: &mut PgConnection,
    id: BookingId,
) -> Result<Vec<Uuid>, StoreError> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT s.id
         FROM booking_slots bs
         JOIN time_slots s ON s.id = bs.slot_id
         WHERE bs.booking_id = $1
         ORDER BY s.date, s.start_time",
    )
    .bind(id.as_uuid())
    .fetch_all(tx)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn update_slot_statuses(
    tx: &mut PgConnection,
    ids: &[Uuid],
    status: SlotStatus,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE time_slots SET status = $2 WHERE id = ANY($1)")
        .bind(ids)
        .bind(status.as_str())
        .execute(tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn update_booking_status(
    tx: &mut PgConnection,
    id: BookingId,
    status: BookingStatus,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(now)
        .execute(tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Load a full record inside the transaction, after mutations.
async fn load_record(
    tx: &mut PgConnection,
    id: BookingId,
) -> Result<BookingRecord, StoreError> {
    let row = sqlx::query(
        "SELECT id, customer_id, service_id, status, created_at, updated_at
         FROM bookings WHERE id = $1",
    )
    .bind(id.as_uuid())
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_err)?
    .ok_or(StoreError::BookingNotFound(id))?;
    let booking = booking_from_row(&row)?;

    let slot_rows: Vec<(Uuid, NaiveDate, NaiveTime, NaiveTime, String)> = sqlx::query_as(
        "SELECT s.id, s.date, s.start_time, s.end_time, s.status
         FROM booking_slots bs
         JOIN time_slots s ON s.id = bs.slot_id
         WHERE bs.booking_id = $1
         ORDER BY s.date, s.start_time",
    )
    .bind(id.as_uuid())
    .fetch_all(tx)
    .await
    .map_err(db_err)?;
    let slots: Vec<TimeSlot> = slot_rows
        .into_iter()
        .map(slot_from_row)
        .collect::<Result<_, _>>()?;

    Ok(BookingRecord { booking, slots })
}

async fn begin(store: &PostgresStore) -> Result<Transaction<'_, Postgres>, StoreError> {
    store.pool().begin().await.map_err(db_err)
}

impl BookingStore for PostgresStore {
    fn create_booking(
        &self,
        customer: CustomerId,
        service_id: ServiceId,
        slot_ids: Vec<SlotId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let requested: Vec<Uuid> = slot_ids.iter().map(|id| *id.as_uuid()).collect();
            let mut tx = begin(self).await?;

            let locked = lock_slots(&mut tx, &requested).await?;
            let blocked = blocked_slots(&requested, &locked, |status| {
                status == SlotStatus::Available.as_str()
            });
            if !blocked.is_empty() {
                // dropping the transaction rolls back; nothing was claimed
                return Err(StoreError::SlotConflict { slots: blocked });
            }

            update_slot_statuses(&mut tx, &requested, SlotStatus::Pending).await?;

            let booking_id = BookingId::new();
            sqlx::query(
                "INSERT INTO bookings (id, customer_id, service_id, status, created_at, updated_at)
                 VALUES ($1, $2, $3, 'pending', $4, $4)",
            )
            .bind(booking_id.as_uuid())
            .bind(customer.as_uuid())
            .bind(service_id.as_uuid())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            for slot in &requested {
                sqlx::query("INSERT INTO booking_slots (booking_id, slot_id) VALUES ($1, $2)")
                    .bind(booking_id.as_uuid())
                    .bind(slot)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }

            let record = load_record(&mut tx, booking_id).await?;
            tx.commit().await.map_err(db_err)?;
            debug!(booking = %booking_id, slots = requested.len(), "claimed slot run");
            Ok(record)
        })
    }

    fn booking(
        &self,
        id: BookingId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BookingRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.pool().acquire().await.map_err(db_err)?;
            match load_record(&mut conn, id).await {
                Ok(record) => Ok(Some(record)),
                Err(StoreError::BookingNotFound(_)) => Ok(None),
                Err(other) => Err(other),
            }
        })
    }

    fn confirm_booking(
        &self,
        id: BookingId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = begin(self).await?;

            let booking = lock_booking(&mut tx, id).await?;
            if booking.status != BookingStatus::Pending {
                return Err(StoreError::InvalidBookingState {
                    id,
                    status: booking.status,
                    required: "pending",
                });
            }

            let slot_ids = booking_slot_ids(&mut tx, id).await?;
            let locked = lock_slots(&mut tx, &slot_ids).await?;
            // Slots were placed in 'pending' by this booking's own claim;
            // 'available' is tolerated so a hand-released slot can be re-taken.
            let blocked = blocked_slots(&slot_ids, &locked, |status| {
                status == SlotStatus::Pending.as_str()
                    || status == SlotStatus::Available.as_str()
            });
            if !blocked.is_empty() {
                return Err(StoreError::SlotConflict { slots: blocked });
            }

            update_slot_statuses(&mut tx, &slot_ids, SlotStatus::Booked).await?;
            update_booking_status(&mut tx, id, BookingStatus::Confirmed, now).await?;

            let record = load_record(&mut tx, id).await?;
            tx.commit().await.map_err(db_err)?;
            debug!(booking = %id, "confirmed; slots booked");
            Ok(record)
        })
    }

    fn cancel_booking(
        &self,
        id: BookingId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<BookingRecord, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = begin(self).await?;

            let booking = lock_booking(&mut tx, id).await?;
            if !booking.status.is_active() {
                return Err(StoreError::InvalidBookingState {
                    id,
                    status: booking.status,
                    required: "pending or confirmed",
                });
            }

            // Release unconditionally, whatever tier the slots were in.
            let slot_ids = booking_slot_ids(&mut tx, id).await?;
            lock_slots(&mut tx, &slot_ids).await?;
            update_slot_statuses(&mut tx, &slot_ids, SlotStatus::Available).await?;
            update_booking_status(&mut tx, id, BookingStatus::Cancelled, now).await?;

            let record = load_record(&mut tx, id).await?;
            tx.commit().await.map_err(db_err)?;
            debug!(booking = %id, released = slot_ids.len(), "cancelled; slots released");
            Ok(record)
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
            let new_ids: Vec<Uuid> = slot_ids.iter().map(|id| *id.as_uuid()).collect();
            let mut tx = begin(self).await?;

            let booking = lock_booking(&mut tx, id).await?;
            if !booking.status.is_active() {
                return Err(StoreError::InvalidBookingState {
                    id,
                    status: booking.status,
                    required: "pending or confirmed",
                });
            }

            let old_ids = booking_slot_ids(&mut tx, id).await?;

            // Lock old and new rows together, in one ordered pass.
            let mut all_ids = old_ids.clone();
            for slot in &new_ids {
                if !all_ids.contains(slot) {
                    all_ids.push(*slot);
                }
            }
            let locked = lock_slots(&mut tx, &all_ids).await?;

            // A new slot is claimable if it is available, or about to be
            // released from this very booking.
            let blocked = blocked_slots(&new_ids, &locked, |status| {
                status == SlotStatus::Available.as_str()
            })
            .into_iter()
            .filter(|slot| !old_ids.contains(slot.as_uuid()))
            .collect::<Vec<_>>();
            if !blocked.is_empty() {
                // rollback on drop: the booking keeps its original slots
                return Err(StoreError::SlotConflict { slots: blocked });
            }

            update_slot_statuses(&mut tx, &old_ids, SlotStatus::Available).await?;
            sqlx::query("DELETE FROM booking_slots WHERE booking_id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            for slot in &new_ids {
                sqlx::query("INSERT INTO booking_slots (booking_id, slot_id) VALUES ($1, $2)")
                    .bind(id.as_uuid())
                    .bind(slot)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
            update_slot_statuses(&mut tx, &new_ids, booking.status.claimed_slot_status())
                .await?;
            sqlx::query("UPDATE bookings SET service_id = $2, updated_at = $3 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(service_id.as_uuid())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

            let record = load_record(&mut tx, id).await?;
            tx.commit().await.map_err(db_err)?;
            debug!(booking = %id, "re-targeted onto a new slot run");
            Ok(record)
        })
    }

    fn confirmed_bookings(
        &self,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BookingRecord>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, customer_id, service_id, status, created_at, updated_at
                 FROM bookings
                 WHERE status = 'confirmed'
                 ORDER BY created_at
                 LIMIT $1",
            )
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

            let mut conn = self.pool().acquire().await.map_err(db_err)?;
            let mut records = Vec::with_capacity(rows.len());
            for row in &rows {
                let booking = booking_from_row(row)?;
                records.push(load_record(&mut conn, booking.id).await?);
            }
            Ok(records)
        })
    }

    fn complete_bookings(
        &self,
        ids: Vec<BookingId>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
            // Guarded by status: a concurrently cancelled booking stays
            // cancelled and is simply not counted.
            let result = sqlx::query(
                "UPDATE bookings SET status = 'completed', updated_at = $2
                 WHERE id = ANY($1) AND status = 'confirmed'",
            )
            .bind(&uuids)
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
            Ok(result.rows_affected())
        })
    }

    fn insert_review(
        &self,
        review: Review,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO reviews (booking_id, customer_id, rating, comment, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(review.booking_id.as_uuid())
            .bind(review.customer.as_uuid())
            .bind(i16::from(review.rating.value()))
            .bind(&review.comment)
            .bind(review.created_at)
            .execute(self.pool())
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(db)) => {
                    use sqlx::error::ErrorKind;
                    match db.kind() {
                        ErrorKind::UniqueViolation => {
                            Err(StoreError::DuplicateReview(review.booking_id))
                        }
                        ErrorKind::ForeignKeyViolation => {
                            Err(StoreError::BookingNotFound(review.booking_id))
                        }
                        _ => Err(StoreError::Database(db.to_string())),
                    }
                }
                Err(other) => Err(db_err(other)),
            }
        })
    }

    fn slot_count_mismatches(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SlotCountMismatch>, StoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let rows: Vec<(Uuid, i64, i32)> = sqlx::query_as(
                "SELECT b.id, COUNT(bs.slot_id), s.duration_minutes / 15
                 FROM bookings b
                 JOIN services s ON s.id = b.service_id
                 LEFT JOIN booking_slots bs ON bs.booking_id = b.id
                 WHERE b.status <> 'cancelled'
                 GROUP BY b.id, s.duration_minutes
                 HAVING COUNT(bs.slot_id) <> s.duration_minutes / 15
                 ORDER BY b.id",
            )
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

            Ok(rows
                .into_iter()
                .map(|(id, actual, expected)| SlotCountMismatch {
                    booking_id: BookingId::from_uuid(id),
                    actual: actual.unsigned_abs(),
                    expected: u64::from(expected.unsigned_abs()),
                })
                .collect())
        })
    }
}

/// Requested slots that are missing from `locked` or fail the status
/// predicate. The returned ids are what the conflict error reports.
fn blocked_slots(
    requested: &[Uuid],
    locked: &[(Uuid, String)],
    acceptable: impl Fn(&str) -> bool,
) -> Vec<SlotId> {
    requested
        .iter()
        .filter(|id| {
            locked
                .iter()
                .find(|(locked_id, _)| locked_id == *id)
                .is_none_or(|(_, status)| !acceptable(status))
        })
        .map(|id| SlotId::from_uuid(*id))
        .collect()
}
