//! `SlotStore` implementation: the authoritative slot set.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use shearbook_core::audit::DuplicateSlot;
use shearbook_core::store::{SlotStore, StoreError};
use shearbook_core::types::{NewSlot, SlotId, SlotStatus, TimeSlot};

use crate::store::{db_err, slot_from_row, PostgresStore};

impl SlotStore for PostgresStore {
    fn insert_slots(
        &self,
        slots: Vec<NewSlot>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            // Insert-if-absent keyed on the uniqueness constraint keeps the
            // calendar generator idempotent, including concurrent runs.
            let mut created = 0;
            for slot in slots {
                let result = sqlx::query(
                    "INSERT INTO time_slots (id, date, start_time, end_time, status)
                     VALUES ($1, $2, $3, $4, 'available')
                     ON CONFLICT (date, start_time, end_time) DO NOTHING",
                )
                .bind(slot.id.as_uuid())
                .bind(slot.date)
                .bind(slot.start_time)
                .bind(slot.end_time)
                .execute(self.pool())
                .await
                .map_err(db_err)?;
                created += result.rows_affected();
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
            let row: Option<(Uuid, NaiveDate, NaiveTime, NaiveTime, String)> = sqlx::query_as(
                "SELECT id, date, start_time, end_time, status
                 FROM time_slots
                 WHERE date = $1 AND start_time = $2 AND end_time = $3",
            )
            .bind(date)
            .bind(start)
            .bind(end)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
            row.map(slot_from_row).transpose()
        })
    }

    fn available_slots(
        &self,
        from: NaiveDate,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TimeSlot>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows: Vec<(Uuid, NaiveDate, NaiveTime, NaiveTime, String)> = sqlx::query_as(
                "SELECT id, date, start_time, end_time, status
                 FROM time_slots
                 WHERE status = 'available' AND date >= $1
                 ORDER BY date, start_time",
            )
            .bind(from)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
            rows.into_iter().map(slot_from_row).collect()
        })
    }

    fn set_slot_status(
        &self,
        slot_ids: Vec<SlotId>,
        status: SlotStatus,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let ids: Vec<Uuid> = slot_ids.iter().map(|id| *id.as_uuid()).collect();
            let result = sqlx::query("UPDATE time_slots SET status = $2 WHERE id = ANY($1)")
                .bind(&ids)
                .bind(status.as_str())
                .execute(self.pool())
                .await
                .map_err(db_err)?;
            Ok(result.rows_affected())
        })
    }

    fn expire_slots_before(
        &self,
        cutoff: NaiveDateTime,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            // SKIP LOCKED keeps the sweep from blocking behind live claims;
            // skipped rows are picked up by the next run.
            let result = sqlx::query(
                "UPDATE time_slots SET status = 'expired'
                 WHERE id IN (
                     SELECT id FROM time_slots
                     WHERE status = 'available' AND (date + end_time) < $1
                     ORDER BY date, start_time
                     LIMIT $2
                     FOR UPDATE SKIP LOCKED
                 )",
            )
            .bind(cutoff)
            .bind(i64::from(limit))
            .execute(self.pool())
            .await
            .map_err(db_err)?;
            Ok(result.rows_affected())
        })
    }

    fn duplicate_slots(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DuplicateSlot>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows: Vec<(NaiveDate, NaiveTime, NaiveTime, i64)> = sqlx::query_as(
                "SELECT date, start_time, end_time, COUNT(*)
                 FROM time_slots
                 GROUP BY date, start_time, end_time
                 HAVING COUNT(*) > 1
                 ORDER BY date, start_time",
            )
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
            Ok(rows
                .into_iter()
                .map(|(date, start_time, end_time, count)| DuplicateSlot {
                    date,
                    start_time,
                    end_time,
                    count: count.unsigned_abs(),
                })
                .collect())
        })
    }
}
