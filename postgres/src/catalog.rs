//! `ServiceCatalog` implementation: services and opening hours.

use chrono::NaiveTime;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use shearbook_core::store::{ServiceCatalog, StoreError};
use shearbook_core::types::{OpeningHours, Service, ServiceId};

use crate::store::{db_err, service_from_row, weekday_from_db, PostgresStore};

impl ServiceCatalog for PostgresStore {
    fn service(
        &self,
        id: ServiceId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Service>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let row: Option<(Uuid, String, i32, i64)> = sqlx::query_as(
                "SELECT id, name, duration_minutes, price_cents
                 FROM services WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
            row.map(service_from_row).transpose()
        })
    }

    fn opening_hours(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<OpeningHours>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let rows: Vec<(i16, NaiveTime, NaiveTime)> = sqlx::query_as(
                "SELECT weekday, open_time, close_time
                 FROM opening_hours
                 ORDER BY weekday",
            )
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;

            rows.into_iter()
                .map(|(weekday, open_time, close_time)| {
                    OpeningHours::new(weekday_from_db(weekday)?, open_time, close_time)
                        .map_err(|e| StoreError::Corrupted(e.to_string()))
                })
                .collect()
        })
    }
}
