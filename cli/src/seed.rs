//! Starter data for a fresh deployment.
//!
//! Loads a small service catalog and a typical week of opening hours.
//! Upsert semantics: re-running refreshes the same rows instead of
//! duplicating them. Shop configuration is otherwise managed outside the
//! engine; this exists so a new database is immediately usable.

use chrono::{NaiveTime, Weekday};

use shearbook_core::types::{Money, OpeningHours, Service, ServiceId};
use shearbook_postgres::PostgresStore;

fn time(h: u32, m: u32) -> anyhow::Result<NaiveTime> {
    NaiveTime::from_hms_opt(h, m, 0).ok_or_else(|| anyhow::anyhow!("invalid time {h}:{m}"))
}

/// Insert the starter catalog and opening hours.
pub async fn run(store: &PostgresStore) -> anyhow::Result<()> {
    let services = [
        ("Haircut", 30, 2500),
        ("Beard trim", 15, 1200),
        ("Cut & beard", 45, 4000),
        ("The full works", 60, 5500),
    ];
    for (name, duration, cents) in services {
        let service = Service::new(
            ServiceId::new(),
            name,
            duration,
            Money::from_cents(cents),
        )?;
        store.upsert_service(&service).await?;
    }

    let weekdays = [
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ];
    for weekday in weekdays {
        store
            .upsert_opening_hours(&OpeningHours::new(weekday, time(9, 0)?, time(18, 0)?)?)
            .await?;
    }
    // half day on Saturday, closed Sunday and Monday
    store
        .upsert_opening_hours(&OpeningHours::new(Weekday::Sat, time(9, 0)?, time(14, 0)?)?)
        .await?;

    Ok(())
}
