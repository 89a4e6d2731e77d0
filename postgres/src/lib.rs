//! `PostgreSQL` storage for the Shearbook booking engine.
//!
//! This crate provides the production implementation of the storage
//! contracts from `shearbook-core`. It uses sqlx with connection pooling
//! and enforces the booking-tied atomicity requirement at the database:
//!
//! - every claim/confirm/cancel/retarget is one transaction
//! - target slot rows are taken with `SELECT ... FOR UPDATE` in
//!   `(date, start_time)` order, so concurrent claims serialize without
//!   deadlocking and the loser observes the winner's committed statuses
//! - slot uniqueness is a database constraint
//!   (`UNIQUE (date, start_time, end_time)`), with insert-if-absent writes
//!   (`ON CONFLICT DO NOTHING`) for the idempotent calendar generator
//!
//! # Example
//!
//! ```ignore
//! use shearbook_postgres::PostgresStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::connect("postgres://localhost/shearbook").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

mod bookings;
mod catalog;
mod slots;
mod store;

pub use store::PostgresStore;
