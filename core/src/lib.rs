//! # Shearbook Core
//!
//! Domain model, storage contracts and the booking lifecycle engine for a
//! barbershop appointment platform: customers reserve contiguous 15-minute
//! slots, staff confirm, decline or complete bookings.
//!
//! ## Components
//!
//! - [`calendar`]: expands weekly opening hours into dated 15-minute slots
//! - [`store`]: the storage contracts; the slot store is the single shared
//!   mutable resource and every booking-tied transition is one atomic unit
//! - [`availability`]: exact-match contiguous-run finding and the browse view
//! - [`engine`]: the booking lifecycle manager and external interface
//! - [`audit`]: read-only integrity checking
//!
//! ## Architecture Principles
//!
//! - Pre-commit validation is explicit ([`validation`]), never a persistence
//!   hook; the store re-verifies only statuses, under lock
//! - Atomicity lives at the storage layer (row locking / compare-and-swap),
//!   never in in-process locks, because the deployment is multi-worker
//! - "Now" is an injected capability ([`environment::Clock`]) so time-based
//!   transitions are deterministic under test
//! - No automatic retries: a lost race is the caller's signal to re-query
//!   and resubmit
//!
//! ## Example
//!
//! ```ignore
//! use shearbook_core::engine::{BookingEngine, BookingRequest};
//! use shearbook_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let engine = BookingEngine::new(store, Arc::new(SystemClock));
//! let booking = engine.create_booking(&BookingRequest {
//!     customer,
//!     service_id: service.to_string(),
//!     date: "2025-03-03".into(),
//!     start_time: "09:15".into(),
//! }).await?;
//! ```

pub mod audit;
pub mod availability;
pub mod calendar;
pub mod engine;
pub mod environment;
pub mod error;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use audit::{IntegrityAuditor, IntegrityReport};
pub use engine::{BookingEngine, BookingRequest, BulkOutcome};
pub use environment::{Clock, SystemClock};
pub use error::{BookingError, ValidationError};
pub use store::{BookingStore, ServiceCatalog, SlotStore, Store, StoreError};
pub use types::{
    Booking, BookingId, BookingRecord, BookingStatus, CustomerId, Money, NewSlot, OpeningHours,
    Rating, Review, Service, ServiceId, SlotId, SlotStatus, TimeSlot, SLOT_MINUTES,
};
