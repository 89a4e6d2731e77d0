//! Injected dependencies for the booking engine.
//!
//! Completion and expiry depend on wall-clock time, so "now" is abstracted
//! behind the [`Clock`] trait; tests drive time deterministically with the
//! fixed clock from `shearbook-testing`.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
