//! # Shearbook Testing
//!
//! Deterministic test doubles for the Shearbook engine:
//!
//! - [`mocks::FixedClock`]: a settable, advanceable clock so completion and
//!   expiry sweeps run under simulated time
//! - [`MemoryStore`]: an in-process implementation of the storage contracts
//!   with the same atomicity guarantees as the production store (one mutex
//!   around all state), suitable for lifecycle and race tests without a
//!   database
//!
//! ## Example
//!
//! ```ignore
//! use shearbook_core::engine::BookingEngine;
//! use shearbook_testing::{mocks::test_clock, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let clock = Arc::new(test_clock());
//! let engine = BookingEngine::new(store.clone(), clock.clone());
//! ```

use chrono::{DateTime, Duration, Utc};
use shearbook_core::environment::Clock;

mod memory_store;

pub use memory_store::MemoryStore;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests.
    ///
    /// Starts at a given instant and only moves when a test says so.
    ///
    /// # Example
    ///
    /// ```
    /// use shearbook_testing::mocks::FixedClock;
    /// use shearbook_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// clock.advance(Duration::hours(2));
    /// assert_eq!(clock.now() - before, Duration::hours(2));
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock at the given instant
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward (or backward with a negative duration)
        #[allow(clippy::expect_used)]
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().expect("clock mutex poisoned");
            *time += by;
        }

        /// Jump the clock to an absolute instant
        #[allow(clippy::expect_used)]
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().expect("clock mutex poisoned") = to;
        }
    }

    impl Clock for FixedClock {
        #[allow(clippy::expect_used)]
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().expect("clock mutex poisoned")
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_is_stable_until_advanced() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);

        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now() - time1, Duration::minutes(30));
    }
}
