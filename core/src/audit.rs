//! Read-only integrity auditing.
//!
//! The auditor runs out-of-band (operator command), reports and never
//! repairs. Both checks mirror invariants the write path already enforces;
//! a non-clean report means something bypassed the store's guarantees and
//! deserves a human.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::store::{Store, StoreError};
use crate::types::BookingId;

/// A `(date, start, end)` group holding more than one slot row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSlot {
    /// Date of the duplicated window
    pub date: NaiveDate,
    /// Start time of the duplicated window
    pub start_time: NaiveTime,
    /// End time of the duplicated window
    pub end_time: NaiveTime,
    /// Number of rows in the group (always > 1)
    pub count: u64,
}

/// A booking whose stored slot count differs from its service duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCountMismatch {
    /// The offending booking
    pub booking_id: BookingId,
    /// Slots actually referenced
    pub actual: u64,
    /// `duration_minutes / 15` of the booked service
    pub expected: u64,
}

/// Aggregated result of one audit pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Duplicate `(date, start, end)` slot groups
    pub duplicate_slots: Vec<DuplicateSlot>,
    /// Bookings with a wrong slot count
    pub slot_count_mismatches: Vec<SlotCountMismatch>,
}

impl IntegrityReport {
    /// True when both checks came back empty.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.duplicate_slots.is_empty() && self.slot_count_mismatches.is_empty()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "integrity: clean");
        }
        writeln!(
            f,
            "integrity: {} duplicate slot group(s), {} slot-count mismatch(es)",
            self.duplicate_slots.len(),
            self.slot_count_mismatches.len()
        )?;
        for dup in &self.duplicate_slots {
            writeln!(
                f,
                "  duplicate: {} {} - {} x{}",
                dup.date, dup.start_time, dup.end_time, dup.count
            )?;
        }
        for miss in &self.slot_count_mismatches {
            writeln!(
                f,
                "  booking {} has {} slot(s), expected {}",
                miss.booking_id, miss.actual, miss.expected
            )?;
        }
        Ok(())
    }
}

/// Read-only consistency checker over the slot store and bookings.
#[derive(Clone)]
pub struct IntegrityAuditor {
    store: Arc<dyn Store>,
}

impl IntegrityAuditor {
    /// Creates an auditor over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run both checks and aggregate the findings.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the underlying audit queries.
    pub async fn run(&self) -> Result<IntegrityReport, StoreError> {
        let duplicate_slots = self.store.duplicate_slots().await?;
        let slot_count_mismatches = self.store.slot_count_mismatches().await?;
        Ok(IntegrityReport {
            duplicate_slots,
            slot_count_mismatches,
        })
    }
}
