//! The balance ledger row and its grant/consume/restore arithmetic.
//!
//! `available` is always derived from the other three fields, never mutated
//! on its own. The arithmetic is exact because units are fixed-point
//! hundredths of a day.

use crate::error::EngineError;
use crate::request::LeaveUnit;
use crate::time::{Day, TimeStamp, each_day};
use crate::units::Units;
use chrono::Utc;

pub fn available_balance(opening: Units, granted: Units, consumed: Units) -> Units {
    opening + granted - consumed
}

/// Unit count for a request: 0.50 for a half day, the inclusive day count
/// otherwise. Callers validate `start <= end` first.
pub fn leave_units(start: Day, end: Day, unit: LeaveUnit) -> Units {
    match unit {
        LeaveUnit::HalfDay => Units::half_day(),
        LeaveUnit::FullDay => {
            let days = each_day(start, end).count() as u32;
            Units::from_whole_days(days)
        }
    }
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct LeaveBalance {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub employee_id: String,
    #[n(2)]
    pub leave_type_id: String,
    #[n(3)]
    pub year: i32,
    #[n(4)]
    pub opening: Units,
    #[n(5)]
    pub granted: Units,
    #[n(6)]
    pub consumed: Units,
    #[n(7)]
    pub available: Units,
    #[n(8)]
    pub version: u64,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
    #[n(11)]
    pub updated_by: Option<String>,
}

impl LeaveBalance {
    /// First grant for an (employee, leave type, year) opens the row.
    pub fn open(
        id: String,
        employee_id: String,
        leave_type_id: String,
        year: i32,
        opening: Units,
        granted: Units,
        now: TimeStamp<Utc>,
        actor_id: &str,
    ) -> Self {
        Self {
            id,
            employee_id,
            leave_type_id,
            year,
            opening,
            granted,
            consumed: Units::ZERO,
            available: available_balance(opening, granted, Units::ZERO),
            version: 1,
            created_at: now.clone(),
            updated_at: now,
            updated_by: Some(actor_id.to_string()),
        }
    }

    fn recompute(&mut self) {
        self.available = available_balance(self.opening, self.granted, self.consumed);
    }

    /// Add to the granted pool. Opening is only overwritten when the caller
    /// explicitly supplies a new value.
    pub fn grant(&mut self, opening: Option<Units>, amount: Units) {
        if let Some(opening) = opening {
            self.opening = opening;
        }
        self.granted = self.granted + amount;
        self.recompute();
    }

    /// Consume on final approval. Insufficient balance is a hard error and
    /// leaves the row untouched.
    pub fn consume(&mut self, units: Units) -> Result<(), EngineError> {
        if self.available < units {
            return Err(EngineError::InsufficientBalance {
                requested: units,
                available: self.available,
            });
        }
        self.consumed = self.consumed + units;
        self.recompute();
        Ok(())
    }

    /// Inverse of consume, clamped at a zero floor. Used when cancelling a
    /// previously approved request.
    pub fn restore(&mut self, units: Units) {
        self.consumed = Units::ZERO.max(self.consumed - units);
        self.recompute();
    }
}
