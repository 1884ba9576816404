//! The leave request row, its status machine, and the overlap registry.

use crate::policy::ApprovalLevels;
use crate::time::{Day, DayRange, TimeStamp, each_day};
use crate::units::Units;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum LeaveStatus {
    #[n(0)]
    PendingL1,
    #[n(1)]
    PendingL2,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    Cancelled,
    /// Rows written before the two-level schema change. Read as `PendingL1`
    /// everywhere; never written by this engine.
    #[n(5)]
    Submitted,
}

impl LeaveStatus {
    /// Folds the legacy alias away. All guards operate on this value.
    pub fn normalized(self) -> LeaveStatus {
        match self {
            LeaveStatus::Submitted => LeaveStatus::PendingL1,
            s => s,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self.normalized(),
            LeaveStatus::PendingL1 | LeaveStatus::PendingL2
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum LeaveUnit {
    #[default]
    #[n(0)]
    FullDay,
    #[n(1)]
    HalfDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum HalfDayPart {
    #[n(0)]
    Am,
    #[n(1)]
    Pm,
}

/// What an `approve` call means for a loaded row, resolved once from the
/// stamps and the configured level count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Two-level policy, L1 not yet stamped: stamp L1, move to `PendingL2`.
    FirstOfTwo,
    /// The approval that lands the row in `Approved` and fires side effects.
    Final,
    /// Historical inconsistency: already `Approved` under a two-level policy
    /// with the L2 stamp missing. Stamp L2 only; the final-approval side
    /// effects already fired when the row was approved.
    LegacyMissingL2,
    NotPending,
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct LeaveRequest {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub employee_id: String,
    #[n(2)]
    pub leave_type_id: String,
    #[n(3)]
    pub start_date: Day,
    #[n(4)]
    pub end_date: Day,
    #[n(5)]
    pub unit: LeaveUnit,
    #[n(6)]
    pub half_day_part: Option<HalfDayPart>,
    #[n(7)]
    pub units: Units,
    #[n(8)]
    pub reason: String,
    #[n(9)]
    pub status: LeaveStatus,
    #[n(10)]
    pub approved_l1_by: Option<String>,
    #[n(11)]
    pub approved_l1_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub approved_l2_by: Option<String>,
    #[n(13)]
    pub approved_l2_at: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub rejected_by: Option<String>,
    #[n(15)]
    pub rejected_at: Option<TimeStamp<Utc>>,
    #[n(16)]
    pub rejection_reason: Option<String>,
    #[n(17)]
    pub cancelled_by: Option<String>,
    #[n(18)]
    pub cancelled_at: Option<TimeStamp<Utc>>,
    #[n(19)]
    pub cancel_reason: Option<String>,
    #[n(20)]
    pub version: u64,
    #[n(21)]
    pub created_at: TimeStamp<Utc>,
    #[n(22)]
    pub updated_at: TimeStamp<Utc>,
}

impl LeaveRequest {
    pub fn year(&self) -> i32 {
        self.start_date.year()
    }

    /// Every calendar day in the inclusive range, for attendance sync.
    pub fn each_day(&self) -> DayRange {
        each_day(self.start_date, self.end_date)
    }

    pub fn pending_kind(&self, levels: ApprovalLevels) -> PendingKind {
        if levels == ApprovalLevels::Two
            && self.status == LeaveStatus::Approved
            && self.approved_l1_at.is_some()
            && self.approved_l2_at.is_none()
        {
            return PendingKind::LegacyMissingL2;
        }
        if !self.status.is_pending() {
            return PendingKind::NotPending;
        }
        match levels {
            ApprovalLevels::One => PendingKind::Final,
            ApprovalLevels::Two if self.approved_l1_at.is_none() => PendingKind::FirstOfTwo,
            ApprovalLevels::Two => PendingKind::Final,
        }
    }
}

/// Inclusive interval overlap: two ranges collide unless one ends before the
/// other starts.
pub fn ranges_overlap(a_start: Day, a_end: Day, b_start: Day, b_end: Day) -> bool {
    !(a_end < b_start || a_start > b_end)
}

/// One entry of the per-employee overlap registry. The registry row holds a
/// span for every pending or approved request and is read and rewritten in
/// the same transaction as the request itself, so the overlap check
/// serializes with concurrent creates.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct ActiveSpan {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub start: Day,
    #[n(2)]
    pub end: Day,
}

/// Builder for a create call. Validation happens in the service so the
/// errors land in one place.
#[derive(Debug, Clone, Default)]
pub struct LeaveRequestDraft {
    pub employee_id: Option<String>,
    pub leave_type_id: Option<String>,
    pub start_date: Option<Day>,
    pub end_date: Option<Day>,
    pub unit: LeaveUnit,
    pub half_day_part: Option<HalfDayPart>,
    pub reason: Option<String>,
}

impl LeaveRequestDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_employee(mut self, employee_id: &str) -> Self {
        self.employee_id = Some(employee_id.to_string());
        self
    }

    pub fn leave_type(mut self, leave_type_id: &str) -> Self {
        self.leave_type_id = Some(leave_type_id.to_string());
        self
    }

    pub fn date_range(mut self, start: Day, end: Day) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn half_day(mut self, part: HalfDayPart) -> Self {
        self.unit = LeaveUnit::HalfDay;
        self.half_day_part = Some(part);
        self
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> Day {
        Day::from_ymd(y, m, d).unwrap()
    }

    fn pending_row(status: LeaveStatus) -> LeaveRequest {
        LeaveRequest {
            id: "leave_1test".into(),
            employee_id: "emp-1".into(),
            leave_type_id: "lt-1".into(),
            start_date: day(2026, 3, 2),
            end_date: day(2026, 3, 4),
            unit: LeaveUnit::FullDay,
            half_day_part: None,
            units: Units::from_whole_days(3),
            reason: "family matter".into(),
            status,
            approved_l1_by: None,
            approved_l1_at: None,
            approved_l2_by: None,
            approved_l2_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            cancel_reason: None,
            version: 1,
            created_at: TimeStamp::new(),
            updated_at: TimeStamp::new(),
        }
    }

    #[test]
    fn submitted_reads_as_pending_l1() {
        assert_eq!(
            LeaveStatus::Submitted.normalized(),
            LeaveStatus::PendingL1
        );
        assert!(LeaveStatus::Submitted.is_pending());
        assert!(!LeaveStatus::Approved.is_pending());
    }

    #[test]
    fn one_level_pending_resolves_final() {
        let row = pending_row(LeaveStatus::PendingL1);
        assert_eq!(row.pending_kind(ApprovalLevels::One), PendingKind::Final);
    }

    #[test]
    fn two_level_resolution_follows_the_l1_stamp() {
        let mut row = pending_row(LeaveStatus::PendingL1);
        assert_eq!(
            row.pending_kind(ApprovalLevels::Two),
            PendingKind::FirstOfTwo
        );

        row.status = LeaveStatus::PendingL2;
        row.approved_l1_by = Some("mgr-1".into());
        row.approved_l1_at = Some(TimeStamp::new());
        assert_eq!(row.pending_kind(ApprovalLevels::Two), PendingKind::Final);
    }

    #[test]
    fn legacy_approved_without_l2_stamp_is_detected() {
        let mut row = pending_row(LeaveStatus::Approved);
        row.approved_l1_by = Some("mgr-1".into());
        row.approved_l1_at = Some(TimeStamp::new());

        assert_eq!(
            row.pending_kind(ApprovalLevels::Two),
            PendingKind::LegacyMissingL2
        );
        // Under a one-level policy the same row is simply not pending.
        assert_eq!(row.pending_kind(ApprovalLevels::One), PendingKind::NotPending);
    }

    #[test]
    fn terminal_states_are_not_pending() {
        for status in [LeaveStatus::Rejected, LeaveStatus::Cancelled] {
            assert_eq!(
                pending_row(status).pending_kind(ApprovalLevels::One),
                PendingKind::NotPending
            );
        }
    }

    #[test]
    fn overlap_covers_touching_and_nested_ranges() {
        let (s, e) = (day(2026, 3, 2), day(2026, 3, 4));
        assert!(ranges_overlap(s, e, day(2026, 3, 4), day(2026, 3, 6)));
        assert!(ranges_overlap(s, e, day(2026, 3, 3), day(2026, 3, 3)));
        assert!(ranges_overlap(s, e, day(2026, 3, 1), day(2026, 3, 9)));
        assert!(!ranges_overlap(s, e, day(2026, 3, 5), day(2026, 3, 6)));
        assert!(!ranges_overlap(s, e, day(2026, 2, 1), day(2026, 3, 1)));
    }

    #[test]
    fn request_row_encoding_round_trips() {
        let row = pending_row(LeaveStatus::PendingL1);

        let encoding = minicbor::to_vec(&row).unwrap();
        let decoded: LeaveRequest = minicbor::decode(&encoding).unwrap();

        assert_eq!(row, decoded);
    }
}
