//! Collaborator seams: access control, the month-close calendar, and the
//! attendance bridge. The engine only consumes these contracts; divisions,
//! role tables, and the attendance store live elsewhere.

use crate::request::HalfDayPart;
use crate::time::{Day, Month};

/// Permission codes resolved by the access guard.
pub mod permission {
    pub const LEAVE_APPLY_SELF: &str = "LEAVE_APPLY_SELF";
    pub const LEAVE_APPROVE_L1: &str = "LEAVE_APPROVE_L1";
    pub const LEAVE_APPROVE_L2: &str = "LEAVE_APPROVE_L2";
    pub const LEAVE_REQUEST_CANCEL: &str = "LEAVE_REQUEST_CANCEL";
    pub const LEAVE_BALANCE_GRANT: &str = "LEAVE_BALANCE_GRANT";
    pub const LEAVE_MONTH_CLOSE_OVERRIDE: &str = "LEAVE_MONTH_CLOSE_OVERRIDE";
}

/// RBAC lookup scoped to the employee's primary division (company-wide roles
/// pass any employee).
pub trait AccessGuard {
    fn actor_can_access_employee(&self, actor_id: &str, permission: &str, employee_id: &str)
    -> bool;

    /// Company-scope permission with no employee in sight; used for the
    /// month-close override.
    fn actor_has_company_permission(&self, actor_id: &str, permission: &str) -> bool;
}

/// Permits everything. For deployments without RBAC wired up, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAccess;

impl AccessGuard for AllowAllAccess {
    fn actor_can_access_employee(&self, _: &str, _: &str, _: &str) -> bool {
        true
    }

    fn actor_has_company_permission(&self, _: &str, _: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthStatus {
    Open,
    Closed,
}

/// The month-close ledger. When disabled tenant-wide the whole gate is a
/// no-op.
pub trait MonthCloseCalendar {
    fn month_close_enabled(&self) -> bool;

    fn month_status(&self, month: Month) -> MonthStatus;
}

/// Month-close never engages. For deployments without period governance.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOpen;

impl MonthCloseCalendar for AlwaysOpen {
    fn month_close_enabled(&self) -> bool {
        false
    }

    fn month_status(&self, _: Month) -> MonthStatus {
        MonthStatus::Open
    }
}

/// Day-level attendance synchronization. Called once per calendar day in a
/// request's range on final approval (apply) and on cancellation of an
/// approved request (revert). The leave request id keys the attendance
/// side's idempotency.
pub trait AttendanceBridge {
    fn apply_leave(
        &self,
        employee_id: &str,
        date: Day,
        leave_request_id: &str,
        half_day_part: Option<HalfDayPart>,
        actor_id: &str,
    ) -> anyhow::Result<()>;

    fn revert_leave(
        &self,
        employee_id: &str,
        date: Day,
        leave_request_id: &str,
        actor_id: &str,
    ) -> anyhow::Result<()>;
}

/// Discards attendance sync. For deployments where attendance is not wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBridge;

impl AttendanceBridge for NoopBridge {
    fn apply_leave(
        &self,
        _: &str,
        _: Day,
        _: &str,
        _: Option<HalfDayPart>,
        _: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn revert_leave(&self, _: &str, _: Day, _: &str, _: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
