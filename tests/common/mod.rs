//! Shared test doubles and service assembly.
#![allow(dead_code)]

use leave_lifecycle::guards::{
    AccessGuard, AllowAllAccess, AlwaysOpen, AttendanceBridge, MonthCloseCalendar, MonthStatus,
    permission,
};
use leave_lifecycle::leave_type::LeaveType;
use leave_lifecycle::policy::LeaveConfig;
use leave_lifecycle::request::HalfDayPart;
use leave_lifecycle::service::LeaveService;
use leave_lifecycle::time::{Day, Month};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Hook = Box<dyn FnOnce() + Send>;

/// Attendance double that records every call. `fail_on` makes `apply_leave`
/// fail for one specific date, for exercising the compensation path; the
/// one-shot hooks run a competing operation from inside the bridge pass,
/// which makes race interleavings deterministic.
#[derive(Default)]
pub struct RecordingBridge {
    pub applied: Mutex<Vec<(String, Day)>>,
    pub reverted: Mutex<Vec<(String, Day)>>,
    pub fail_on: Mutex<Option<Day>>,
    apply_hook: Mutex<Option<Hook>>,
    revert_hook: Mutex<Option<Hook>>,
}

impl RecordingBridge {
    pub fn applied_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    pub fn reverted_count(&self) -> usize {
        self.reverted.lock().unwrap().len()
    }

    /// Days with leave currently applied: applied at least once and not
    /// reverted afterwards. Mirrors an idempotent day-keyed attendance table.
    pub fn applied_days(&self, employee_id: &str) -> BTreeSet<Day> {
        let mut days = BTreeSet::new();
        for (emp, day) in self.applied.lock().unwrap().iter() {
            if emp == employee_id {
                days.insert(*day);
            }
        }
        for (emp, day) in self.reverted.lock().unwrap().iter() {
            if emp == employee_id {
                days.remove(day);
            }
        }
        days
    }

    pub fn fail_on(&self, date: Day) {
        *self.fail_on.lock().unwrap() = Some(date);
    }

    /// Run `hook` once, just before the first `apply_leave` records.
    pub fn on_first_apply(&self, hook: impl FnOnce() + Send + 'static) {
        *self.apply_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Run `hook` once, just before the first `revert_leave` records.
    pub fn on_first_revert(&self, hook: impl FnOnce() + Send + 'static) {
        *self.revert_hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl AttendanceBridge for RecordingBridge {
    fn apply_leave(
        &self,
        employee_id: &str,
        date: Day,
        _leave_request_id: &str,
        _half_day_part: Option<HalfDayPart>,
        _actor_id: &str,
    ) -> anyhow::Result<()> {
        let hook = self.apply_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        if self.fail_on.lock().unwrap().is_some_and(|d| d == date) {
            anyhow::bail!("attendance row for {date} is locked");
        }
        self.applied
            .lock()
            .unwrap()
            .push((employee_id.to_string(), date));
        Ok(())
    }

    fn revert_leave(
        &self,
        employee_id: &str,
        date: Day,
        _leave_request_id: &str,
        _actor_id: &str,
    ) -> anyhow::Result<()> {
        let hook = self.revert_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.reverted
            .lock()
            .unwrap()
            .push((employee_id.to_string(), date));
        Ok(())
    }
}

/// Grants everything except the month-close override.
pub struct NoOverrideAccess;

impl AccessGuard for NoOverrideAccess {
    fn actor_can_access_employee(&self, _: &str, _: &str, _: &str) -> bool {
        true
    }

    fn actor_has_company_permission(&self, _: &str, perm: &str) -> bool {
        perm != permission::LEAVE_MONTH_CLOSE_OVERRIDE
    }
}

pub struct DenyAllAccess;

impl AccessGuard for DenyAllAccess {
    fn actor_can_access_employee(&self, _: &str, _: &str, _: &str) -> bool {
        false
    }

    fn actor_has_company_permission(&self, _: &str, _: &str) -> bool {
        false
    }
}

/// Calendar with an explicit closed-month list; month-close is engaged.
pub struct ClosedMonths(pub Vec<Month>);

impl MonthCloseCalendar for ClosedMonths {
    fn month_close_enabled(&self) -> bool {
        true
    }

    fn month_status(&self, month: Month) -> MonthStatus {
        if self.0.contains(&month) {
            MonthStatus::Closed
        } else {
            MonthStatus::Open
        }
    }
}

/// One assembled service over its own sled db. The temp dir must outlive the
/// db handle, so it rides along.
pub struct Harness {
    pub service: Arc<LeaveService>,
    pub db: Arc<sled::Db>,
    pub attendance: Arc<RecordingBridge>,
    _tmp: TempDir,
}

pub fn harness(name: &str, config: LeaveConfig) -> anyhow::Result<Harness> {
    harness_with(name, config, Arc::new(AllowAllAccess), Arc::new(AlwaysOpen))
}

pub fn harness_with(
    name: &str,
    config: LeaveConfig,
    access: Arc<dyn AccessGuard + Send + Sync>,
    months: Arc<dyn MonthCloseCalendar + Send + Sync>,
) -> anyhow::Result<Harness> {
    // Sled uses file-based locking, so every test gets its own database
    // under a temp dir for simplified cleanup.
    let tmp = tempfile::tempdir()?;
    let db = Arc::new(sled::open(tmp.path().join(format!("{name}.db")))?);
    db.clear()?;

    let attendance = Arc::new(RecordingBridge::default());
    let service = Arc::new(LeaveService::new(
        db.clone(),
        Arc::new(config),
        access,
        months,
        attendance.clone(),
    ));
    Ok(Harness {
        service,
        db,
        attendance,
        _tmp: tmp,
    })
}

pub fn day(y: i32, m: u32, d: u32) -> Day {
    Day::from_ymd(y, m, d).unwrap()
}

/// Seed an active, paid leave type supporting half days.
pub fn seed_annual_leave(h: &Harness) -> anyhow::Result<LeaveType> {
    let lt = LeaveType::new("lt-annual", "AL", "Annual Leave");
    h.service.upsert_leave_type(&lt)?;
    Ok(lt)
}
