//! Tenant-wide leave configuration and the admissibility guards evaluated
//! before any state mutation.

use crate::error::EngineError;
use crate::guards::{AccessGuard, MonthCloseCalendar, MonthStatus, permission};
use crate::leave_type::LeaveType;
use crate::time::{Day, months_in_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalLevels {
    One,
    Two,
}

#[derive(Debug, Clone)]
pub struct LeaveConfig {
    pub enabled: bool,
    pub approval_levels: ApprovalLevels,
    pub allow_half_day: bool,
    pub allow_backdated: bool,
    pub backdate_limit_days: u32,
    pub attachments_enabled: bool,
}

impl Default for LeaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            approval_levels: ApprovalLevels::One,
            allow_half_day: true,
            allow_backdated: false,
            backdate_limit_days: 0,
            attachments_enabled: false,
        }
    }
}

impl LeaveConfig {
    pub fn two_level(mut self) -> Self {
        self.approval_levels = ApprovalLevels::Two;
        self
    }

    pub fn backdated(mut self, limit_days: u32) -> Self {
        self.allow_backdated = true;
        self.backdate_limit_days = limit_days;
        self
    }
}

/// Where the tenant configuration comes from. A fixed `LeaveConfig` is its
/// own source, which covers static deployments and tests.
pub trait ConfigSource {
    fn read_leave_config(&self) -> LeaveConfig;
}

impl ConfigSource for LeaveConfig {
    fn read_leave_config(&self) -> LeaveConfig {
        self.clone()
    }
}

pub fn assert_enabled(cfg: &LeaveConfig) -> Result<(), EngineError> {
    if !cfg.enabled {
        return Err(EngineError::Disabled);
    }
    Ok(())
}

pub fn assert_date_range(start: Day, end: Day) -> Result<(), EngineError> {
    if start > end {
        return Err(EngineError::validation(
            "start date must not be after end date",
        ));
    }
    Ok(())
}

pub fn assert_same_year(start: Day, end: Day) -> Result<(), EngineError> {
    if start.year() != end.year() {
        return Err(EngineError::validation(
            "leave requests cannot span multiple years",
        ));
    }
    Ok(())
}

pub fn assert_backdated_allowed(
    cfg: &LeaveConfig,
    start: Day,
    today: Day,
) -> Result<(), EngineError> {
    if !cfg.allow_backdated {
        if start < today {
            return Err(EngineError::validation(
                "backdated leave requests are not allowed",
            ));
        }
        return Ok(());
    }

    let limit = i64::from(cfg.backdate_limit_days);
    if limit <= 0 {
        return Ok(());
    }
    if start.days_until(today) > limit {
        return Err(EngineError::validation(
            "backdated leave request exceeds the configured limit",
        ));
    }
    Ok(())
}

pub fn assert_half_day_allowed(cfg: &LeaveConfig, lt: &LeaveType) -> Result<(), EngineError> {
    if !cfg.allow_half_day {
        return Err(EngineError::validation("half-day leave is disabled"));
    }
    if !lt.supports_half_day {
        return Err(EngineError::validation(format!(
            "leave type {} does not support half-day requests",
            lt.code
        )));
    }
    Ok(())
}

/// Month-close gate over every month the range touches. Closed months need
/// the company-wide override permission plus a non-empty reason; the first
/// offending month fails the whole operation before anything mutates.
pub fn assert_months_open(
    calendar: &dyn MonthCloseCalendar,
    access: &dyn AccessGuard,
    start: Day,
    end: Day,
    actor_id: &str,
    override_reason: Option<&str>,
) -> Result<(), EngineError> {
    if !calendar.month_close_enabled() {
        return Ok(());
    }

    for month in months_in_range(start, end) {
        if calendar.month_status(month) == MonthStatus::Closed {
            if !access
                .actor_has_company_permission(actor_id, permission::LEAVE_MONTH_CLOSE_OVERRIDE)
            {
                return Err(EngineError::MonthClosed { month });
            }
            if override_reason.map_or(true, |r| r.trim().is_empty()) {
                return Err(EngineError::validation(
                    "a reason is required to override a closed month",
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::guards::AllowAllAccess;
    use crate::time::Month;

    fn day(y: i32, m: u32, d: u32) -> Day {
        Day::from_ymd(y, m, d).unwrap()
    }

    struct Closed(Vec<Month>);

    impl MonthCloseCalendar for Closed {
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

    struct NoOverride;

    impl AccessGuard for NoOverride {
        fn actor_can_access_employee(&self, _: &str, _: &str, _: &str) -> bool {
            true
        }

        fn actor_has_company_permission(&self, _: &str, _: &str) -> bool {
            false
        }
    }

    #[test]
    fn disabled_module_is_forbidden() {
        let cfg = LeaveConfig {
            enabled: false,
            ..LeaveConfig::default()
        };
        assert_eq!(assert_enabled(&cfg).unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn backdating_disabled_rejects_past_start() {
        let cfg = LeaveConfig::default();
        let today = day(2026, 6, 15);
        assert!(assert_backdated_allowed(&cfg, day(2026, 6, 14), today).is_err());
        assert!(assert_backdated_allowed(&cfg, today, today).is_ok());
        assert!(assert_backdated_allowed(&cfg, day(2026, 6, 20), today).is_ok());
    }

    #[test]
    fn backdate_limit_caps_how_far_back() {
        let cfg = LeaveConfig::default().backdated(5);
        let today = day(2026, 6, 15);
        assert!(assert_backdated_allowed(&cfg, day(2026, 6, 10), today).is_ok());
        assert!(assert_backdated_allowed(&cfg, day(2026, 6, 9), today).is_err());
    }

    #[test]
    fn zero_backdate_limit_means_unlimited() {
        let cfg = LeaveConfig::default().backdated(0);
        assert!(assert_backdated_allowed(&cfg, day(2026, 1, 1), day(2026, 12, 1)).is_ok());
    }

    #[test]
    fn closed_month_without_override_is_forbidden() {
        let calendar = Closed(vec![Month {
            year: 2026,
            month: 2,
        }]);
        let err = assert_months_open(
            &calendar,
            &NoOverride,
            day(2026, 1, 30),
            day(2026, 2, 2),
            "actor-1",
            Some("valid reason"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn closed_month_override_needs_a_reason() {
        let calendar = Closed(vec![Month {
            year: 2026,
            month: 2,
        }]);
        let err = assert_months_open(
            &calendar,
            &AllowAllAccess,
            day(2026, 2, 1),
            day(2026, 2, 3),
            "actor-1",
            Some("   "),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(
            assert_months_open(
                &calendar,
                &AllowAllAccess,
                day(2026, 2, 1),
                day(2026, 2, 3),
                "actor-1",
                Some("closing the books late"),
            )
            .is_ok()
        );
    }

    #[test]
    fn disabled_calendar_gates_nothing() {
        let calendar = crate::guards::AlwaysOpen;
        assert!(
            assert_months_open(
                &calendar,
                &NoOverride,
                day(2026, 1, 1),
                day(2026, 12, 31),
                "actor-1",
                None,
            )
            .is_ok()
        );
    }
}
