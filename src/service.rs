//! Service layer API for the leave request lifecycle.
//!
//! Every mutating operation runs its guard checks first (nothing mutated),
//! then one sled transaction covering the request row, the overlap registry,
//! the balance row, and the audit record. Attendance-bridge calls are
//! external side effects and run outside the transaction under a
//! compensating-action discipline: apply, then commit; revert what was
//! applied if the commit fails.

use crate::audit::{AuditAction, AuditRecord, EntityKind};
use crate::balance::{self, LeaveBalance};
use crate::error::EngineError;
use crate::guards::{AccessGuard, AttendanceBridge, MonthCloseCalendar, permission};
use crate::leave_type::LeaveType;
use crate::policy::{self, ApprovalLevels, ConfigSource, LeaveConfig};
use crate::request::{
    ActiveSpan, LeaveRequest, LeaveRequestDraft, LeaveStatus, LeaveUnit, PendingKind,
    ranges_overlap,
};
use crate::store;
use crate::time::{Day, TimeStamp};
use crate::units::Units;
use crate::utils;
use sled::transaction::abort;
use std::cmp::Reverse;
use std::sync::Arc;

/// Filters for [`LeaveService::list_leave_requests`]. Status matching folds
/// the legacy `Submitted` alias into `PendingL1`.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub employee_id: Option<String>,
    pub status: Option<LeaveStatus>,
}

/// Input for [`LeaveService::grant_leave_balance`]. `opening_balance` only
/// overwrites an existing row's opening when explicitly supplied.
#[derive(Debug, Clone)]
pub struct BalanceGrant {
    pub employee_id: String,
    pub leave_type_id: String,
    pub year: i32,
    pub opening_balance: Option<Units>,
    pub grant_amount: Units,
    pub reason: String,
}

pub struct LeaveService {
    db: Arc<sled::Db>,
    config: Arc<dyn ConfigSource + Send + Sync>,
    access: Arc<dyn AccessGuard + Send + Sync>,
    months: Arc<dyn MonthCloseCalendar + Send + Sync>,
    attendance: Arc<dyn AttendanceBridge + Send + Sync>,
}

impl LeaveService {
    pub fn new(
        db: Arc<sled::Db>,
        config: Arc<dyn ConfigSource + Send + Sync>,
        access: Arc<dyn AccessGuard + Send + Sync>,
        months: Arc<dyn MonthCloseCalendar + Send + Sync>,
        attendance: Arc<dyn AttendanceBridge + Send + Sync>,
    ) -> Self {
        Self {
            db,
            config,
            access,
            months,
            attendance,
        }
    }

    /// Submit a new leave request; it lands in `PendingL1`.
    pub fn create_leave_request(
        &self,
        draft: LeaveRequestDraft,
        actor_id: &str,
    ) -> Result<LeaveRequest, EngineError> {
        let cfg = self.config.read_leave_config();
        policy::assert_enabled(&cfg)?;

        let employee_id = draft
            .employee_id
            .clone()
            .ok_or_else(|| EngineError::validation("employee id is required"))?;
        let leave_type_id = draft
            .leave_type_id
            .clone()
            .ok_or_else(|| EngineError::validation("leave type id is required"))?;
        let start = draft
            .start_date
            .ok_or_else(|| EngineError::validation("start date is required"))?;
        let end = draft
            .end_date
            .ok_or_else(|| EngineError::validation("end date is required"))?;
        policy::assert_date_range(start, end)?;
        policy::assert_same_year(start, end)?;
        let reason = trimmed_reason(draft.reason.as_deref().unwrap_or(""))?;

        // Part is required for a half day; a part supplied alongside a full
        // day is dropped rather than rejected.
        let half_day_part = match draft.unit {
            LeaveUnit::HalfDay => Some(draft.half_day_part.ok_or_else(|| {
                EngineError::validation("half day part is required for half-day requests")
            })?),
            LeaveUnit::FullDay => None,
        };

        policy::assert_backdated_allowed(&cfg, start, Day::today())?;
        self.check_access(actor_id, permission::LEAVE_APPLY_SELF, &employee_id)?;
        policy::assert_months_open(
            self.months.as_ref(),
            self.access.as_ref(),
            start,
            end,
            actor_id,
            Some(reason.as_str()),
        )?;

        let lt = self.require_active_leave_type(&leave_type_id)?;
        if draft.unit == LeaveUnit::HalfDay {
            policy::assert_half_day_allowed(&cfg, &lt)?;
        }

        let units = balance::leave_units(start, end, draft.unit);
        let now = TimeStamp::new();
        let row = LeaveRequest {
            id: new_id(utils::LEAVE_REQUEST_HRP)?,
            employee_id: employee_id.clone(),
            leave_type_id: leave_type_id.clone(),
            start_date: start,
            end_date: end,
            unit: draft.unit,
            half_day_part,
            units,
            reason: reason.clone(),
            status: LeaveStatus::PendingL1,
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
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        let audit_id = new_id(utils::AUDIT_HRP)?;
        let balance_key = store::balance_key(&employee_id, &leave_type_id, start.year());
        let active_key = store::active_key(&employee_id);
        let paid = lt.is_paid;

        let res = self
            .db
            .transaction(|tx| -> store::TxResult<LeaveRequest> {
                let mut spans: Vec<ActiveSpan> =
                    store::tx_get(tx, &active_key)?.unwrap_or_default();
                if let Some(hit) = spans
                    .iter()
                    .find(|s| ranges_overlap(start, end, s.start, s.end))
                {
                    return abort(EngineError::Overlap {
                        id: hit.request_id.clone(),
                    });
                }

                // Paid leave needs sufficient balance, checked but not
                // reserved; consumption happens at final approval.
                if paid {
                    let bal: LeaveBalance = match store::tx_get(tx, &balance_key)? {
                        Some(bal) => bal,
                        None => {
                            return abort(EngineError::NotFound {
                                entity: "leave balance",
                                id: format!(
                                    "{employee_id}/{leave_type_id}/{}",
                                    start.year()
                                ),
                            });
                        }
                    };
                    if bal.available < units {
                        return abort(EngineError::InsufficientBalance {
                            requested: units,
                            available: bal.available,
                        });
                    }
                }

                store::tx_put(tx, &store::request_key(&row.id), &row)?;
                spans.push(ActiveSpan {
                    request_id: row.id.clone(),
                    start,
                    end,
                });
                store::tx_put(tx, &active_key, &spans)?;

                let audit = AuditRecord::record(
                    &audit_id,
                    EntityKind::LeaveRequest,
                    &row.id,
                    AuditAction::RequestCreate,
                    None,
                    Some(&row),
                    actor_id,
                    Some(reason.as_str()),
                    TimeStamp::new(),
                )
                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;

                Ok(row.clone())
            });
        let created = res.map_err(EngineError::from)?;
        tracing::info!(id = %created.id, employee = %created.employee_id, "leave request created");
        Ok(created)
    }

    /// Approve a pending request. Under a two-level policy the first call
    /// stamps L1 and moves the row to `PendingL2`; the final call consumes
    /// balance (if paid) and syncs attendance for every day in range.
    pub fn approve_leave_request(
        &self,
        id: &str,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<LeaveRequest, EngineError> {
        let cfg = self.config.read_leave_config();
        policy::assert_enabled(&cfg)?;
        let reason: Option<String> = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let before = self.require_request(id)?;
        let kind = before.pending_kind(cfg.approval_levels);
        if kind == PendingKind::NotPending {
            return Err(EngineError::validation(
                "leave request is not pending approval",
            ));
        }

        let required = approval_permission(&cfg, &before);
        self.check_access(actor_id, required, &before.employee_id)?;
        policy::assert_months_open(
            self.months.as_ref(),
            self.access.as_ref(),
            before.start_date,
            before.end_date,
            actor_id,
            reason.as_deref(),
        )?;

        match kind {
            PendingKind::FirstOfTwo => self.stamp_first_approval(&before, actor_id, reason),
            PendingKind::LegacyMissingL2 => self.stamp_legacy_l2(&before, actor_id, reason),
            PendingKind::Final => self.finalize_approval(&before, &cfg, actor_id, reason),
            PendingKind::NotPending => unreachable!("rejected above"),
        }
    }

    /// Reject a pending request. No balance was consumed, so none moves.
    pub fn reject_leave_request(
        &self,
        id: &str,
        actor_id: &str,
        reason: &str,
    ) -> Result<LeaveRequest, EngineError> {
        let cfg = self.config.read_leave_config();
        policy::assert_enabled(&cfg)?;
        let reason = trimmed_reason(reason)?;

        let before = self.require_request(id)?;
        if !before.status.is_pending() {
            return Err(EngineError::validation(
                "leave request is not pending approval",
            ));
        }

        let required = approval_permission(&cfg, &before);
        self.check_access(actor_id, required, &before.employee_id)?;
        policy::assert_months_open(
            self.months.as_ref(),
            self.access.as_ref(),
            before.start_date,
            before.end_date,
            actor_id,
            Some(reason.as_str()),
        )?;

        let now = TimeStamp::new();
        let audit_id = new_id(utils::AUDIT_HRP)?;
        let request_key = store::request_key(id);
        let active_key = store::active_key(&before.employee_id);

        let res = self
            .db
            .transaction(|tx| -> store::TxResult<LeaveRequest> {
                let current = require_current(tx, &request_key, &before)?;

                let mut updated = current.clone();
                updated.status = LeaveStatus::Rejected;
                updated.rejected_by = Some(actor_id.to_string());
                updated.rejected_at = Some(now.clone());
                updated.rejection_reason = Some(reason.clone());
                updated.version += 1;
                updated.updated_at = now.clone();
                store::tx_put(tx, &request_key, &updated)?;

                remove_span(tx, &active_key, &updated.id)?;

                let audit = AuditRecord::record(
                    &audit_id,
                    EntityKind::LeaveRequest,
                    &updated.id,
                    AuditAction::RequestReject,
                    Some(&current),
                    Some(&updated),
                    actor_id,
                    Some(reason.as_str()),
                    TimeStamp::new(),
                )
                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;

                Ok(updated)
            });
        let updated = res.map_err(EngineError::from)?;
        tracing::info!(id = %updated.id, "leave request rejected");
        Ok(updated)
    }

    /// Cancel a request. Idempotent on an already-cancelled row; restores
    /// balance and reverts attendance when the row had reached `Approved`.
    pub fn cancel_leave_request(
        &self,
        id: &str,
        actor_id: &str,
        reason: &str,
    ) -> Result<LeaveRequest, EngineError> {
        let cfg = self.config.read_leave_config();
        policy::assert_enabled(&cfg)?;
        let reason = trimmed_reason(reason)?;

        let before = self.require_request(id)?;
        if before.status == LeaveStatus::Cancelled {
            return Ok(before);
        }
        if before.status == LeaveStatus::Rejected {
            return Err(EngineError::validation(
                "cannot cancel a rejected leave request",
            ));
        }

        // Self-cancel needs no permission; cancelling someone else's does.
        if before.employee_id != actor_id {
            self.check_access(actor_id, permission::LEAVE_REQUEST_CANCEL, &before.employee_id)?;
        }
        policy::assert_months_open(
            self.months.as_ref(),
            self.access.as_ref(),
            before.start_date,
            before.end_date,
            actor_id,
            Some(reason.as_str()),
        )?;

        let was_approved = before.status == LeaveStatus::Approved;
        let lt = self.require_leave_type(&before.leave_type_id)?;
        if was_approved {
            // Bridge calls are external side effects; fail on a stale row
            // before touching them.
            self.assert_unchanged(&before)?;
            self.revert_attendance(&before, actor_id)?;
        }

        let now = TimeStamp::new();
        let audit_id = new_id(utils::AUDIT_HRP)?;
        let balance_audit_id = new_id(utils::AUDIT_HRP)?;
        let request_key = store::request_key(id);
        let active_key = store::active_key(&before.employee_id);
        let balance_key =
            store::balance_key(&before.employee_id, &before.leave_type_id, before.year());
        let restore_balance = was_approved && lt.is_paid;

        let res = self
            .db
            .transaction(|tx| -> store::TxResult<LeaveRequest> {
                let current = require_current(tx, &request_key, &before)?;

                // Restore what final approval consumed. A missing balance
                // row is skipped, matching how historical rows behave.
                if restore_balance {
                    if let Some(bal) = store::tx_get::<LeaveBalance>(tx, &balance_key)? {
                        let mut updated_bal = bal.clone();
                        updated_bal.restore(before.units);
                        updated_bal.version += 1;
                        updated_bal.updated_at = now.clone();
                        updated_bal.updated_by = Some(actor_id.to_string());
                        store::tx_put(tx, &balance_key, &updated_bal)?;

                        let audit = AuditRecord::record(
                            &balance_audit_id,
                            EntityKind::LeaveBalance,
                            &bal.id,
                            AuditAction::BalanceRestore,
                            Some(&bal),
                            Some(&updated_bal),
                            actor_id,
                            Some(reason.as_str()),
                            TimeStamp::new(),
                        )
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                        store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;
                    }
                }

                let mut updated = current.clone();
                updated.status = LeaveStatus::Cancelled;
                updated.cancelled_by = Some(actor_id.to_string());
                updated.cancelled_at = Some(now.clone());
                updated.cancel_reason = Some(reason.clone());
                updated.version += 1;
                updated.updated_at = now.clone();
                store::tx_put(tx, &request_key, &updated)?;

                remove_span(tx, &active_key, &updated.id)?;

                let audit = AuditRecord::record(
                    &audit_id,
                    EntityKind::LeaveRequest,
                    &updated.id,
                    AuditAction::RequestCancel,
                    Some(&current),
                    Some(&updated),
                    actor_id,
                    Some(reason.as_str()),
                    TimeStamp::new(),
                )
                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;

                Ok(updated)
            });

        match res {
            Ok(updated) => {
                tracing::info!(id = %updated.id, "leave request cancelled");
                Ok(updated)
            }
            Err(err) => {
                // The attendance revert already happened. A competing cancel
                // may have committed during the bridge pass and wants those
                // days reverted, so put them back only when the row provably
                // did not reach Cancelled.
                if was_approved {
                    let winner_cancelled = matches!(
                        store::get_row::<LeaveRequest>(&self.db, &request_key),
                        Ok(Some(current)) if current.status == LeaveStatus::Cancelled
                    );
                    if !winner_cancelled {
                        self.reapply_attendance_best_effort(&before, actor_id);
                    }
                }
                Err(EngineError::from(err))
            }
        }
    }

    /// Grant balance for an (employee, leave type, year); creates the row on
    /// first grant, adds to the granted pool afterwards.
    pub fn grant_leave_balance(
        &self,
        grant: BalanceGrant,
        actor_id: &str,
    ) -> Result<LeaveBalance, EngineError> {
        let cfg = self.config.read_leave_config();
        policy::assert_enabled(&cfg)?;

        if !(1900..=9999).contains(&grant.year) {
            return Err(EngineError::validation("invalid year"));
        }
        if grant.grant_amount.is_negative()
            || grant.opening_balance.is_some_and(Units::is_negative)
        {
            return Err(EngineError::validation("balance amounts must not be negative"));
        }
        let reason = trimmed_reason(&grant.reason)?;

        self.check_access(actor_id, permission::LEAVE_BALANCE_GRANT, &grant.employee_id)?;
        self.require_active_leave_type(&grant.leave_type_id)?;

        let now = TimeStamp::new();
        let row_id = new_id(utils::BALANCE_HRP)?;
        let audit_id = new_id(utils::AUDIT_HRP)?;
        let balance_key =
            store::balance_key(&grant.employee_id, &grant.leave_type_id, grant.year);

        let res = self
            .db
            .transaction(|tx| -> store::TxResult<LeaveBalance> {
                let (previous, updated) =
                    match store::tx_get::<LeaveBalance>(tx, &balance_key)? {
                        None => {
                            let row = LeaveBalance::open(
                                row_id.clone(),
                                grant.employee_id.clone(),
                                grant.leave_type_id.clone(),
                                grant.year,
                                grant.opening_balance.unwrap_or(Units::ZERO),
                                grant.grant_amount,
                                now.clone(),
                                actor_id,
                            );
                            (None, row)
                        }
                        Some(existing) => {
                            let mut row = existing.clone();
                            row.grant(grant.opening_balance, grant.grant_amount);
                            row.version += 1;
                            row.updated_at = now.clone();
                            row.updated_by = Some(actor_id.to_string());
                            (Some(existing), row)
                        }
                    };
                store::tx_put(tx, &balance_key, &updated)?;

                let audit = AuditRecord::record(
                    &audit_id,
                    EntityKind::LeaveBalance,
                    &updated.id,
                    AuditAction::BalanceGrant,
                    previous.as_ref(),
                    Some(&updated),
                    actor_id,
                    Some(reason.as_str()),
                    TimeStamp::new(),
                )
                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;

                Ok(updated)
            });
        let updated = res.map_err(EngineError::from)?;
        tracing::info!(
            employee = %updated.employee_id,
            year = updated.year,
            available = %updated.available,
            "leave balance granted"
        );
        Ok(updated)
    }

    pub fn get_leave_request(&self, id: &str) -> Result<LeaveRequest, EngineError> {
        self.require_request(id)
    }

    /// Newest-first listing with optional employee and status filters.
    pub fn list_leave_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<LeaveRequest>, EngineError> {
        let mut rows: Vec<LeaveRequest> =
            store::scan_rows(&self.db, store::REQUEST_PREFIX.as_bytes())?;
        if let Some(employee_id) = filter.employee_id.as_deref() {
            rows.retain(|r| r.employee_id == employee_id);
        }
        if let Some(status) = filter.status {
            rows.retain(|r| r.status.normalized() == status.normalized());
        }
        rows.sort_by_key(|r| Reverse(r.created_at.unix_nanos()));
        Ok(rows)
    }

    pub fn get_leave_balances(
        &self,
        employee_id: Option<&str>,
        year: Option<i32>,
    ) -> Result<Vec<LeaveBalance>, EngineError> {
        let prefix = match employee_id {
            Some(employee_id) => store::balance_prefix(employee_id),
            None => store::BALANCE_PREFIX.as_bytes().to_vec(),
        };
        let mut rows: Vec<LeaveBalance> = store::scan_rows(&self.db, &prefix)?;
        if let Some(year) = year {
            rows.retain(|b| b.year == year);
        }
        Ok(rows)
    }

    /// Seed or update leave type reference data. The administrative CRUD
    /// around leave types lives outside this engine.
    pub fn upsert_leave_type(&self, lt: &LeaveType) -> Result<(), EngineError> {
        store::put_row(&self.db, &store::leave_type_key(&lt.id), lt)
    }

    pub fn leave_type(&self, id: &str) -> Result<LeaveType, EngineError> {
        self.require_leave_type(id)
    }

    /// The full audit trail, oldest first.
    pub fn audit_log(&self) -> Result<Vec<AuditRecord>, EngineError> {
        let mut rows: Vec<AuditRecord> =
            store::scan_rows(&self.db, store::AUDIT_PREFIX.as_bytes())?;
        rows.sort_by_key(|r| r.at.unix_nanos());
        Ok(rows)
    }

    // ----- approval branches -----

    fn stamp_first_approval(
        &self,
        before: &LeaveRequest,
        actor_id: &str,
        reason: Option<String>,
    ) -> Result<LeaveRequest, EngineError> {
        let now = TimeStamp::new();
        let audit_id = new_id(utils::AUDIT_HRP)?;
        let request_key = store::request_key(&before.id);

        let res = self
            .db
            .transaction(|tx| -> store::TxResult<LeaveRequest> {
                let current = require_current(tx, &request_key, before)?;

                let mut updated = current.clone();
                updated.status = LeaveStatus::PendingL2;
                updated.approved_l1_by = Some(actor_id.to_string());
                updated.approved_l1_at = Some(now.clone());
                updated.version += 1;
                updated.updated_at = now.clone();
                store::tx_put(tx, &request_key, &updated)?;

                let audit = AuditRecord::record(
                    &audit_id,
                    EntityKind::LeaveRequest,
                    &updated.id,
                    AuditAction::RequestApproveL1,
                    Some(&current),
                    Some(&updated),
                    actor_id,
                    reason.as_deref(),
                    TimeStamp::new(),
                )
                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;

                Ok(updated)
            });
        let updated = res.map_err(EngineError::from)?;
        tracing::info!(id = %updated.id, "leave request approved at level 1");
        Ok(updated)
    }

    /// Compatibility shim for rows already `Approved` with the L2 stamp
    /// missing: stamp L2 only. The final-approval side effects fired when
    /// the row was originally approved, so nothing else may run again.
    fn stamp_legacy_l2(
        &self,
        before: &LeaveRequest,
        actor_id: &str,
        reason: Option<String>,
    ) -> Result<LeaveRequest, EngineError> {
        let now = TimeStamp::new();
        let audit_id = new_id(utils::AUDIT_HRP)?;
        let request_key = store::request_key(&before.id);

        let res = self
            .db
            .transaction(|tx| -> store::TxResult<LeaveRequest> {
                let current = require_current(tx, &request_key, before)?;

                let mut updated = current.clone();
                updated.approved_l2_by = Some(actor_id.to_string());
                updated.approved_l2_at = Some(now.clone());
                updated.version += 1;
                updated.updated_at = now.clone();
                store::tx_put(tx, &request_key, &updated)?;

                let audit = AuditRecord::record(
                    &audit_id,
                    EntityKind::LeaveRequest,
                    &updated.id,
                    AuditAction::RequestApproveL2,
                    Some(&current),
                    Some(&updated),
                    actor_id,
                    reason.as_deref(),
                    TimeStamp::new(),
                )
                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;

                Ok(updated)
            });
        let updated = res.map_err(EngineError::from)?;
        tracing::info!(id = %updated.id, "stamped missing level-2 approval on legacy row");
        Ok(updated)
    }

    fn finalize_approval(
        &self,
        before: &LeaveRequest,
        cfg: &LeaveConfig,
        actor_id: &str,
        reason: Option<String>,
    ) -> Result<LeaveRequest, EngineError> {
        let lt = self.require_active_leave_type(&before.leave_type_id)?;

        // Bridge calls are external side effects; fail on a stale row before
        // touching them.
        self.assert_unchanged(before)?;
        self.apply_attendance(before, actor_id)?;

        let now = TimeStamp::new();
        let audit_id = new_id(utils::AUDIT_HRP)?;
        let balance_audit_id = new_id(utils::AUDIT_HRP)?;
        let request_key = store::request_key(&before.id);
        let balance_key =
            store::balance_key(&before.employee_id, &before.leave_type_id, before.year());
        let levels = cfg.approval_levels;
        let paid = lt.is_paid;

        let res = self
            .db
            .transaction(|tx| -> store::TxResult<LeaveRequest> {
                let current = require_current(tx, &request_key, before)?;

                if paid {
                    let bal: LeaveBalance = match store::tx_get(tx, &balance_key)? {
                        Some(bal) => bal,
                        None => {
                            return abort(EngineError::NotFound {
                                entity: "leave balance",
                                id: format!(
                                    "{}/{}/{}",
                                    before.employee_id,
                                    before.leave_type_id,
                                    before.year()
                                ),
                            });
                        }
                    };
                    let mut updated_bal = bal.clone();
                    if let Err(e) = updated_bal.consume(before.units) {
                        return abort(e);
                    }
                    updated_bal.version += 1;
                    updated_bal.updated_at = now.clone();
                    updated_bal.updated_by = Some(actor_id.to_string());
                    store::tx_put(tx, &balance_key, &updated_bal)?;

                    let audit = AuditRecord::record(
                        &balance_audit_id,
                        EntityKind::LeaveBalance,
                        &bal.id,
                        AuditAction::BalanceConsume,
                        Some(&bal),
                        Some(&updated_bal),
                        actor_id,
                        None,
                        TimeStamp::new(),
                    )
                    .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;
                }

                let mut updated = current.clone();
                updated.status = LeaveStatus::Approved;
                match levels {
                    ApprovalLevels::One => {
                        updated.approved_l1_by = Some(actor_id.to_string());
                        updated.approved_l1_at = Some(now.clone());
                    }
                    ApprovalLevels::Two => {
                        updated.approved_l2_by = Some(actor_id.to_string());
                        updated.approved_l2_at = Some(now.clone());
                    }
                }
                updated.version += 1;
                updated.updated_at = now.clone();
                store::tx_put(tx, &request_key, &updated)?;

                let action = match levels {
                    ApprovalLevels::One => AuditAction::RequestApprove,
                    ApprovalLevels::Two => AuditAction::RequestApproveL2,
                };
                let audit = AuditRecord::record(
                    &audit_id,
                    EntityKind::LeaveRequest,
                    &updated.id,
                    action,
                    Some(&current),
                    Some(&updated),
                    actor_id,
                    reason.as_deref(),
                    TimeStamp::new(),
                )
                .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                store::tx_put(tx, &store::audit_key(&audit.id), &audit)?;

                Ok(updated)
            });

        match res {
            Ok(updated) => {
                tracing::info!(id = %updated.id, "leave request approved");
                Ok(updated)
            }
            Err(err) => {
                // Attendance was applied ahead of the commit. A competing
                // approval may have committed during the bridge pass and owns
                // those days now, so take them back only when the row provably
                // did not reach Approved.
                let winner_approved = matches!(
                    store::get_row::<LeaveRequest>(&self.db, &request_key),
                    Ok(Some(current)) if current.status == LeaveStatus::Approved
                );
                if !winner_approved {
                    self.revert_attendance_best_effort(before, actor_id);
                }
                Err(EngineError::from(err))
            }
        }
    }

    // ----- attendance compensation -----

    /// Apply attendance for every day in range. All or nothing: a failed day
    /// reverts the days already applied and aborts the operation.
    fn apply_attendance(&self, row: &LeaveRequest, actor_id: &str) -> Result<(), EngineError> {
        let mut applied: Vec<Day> = Vec::new();
        for day in row.each_day() {
            if let Err(e) = self.attendance.apply_leave(
                &row.employee_id,
                day,
                &row.id,
                row.half_day_part,
                actor_id,
            ) {
                for done in &applied {
                    if let Err(revert_err) =
                        self.attendance
                            .revert_leave(&row.employee_id, *done, &row.id, actor_id)
                    {
                        tracing::warn!(
                            id = %row.id,
                            date = %done,
                            error = %revert_err,
                            "failed to revert attendance while compensating"
                        );
                    }
                }
                return Err(EngineError::Attendance {
                    date: day,
                    detail: e.to_string(),
                });
            }
            applied.push(day);
        }
        Ok(())
    }

    /// Revert attendance for every day in range; mirrors [`Self::apply_attendance`].
    fn revert_attendance(&self, row: &LeaveRequest, actor_id: &str) -> Result<(), EngineError> {
        let mut reverted: Vec<Day> = Vec::new();
        for day in row.each_day() {
            if let Err(e) =
                self.attendance
                    .revert_leave(&row.employee_id, day, &row.id, actor_id)
            {
                for done in &reverted {
                    if let Err(apply_err) = self.attendance.apply_leave(
                        &row.employee_id,
                        *done,
                        &row.id,
                        row.half_day_part,
                        actor_id,
                    ) {
                        tracing::warn!(
                            id = %row.id,
                            date = %done,
                            error = %apply_err,
                            "failed to re-apply attendance while compensating"
                        );
                    }
                }
                return Err(EngineError::Attendance {
                    date: day,
                    detail: e.to_string(),
                });
            }
            reverted.push(day);
        }
        Ok(())
    }

    fn revert_attendance_best_effort(&self, row: &LeaveRequest, actor_id: &str) {
        for day in row.each_day() {
            if let Err(e) =
                self.attendance
                    .revert_leave(&row.employee_id, day, &row.id, actor_id)
            {
                tracing::warn!(id = %row.id, date = %day, error = %e,
                    "failed to revert attendance after aborted approval");
            }
        }
    }

    fn reapply_attendance_best_effort(&self, row: &LeaveRequest, actor_id: &str) {
        for day in row.each_day() {
            if let Err(e) = self.attendance.apply_leave(
                &row.employee_id,
                day,
                &row.id,
                row.half_day_part,
                actor_id,
            ) {
                tracing::warn!(id = %row.id, date = %day, error = %e,
                    "failed to re-apply attendance after aborted cancel");
            }
        }
    }

    // ----- row lookups and guards -----

    /// Re-read the row and fail if it moved past the version the caller
    /// staged against. Used ahead of bridge passes, where the transactional
    /// check would come too late.
    fn assert_unchanged(&self, before: &LeaveRequest) -> Result<(), EngineError> {
        let current = self.require_request(&before.id)?;
        if current.version != before.version {
            return Err(EngineError::VersionConflict {
                entity: "leave request",
            });
        }
        Ok(())
    }

    fn require_request(&self, id: &str) -> Result<LeaveRequest, EngineError> {
        store::get_row(&self.db, &store::request_key(id))?.ok_or_else(|| EngineError::NotFound {
            entity: "leave request",
            id: id.to_string(),
        })
    }

    fn require_leave_type(&self, id: &str) -> Result<LeaveType, EngineError> {
        store::get_row(&self.db, &store::leave_type_key(id))?.ok_or_else(|| {
            EngineError::NotFound {
                entity: "leave type",
                id: id.to_string(),
            }
        })
    }

    fn require_active_leave_type(&self, id: &str) -> Result<LeaveType, EngineError> {
        let lt = self.require_leave_type(id)?;
        if !lt.is_active {
            return Err(EngineError::validation(format!(
                "leave type {} is inactive",
                lt.code
            )));
        }
        Ok(lt)
    }

    fn check_access(
        &self,
        actor_id: &str,
        required: &str,
        employee_id: &str,
    ) -> Result<(), EngineError> {
        if !self
            .access
            .actor_can_access_employee(actor_id, required, employee_id)
        {
            return Err(EngineError::Forbidden {
                permission: required.to_string(),
            });
        }
        Ok(())
    }
}

/// Which permission an approve/reject call needs: the level being granted,
/// resolved from whether L1 is already stamped.
fn approval_permission(cfg: &LeaveConfig, row: &LeaveRequest) -> &'static str {
    match cfg.approval_levels {
        ApprovalLevels::One => permission::LEAVE_APPROVE_L1,
        ApprovalLevels::Two if row.approved_l1_at.is_some() => permission::LEAVE_APPROVE_L2,
        ApprovalLevels::Two => permission::LEAVE_APPROVE_L1,
    }
}

/// Re-read the row inside the transaction and insist it still carries the
/// version the caller staged against; anything else is a conflict.
fn require_current(
    tx: &sled::transaction::TransactionalTree,
    request_key: &[u8],
    before: &LeaveRequest,
) -> store::TxResult<LeaveRequest> {
    let current: LeaveRequest = match store::tx_get(tx, request_key)? {
        Some(row) => row,
        None => {
            return abort(EngineError::NotFound {
                entity: "leave request",
                id: before.id.clone(),
            });
        }
    };
    if current.version != before.version {
        return abort(EngineError::VersionConflict {
            entity: "leave request",
        });
    }
    Ok(current)
}

/// Drop a request's span from the employee's overlap registry.
fn remove_span(
    tx: &sled::transaction::TransactionalTree,
    active_key: &[u8],
    request_id: &str,
) -> store::TxResult<()> {
    let mut spans: Vec<ActiveSpan> = store::tx_get(tx, active_key)?.unwrap_or_default();
    spans.retain(|s| s.request_id != request_id);
    if spans.is_empty() {
        store::tx_remove(tx, active_key)?;
    } else {
        store::tx_put(tx, active_key, &spans)?;
    }
    Ok(())
}

fn trimmed_reason(reason: &str) -> Result<String, EngineError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("a reason is required"));
    }
    Ok(trimmed.to_string())
}

fn new_id(hrp: &str) -> Result<String, EngineError> {
    utils::new_uuid_to_bech32(hrp).map_err(|e| EngineError::Internal(format!("id generation: {e}")))
}
