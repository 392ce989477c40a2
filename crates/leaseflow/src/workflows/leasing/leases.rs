use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::applications::required_reason;
use super::audit::{self, AuditRecord};
use super::domain::{
    DepositDeduction, DepositRefund, DepositSettlement, DepositStatus, EntityKind, Lease, LeaseId,
    LeaseStatus, LeaseTermination, MoveOutDetails, MoveOutRecord, NoticeType, OrganizationId,
    Property, PropertyStatus, SecurityDeposit, Tenant, TenantId, TerminationNotice,
    TerminationType,
};
use super::ports::WorkflowAlert;
use super::store::Store;
use super::transitions::WorkflowState;
use super::unit_of_work::{UnitOfWork, UnitOfWorkExecutor, WorkflowError};
use crate::config::LeasingConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationNoticeRequest {
    pub notice_date: NaiveDate,
    pub move_out_date: NaiveDate,
    pub notice_type: NoticeType,
    pub reason: String,
}

/// Terms for the lease that replaces a renewed one. The start defaults to the
/// day after the current lease ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRenewal {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub monthly_rent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyTermination {
    pub termination_type: TerminationType,
    pub reason: String,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRefundRequest {
    pub amount: u32,
    pub method: String,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewedLease {
    pub previous: Lease,
    pub lease: Lease,
}

/// Orchestrates leases from activation to deposit settlement.
pub struct LeaseWorkflow<S> {
    executor: UnitOfWorkExecutor<S>,
    config: LeasingConfig,
}

impl<S> Clone for LeaseWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            config: self.config,
        }
    }
}

impl<S> LeaseWorkflow<S>
where
    S: Store + 'static,
{
    pub fn new(executor: UnitOfWorkExecutor<S>, config: LeasingConfig) -> Self {
        Self { executor, config }
    }

    pub fn activate(
        &self,
        id: &LeaseId,
        move_in_date: Option<NaiveDate>,
    ) -> Result<Lease, WorkflowError> {
        let window_days = self.config.activation_window_days;

        let lease = self.executor.execute("activate lease", |uow| {
            let mut lease = uow.require::<Lease>(id)?;
            let latest_start = uow.today() + Duration::days(window_days);
            if lease.status == LeaseStatus::Pending && lease.start_date > latest_start {
                return Err(WorkflowError::validation(format!(
                    "Lease {} starts on {} and cannot be activated more than {} days early",
                    lease.id, lease.start_date, window_days
                )));
            }

            change_status(
                uow,
                &mut lease,
                &[LeaseStatus::Pending],
                LeaseStatus::Active,
                "Activate",
                None,
            )?;
            if move_in_date.is_some() {
                lease.move_in_date = move_in_date;
            }

            let mut property = uow.require::<Property>(&lease.property_id)?;
            if audit::mirror(
                uow,
                &property.id,
                &mut property.status,
                PropertyStatus::Occupied,
                "Activate",
            ) {
                uow.stage(property);
            }
            set_tenant_active(uow, &lease.tenant_id, true, "Activate")?;

            uow.stage(lease.clone());
            Ok(lease)
        })?;

        info!(lease_id = %lease.id, "lease activated");
        Ok(lease)
    }

    pub fn record_termination_notice(
        &self,
        id: &LeaseId,
        request: TerminationNoticeRequest,
    ) -> Result<Lease, WorkflowError> {
        let lease = self.executor.execute("record termination notice", |uow| {
            let reason = required_reason(&request.reason, "record a termination notice")?;
            if request.move_out_date <= uow.today() {
                return Err(WorkflowError::validation(
                    "Move-out date must be in the future",
                ));
            }
            if request.notice_date > request.move_out_date {
                return Err(WorkflowError::validation(
                    "Notice date cannot be after the move-out date",
                ));
            }

            let mut lease = uow.require::<Lease>(id)?;
            change_status(
                uow,
                &mut lease,
                &[
                    LeaseStatus::Active,
                    LeaseStatus::MonthToMonth,
                    LeaseStatus::Renewed,
                ],
                LeaseStatus::NoticeGiven,
                "RecordTerminationNotice",
                Some(&reason),
            )?;
            lease.notice = Some(TerminationNotice {
                notice_date: request.notice_date,
                move_out_date: request.move_out_date,
                notice_type: request.notice_type,
                reason: reason.clone(),
            });

            uow.stage(lease.clone());
            uow.add_note(
                EntityKind::Lease,
                &lease.id,
                format!(
                    "Notice to vacate by {}: {reason}",
                    request.move_out_date
                ),
            );
            Ok(lease)
        })?;

        info!(lease_id = %lease.id, "termination notice recorded");
        Ok(lease)
    }

    pub fn convert_to_month_to_month(
        &self,
        id: &LeaseId,
        monthly_rent: Option<u32>,
    ) -> Result<Lease, WorkflowError> {
        self.executor.execute("convert lease to month-to-month", |uow| {
            if monthly_rent == Some(0) {
                return Err(WorkflowError::validation(
                    "Monthly rent must be greater than zero",
                ));
            }

            let mut lease = uow.require::<Lease>(id)?;
            let previous_rent = lease.monthly_rent;
            if !matches!(lease.status, LeaseStatus::Active | LeaseStatus::Expired) {
                return Err(status_mismatch(
                    &lease,
                    &[LeaseStatus::Active, LeaseStatus::Expired],
                    "ConvertToMonthToMonth",
                ));
            }
            if let Some(rent) = monthly_rent {
                lease.monthly_rent = rent;
            }

            let from = lease.status;
            lease.status = LeaseStatus::MonthToMonth;
            audit::record(
                uow,
                AuditRecord::transition(
                    &lease.id,
                    Some(from),
                    lease.status,
                    "ConvertToMonthToMonth",
                )
                .metadata("previous_rent", previous_rent)
                .metadata("monthly_rent", lease.monthly_rent),
            );

            uow.stage(lease.clone());
            Ok(lease)
        })
    }

    /// Replace a lease with the next link in its renewal chain.
    pub fn renew(&self, id: &LeaseId, renewal: LeaseRenewal) -> Result<RenewedLease, WorkflowError> {
        let renewed = self.executor.execute("renew lease", |uow| {
            if renewal.monthly_rent == 0 {
                return Err(WorkflowError::validation(
                    "Monthly rent must be greater than zero",
                ));
            }

            let mut previous = uow.require::<Lease>(id)?;
            if renewal.end_date <= previous.end_date {
                return Err(WorkflowError::validation(format!(
                    "Renewal end date must be after the current end date ({})",
                    previous.end_date
                )));
            }
            let start_date = match renewal.start_date {
                Some(start) => start,
                None => previous.end_date.succ_opt().ok_or_else(|| {
                    WorkflowError::validation("Current lease end date is out of range")
                })?,
            };
            if start_date >= renewal.end_date {
                return Err(WorkflowError::validation(
                    "Lease start date must be before the end date",
                ));
            }

            change_status(
                uow,
                &mut previous,
                &[
                    LeaseStatus::Active,
                    LeaseStatus::MonthToMonth,
                    LeaseStatus::NoticeGiven,
                ],
                LeaseStatus::Renewed,
                "RenewLease",
                None,
            )?;

            let lease = Lease {
                id: LeaseId::generate(),
                organization_id: previous.organization_id.clone(),
                property_id: previous.property_id.clone(),
                tenant_id: previous.tenant_id.clone(),
                lease_offer_id: None,
                previous_lease_id: Some(previous.id.clone()),
                renewal_number: previous.renewal_number + 1,
                status: LeaseStatus::Active,
                start_date,
                end_date: renewal.end_date,
                monthly_rent: renewal.monthly_rent,
                security_deposit: previous.security_deposit,
                move_in_date: previous.move_in_date,
                notice: None,
                termination: None,
                move_out: None,
                version: 0,
            };
            audit::record(
                uow,
                AuditRecord::transition(&lease.id, None, lease.status, "RenewLease")
                    .metadata("previous_lease_id", &previous.id)
                    .metadata("renewal_number", lease.renewal_number),
            );

            // The deposit follows the tenancy onto the newest lease.
            if let Some(mut deposit) = deposit_for(uow, &previous.id) {
                if deposit.status == DepositStatus::Held {
                    deposit.lease_id = lease.id.clone();
                    uow.stage(deposit);
                }
            }

            uow.stage(previous.clone());
            uow.stage(lease.clone());
            Ok(RenewedLease { previous, lease })
        })?;

        info!(
            previous_lease_id = %renewed.previous.id,
            lease_id = %renewed.lease.id,
            renewal_number = renewed.lease.renewal_number,
            "lease renewed"
        );
        Ok(renewed)
    }

    pub fn complete_move_out(
        &self,
        id: &LeaseId,
        actual_move_out_date: NaiveDate,
        details: Option<MoveOutDetails>,
    ) -> Result<Lease, WorkflowError> {
        let lease = self.executor.execute("complete move-out", |uow| {
            let mut lease = uow.require::<Lease>(id)?;
            change_status(
                uow,
                &mut lease,
                &[
                    LeaseStatus::NoticeGiven,
                    LeaseStatus::Expired,
                    LeaseStatus::Active,
                ],
                LeaseStatus::Terminated,
                "CompleteMoveOut",
                None,
            )?;
            lease.move_out = Some(MoveOutRecord {
                actual_move_out_date,
                details: details.clone().unwrap_or_default(),
            });

            release_property(uow, &lease, "CompleteMoveOut")?;
            deactivate_tenant_if_idle(uow, &lease, "CompleteMoveOut")?;

            uow.stage(lease.clone());
            Ok(lease)
        })?;

        info!(lease_id = %lease.id, "move-out completed");
        Ok(lease)
    }

    /// Terminate before the natural end. The property is released only once the
    /// effective date has arrived.
    pub fn early_terminate(
        &self,
        id: &LeaseId,
        termination: EarlyTermination,
    ) -> Result<Lease, WorkflowError> {
        let lease = self.executor.execute("terminate lease early", |uow| {
            let reason = required_reason(&termination.reason, "terminate a lease")?;

            let mut lease = uow.require::<Lease>(id)?;
            change_status(
                uow,
                &mut lease,
                &[
                    LeaseStatus::Active,
                    LeaseStatus::MonthToMonth,
                    LeaseStatus::NoticeGiven,
                    LeaseStatus::Pending,
                ],
                LeaseStatus::Terminated,
                "EarlyTerminate",
                Some(&reason),
            )?;
            lease.termination = Some(LeaseTermination {
                termination_type: termination.termination_type,
                reason: reason.clone(),
                effective_date: termination.effective_date,
                recorded_at: uow.now(),
            });

            if termination.effective_date <= uow.today() {
                release_property(uow, &lease, "EarlyTerminate")?;
            }
            deactivate_tenant_if_idle(uow, &lease, "EarlyTerminate")?;

            uow.stage(lease.clone());
            uow.add_note(
                EntityKind::Lease,
                &lease.id,
                format!("Lease terminated early: {reason}"),
            );
            uow.notify(
                WorkflowAlert::new("lease_terminated", EntityKind::Lease, &lease.id)
                    .detail("effective_date", termination.effective_date)
                    .detail("reason", &reason),
            );
            Ok(lease)
        })?;

        info!(lease_id = %lease.id, "lease terminated early");
        Ok(lease)
    }

    /// Expire every Active lease past its end date and release properties whose
    /// future-dated termination has since taken effect.
    pub fn expire_overdue_leases(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<usize, WorkflowError> {
        let expired = self.executor.execute_in(
            organization_id.clone(),
            "expire overdue leases",
            |uow| {
                let today = uow.today();
                let overdue = uow.find::<Lease>(|lease| {
                    lease.status == LeaseStatus::Active && lease.end_date < today
                });
                for mut lease in overdue.iter().cloned() {
                    audit::transition(
                        uow,
                        &lease.id,
                        &mut lease.status,
                        LeaseStatus::Expired,
                        "ExpireOverdueLeases",
                        None,
                    )?;
                    uow.stage(lease);
                }

                let lapsed = uow.find::<Lease>(|lease| {
                    lease.status == LeaseStatus::Terminated
                        && lease
                            .termination
                            .as_ref()
                            .is_some_and(|termination| termination.effective_date <= today)
                });
                for lease in &lapsed {
                    release_property(uow, lease, "ExpireOverdueLeases")?;
                }

                Ok(overdue.len())
            },
        )?;

        info!(organization_id = %organization_id, expired, "overdue leases expired");
        Ok(expired)
    }

    pub fn initiate_deposit_settlement(
        &self,
        lease_id: &LeaseId,
        deductions: Vec<DepositDeduction>,
    ) -> Result<SecurityDeposit, WorkflowError> {
        let deposit = self.executor.execute("initiate deposit settlement", |uow| {
            if deductions
                .iter()
                .any(|deduction| deduction.description.trim().is_empty())
            {
                return Err(WorkflowError::validation(
                    "Every deduction needs a description",
                ));
            }

            let lease = uow.require::<Lease>(lease_id)?;
            if !matches!(
                lease.status,
                LeaseStatus::NoticeGiven | LeaseStatus::Expired | LeaseStatus::Terminated
            ) {
                return Err(WorkflowError::validation(format!(
                    "Deposit settlement requires the lease to be NoticeGiven, Expired or Terminated (current: {})",
                    lease.status.label()
                )));
            }

            let mut deposit = deposit_for(uow, &lease.id).ok_or_else(|| {
                WorkflowError::validation(format!(
                    "No security deposit is recorded for lease {}",
                    lease.id
                ))
            })?;
            if deposit.status != DepositStatus::Held {
                return Err(WorkflowError::validation(format!(
                    "Security deposit {} has already been settled ({})",
                    deposit.id,
                    deposit.status.label()
                )));
            }

            let settlement = DepositSettlement::compute(deposit.amount, &deductions)
                .ok_or_else(|| {
                    WorkflowError::validation("Deposit deductions exceed the supported amount")
                })?;
            let target = if settlement.refund_amount > 0 {
                DepositStatus::PendingReturn
            } else {
                DepositStatus::Forfeited
            };

            let from = deposit.status;
            if !from.is_valid_transition(target) {
                return Err(WorkflowError::InvalidTransition(
                    from.invalid_transition_reason(target),
                ));
            }
            deposit.status = target;
            deposit.deductions = deductions.clone();
            deposit.refund_amount = Some(settlement.refund_amount);
            deposit.amount_owed = Some(settlement.amount_owed);
            deposit.settlement_initiated_at = Some(uow.now());
            audit::record(
                uow,
                AuditRecord::transition(&deposit.id, Some(from), target, "InitiateDepositSettlement")
                    .metadata("total_deductions", settlement.total_deductions)
                    .metadata("refund_amount", settlement.refund_amount)
                    .metadata("amount_owed", settlement.amount_owed),
            );

            uow.stage(deposit.clone());
            uow.notify(
                WorkflowAlert::new("deposit_settled", EntityKind::SecurityDeposit, &deposit.id)
                    .detail("lease_id", &lease.id)
                    .detail("refund_amount", settlement.refund_amount)
                    .detail("amount_owed", settlement.amount_owed),
            );
            Ok(deposit)
        })?;

        info!(
            lease_id = %lease_id,
            deposit_id = %deposit.id,
            status = deposit.status.label(),
            "deposit settlement initiated"
        );
        Ok(deposit)
    }

    pub fn record_deposit_refund(
        &self,
        lease_id: &LeaseId,
        request: DepositRefundRequest,
    ) -> Result<SecurityDeposit, WorkflowError> {
        self.executor.execute("record deposit refund", |uow| {
            let method = request.method.trim();
            if method.is_empty() {
                return Err(WorkflowError::validation("A refund method is required"));
            }

            let lease = uow.require::<Lease>(lease_id)?;
            let mut deposit = deposit_for(uow, &lease.id).ok_or_else(|| {
                WorkflowError::validation(format!(
                    "No security deposit is recorded for lease {}",
                    lease.id
                ))
            })?;
            if deposit.status == DepositStatus::Refunded {
                return Err(WorkflowError::validation(format!(
                    "Security deposit {} has already been refunded",
                    deposit.id
                )));
            }
            if request.amount > deposit.amount {
                return Err(WorkflowError::validation(format!(
                    "Refund of {} exceeds the deposit of {}",
                    request.amount, deposit.amount
                )));
            }
            if let Some(expected) = deposit.refund_amount {
                if expected != request.amount {
                    warn!(
                        deposit_id = %deposit.id,
                        expected,
                        refunded = request.amount,
                        "refund differs from settled amount"
                    );
                }
            }

            audit::transition(
                uow,
                &deposit.id,
                &mut deposit.status,
                DepositStatus::Refunded,
                "RecordDepositRefund",
                None,
            )?;
            deposit.refund_amount = Some(request.amount);
            deposit.refund = Some(DepositRefund {
                amount: request.amount,
                method: method.to_string(),
                reference: request.reference.clone(),
                refunded_at: uow.now(),
            });

            uow.stage(deposit.clone());
            uow.add_note(
                EntityKind::SecurityDeposit,
                &deposit.id,
                format!("Refunded {} by {method}", request.amount),
            );
            Ok(deposit)
        })
    }

    pub fn lease(&self, id: &LeaseId) -> Result<Lease, WorkflowError> {
        self.executor
            .execute("load lease", |uow| uow.require::<Lease>(id))
    }

    pub fn tenant(&self, id: &TenantId) -> Result<Tenant, WorkflowError> {
        self.executor
            .execute("load tenant", |uow| uow.require::<Tenant>(id))
    }

    pub fn deposit(&self, lease_id: &LeaseId) -> Result<Option<SecurityDeposit>, WorkflowError> {
        self.executor.execute("load security deposit", |uow| {
            let lease = uow.require::<Lease>(lease_id)?;
            Ok(deposit_for(uow, &lease.id))
        })
    }

    /// Every lease in the renewal chain containing `id`, oldest first.
    pub fn renewal_chain(&self, id: &LeaseId) -> Result<Vec<Lease>, WorkflowError> {
        self.executor.execute("load renewal chain", |uow| {
            let mut visited = BTreeSet::new();
            let mut root = uow.require::<Lease>(id)?;
            visited.insert(root.id.clone());
            while let Some(previous_id) = root.previous_lease_id.clone() {
                match uow.get::<Lease>(&previous_id) {
                    Some(previous) if visited.insert(previous.id.clone()) => root = previous,
                    _ => break,
                }
            }

            let mut chain = vec![root];
            let mut seen = BTreeSet::new();
            while let Some(current) = chain.last() {
                seen.insert(current.id.clone());
                let current_id = current.id.clone();
                let next = uow
                    .find::<Lease>(|lease| lease.previous_lease_id.as_ref() == Some(&current_id))
                    .into_iter()
                    .find(|lease| !seen.contains(&lease.id));
                match next {
                    Some(lease) => chain.push(lease),
                    None => break,
                }
            }
            Ok(chain)
        })
    }
}

fn status_mismatch(lease: &Lease, allowed: &[LeaseStatus], action: &str) -> WorkflowError {
    let allowed = allowed
        .iter()
        .map(|status| status.label())
        .collect::<Vec<_>>()
        .join(", ");
    WorkflowError::InvalidTransition(format!(
        "{action} requires lease {} to be one of [{allowed}] (current: {})",
        lease.id,
        lease.status.label()
    ))
}

/// Apply a lease status change permitted from `allowed` and record it.
///
/// Lease operations name their own source states, which in places go beyond the
/// lease transition table (for example Expired to Terminated on move-out).
fn change_status(
    uow: &mut UnitOfWork<'_>,
    lease: &mut Lease,
    allowed: &[LeaseStatus],
    to: LeaseStatus,
    action: &'static str,
    reason: Option<&str>,
) -> Result<(), WorkflowError> {
    if !allowed.contains(&lease.status) {
        return Err(status_mismatch(lease, allowed, action));
    }

    audit::assign(uow, &lease.id, &mut lease.status, to, action, reason);
    Ok(())
}

fn deposit_for(uow: &UnitOfWork<'_>, lease_id: &LeaseId) -> Option<SecurityDeposit> {
    uow.find::<SecurityDeposit>(|deposit| deposit.lease_id == *lease_id)
        .into_iter()
        .next()
}

/// Mark the property available unless another lease still occupies it.
fn release_property(
    uow: &mut UnitOfWork<'_>,
    lease: &Lease,
    action: &'static str,
) -> Result<(), WorkflowError> {
    let occupied_elsewhere = !uow
        .find::<Lease>(|other| {
            other.property_id == lease.property_id
                && other.id != lease.id
                && matches!(
                    other.status,
                    LeaseStatus::Active
                        | LeaseStatus::MonthToMonth
                        | LeaseStatus::NoticeGiven
                        | LeaseStatus::Pending
                )
        })
        .is_empty();
    if occupied_elsewhere {
        return Ok(());
    }

    let mut property = uow.require::<Property>(&lease.property_id)?;
    if property.status == PropertyStatus::Occupied
        && audit::mirror(
            uow,
            &property.id,
            &mut property.status,
            PropertyStatus::Available,
            action,
        )
    {
        uow.stage(property);
    }
    Ok(())
}

fn set_tenant_active(
    uow: &mut UnitOfWork<'_>,
    tenant_id: &TenantId,
    active: bool,
    action: &'static str,
) -> Result<(), WorkflowError> {
    let mut tenant = uow.require::<Tenant>(tenant_id)?;
    if tenant.is_active == active {
        return Ok(());
    }

    let label = |active: bool| if active { "Active" } else { "Inactive" };
    tenant.is_active = active;
    audit::record(
        uow,
        AuditRecord::labeled(
            EntityKind::Tenant,
            &tenant.id,
            Some(label(!active)),
            label(active),
            action,
        ),
    );
    uow.stage(tenant);
    Ok(())
}

fn deactivate_tenant_if_idle(
    uow: &mut UnitOfWork<'_>,
    lease: &Lease,
    action: &'static str,
) -> Result<(), WorkflowError> {
    let has_other_lease = !uow
        .find::<Lease>(|other| {
            other.tenant_id == lease.tenant_id
                && other.id != lease.id
                && matches!(other.status, LeaseStatus::Active | LeaseStatus::MonthToMonth)
        })
        .is_empty();
    if has_other_lease {
        return Ok(());
    }
    set_tenant_active(uow, &lease.tenant_id, false, action)
}
