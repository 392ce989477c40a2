use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::{self, AuditRecord};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, AuditLogEntry, DecisionRecord, DepositStatus,
    EntityKind, Identification, Lease, LeaseId, LeaseOffer, LeaseOfferId, LeaseOfferStatus,
    LeaseStatus, Organization, OrganizationId, Property, PropertyId, PropertyStatus, Prospect,
    ProspectId, ProspectStatus, Screening, ScreeningId, ScreeningResult, SecurityDeposit,
    SecurityDepositId, Tenant, TenantId,
};
use super::ports::WorkflowAlert;
use super::reconcile::reconcile_property;
use super::store::Store;
use super::transitions::WorkflowState;
use super::unit_of_work::{UnitOfWork, UnitOfWorkExecutor, WorkflowError};
use crate::config::{LeasingConfig, MAX_WINDOW_DAYS};

/// Reason stamped on applications denied because another applicant received the offer.
pub const COMPETITOR_DENIAL_REASON: &str = "Property leased to another applicant";

/// Applicant-supplied data captured at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    pub identification: Identification,
    #[serde(default)]
    pub monthly_income: Option<u32>,
    #[serde(default)]
    pub desired_move_in: Option<NaiveDate>,
    #[serde(default)]
    pub application_fee_paid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningRequest {
    pub background_check: bool,
    pub credit_check: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResults {
    #[serde(default)]
    pub background_result: Option<ScreeningResult>,
    #[serde(default)]
    pub credit_result: Option<ScreeningResult>,
    #[serde(default)]
    pub credit_score: Option<u16>,
    pub overall_result: ScreeningResult,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseOfferTerms {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: u32,
    pub security_deposit: u32,
    #[serde(default)]
    pub special_terms: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositPayment {
    pub payment_method: String,
    pub received_on: NaiveDate,
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedOffer {
    pub offer: LeaseOffer,
    pub competitors_denied: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedOffer {
    pub offer: LeaseOffer,
    pub lease: Lease,
    pub tenant: Tenant,
    pub deposit: SecurityDeposit,
}

/// Orchestrates the rental application lifecycle, from submission through
/// lease-offer acceptance.
pub struct ApplicationWorkflow<S> {
    executor: UnitOfWorkExecutor<S>,
    config: LeasingConfig,
}

impl<S> Clone for ApplicationWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            config: self.config,
        }
    }
}

impl<S> ApplicationWorkflow<S>
where
    S: Store + 'static,
{
    pub fn new(executor: UnitOfWorkExecutor<S>, config: LeasingConfig) -> Self {
        Self { executor, config }
    }

    /// Open an application for a prospect against a property.
    pub fn submit(
        &self,
        prospect_id: &ProspectId,
        property_id: &PropertyId,
        submission: ApplicationSubmission,
    ) -> Result<Application, WorkflowError> {
        let default_expiration_days = self.config.application_expiration_days;

        let application = self.executor.execute("submit application", |uow| {
            let identification = &submission.identification;
            if identification.number.trim().is_empty() || identification.state.trim().is_empty() {
                return Err(WorkflowError::validation(
                    "Identification number and issuing state are required",
                ));
            }

            let prospect = uow.require::<Prospect>(prospect_id)?;
            if prospect.status == ProspectStatus::ConvertedToTenant {
                return Err(WorkflowError::validation(format!(
                    "Prospect {} is already a tenant",
                    prospect.id
                )));
            }

            let mut property = uow.require::<Property>(property_id)?;
            if property.status == PropertyStatus::Occupied {
                return Err(WorkflowError::validation(format!(
                    "Property {} is occupied and not accepting applications",
                    property.id
                )));
            }

            if let Some(existing) = uow
                .find::<Application>(|application| {
                    !application.is_deleted
                        && !application.status.is_terminal()
                        && application.identification.matches(identification)
                })
                .first()
            {
                return Err(WorkflowError::validation(format!(
                    "An active application ({}) already exists for identification {} ({})",
                    existing.id,
                    identification.number.trim(),
                    identification.state.trim()
                )));
            }

            let organization_id = uow.organization_id().clone();
            let expiration_days = uow
                .get::<Organization>(&organization_id)
                .and_then(|organization| organization.application_expiration_days)
                .filter(|days| (1..=MAX_WINDOW_DAYS).contains(days))
                .unwrap_or(default_expiration_days);

            let now = uow.now();
            let application = Application {
                id: ApplicationId::generate(),
                organization_id,
                prospect_id: prospect.id.clone(),
                property_id: property.id.clone(),
                status: ApplicationStatus::Submitted,
                identification: identification.clone(),
                monthly_income: submission.monthly_income,
                desired_move_in: submission.desired_move_in,
                application_fee_paid: submission.application_fee_paid,
                submitted_at: now,
                expires_at: now + Duration::days(expiration_days),
                decision: None,
                is_deleted: false,
                version: 0,
            };

            audit::record(
                uow,
                AuditRecord::transition(&application.id, None, application.status, "Submit")
                    .metadata("property_id", &property.id)
                    .metadata("prospect_id", &prospect.id),
            );

            if property.status == PropertyStatus::Available {
                audit::mirror(
                    uow,
                    &property.id,
                    &mut property.status,
                    PropertyStatus::ApplicationPending,
                    "Submit",
                );
                uow.stage(property);
            }
            mirror_prospect(uow, &prospect.id, ProspectStatus::Applied, "Submit")?;

            uow.stage(application.clone());
            uow.notify(
                WorkflowAlert::new("application_submitted", EntityKind::Application, &application.id)
                    .detail("property_id", &application.property_id)
                    .detail("prospect_id", &application.prospect_id),
            );
            Ok(application)
        })?;

        info!(
            application_id = %application.id,
            property_id = %application.property_id,
            "application submitted"
        );
        Ok(application)
    }

    pub fn mark_under_review(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.executor.execute("mark application under review", |uow| {
            let mut application = load_application(uow, id)?;
            audit::transition(
                uow,
                &application.id,
                &mut application.status,
                ApplicationStatus::UnderReview,
                "MarkUnderReview",
                None,
            )?;
            uow.stage(application.clone());
            Ok(application)
        })
    }

    /// Open a screening record, promoting a freshly submitted application to review first.
    pub fn initiate_screening(
        &self,
        id: &ApplicationId,
        request: ScreeningRequest,
    ) -> Result<Screening, WorkflowError> {
        let screening = self.executor.execute("initiate screening", |uow| {
            let mut application = load_application(uow, id)?;

            if !application.application_fee_paid {
                return Err(WorkflowError::validation(
                    "Application fee must be paid before screening can begin",
                ));
            }
            if screening_for(uow, &application.id).is_some() {
                return Err(WorkflowError::validation(format!(
                    "Screening already exists for application {}",
                    application.id
                )));
            }

            if application.status == ApplicationStatus::Submitted {
                audit::transition(
                    uow,
                    &application.id,
                    &mut application.status,
                    ApplicationStatus::UnderReview,
                    "InitiateScreening",
                    None,
                )?;
            }
            if application.status != ApplicationStatus::UnderReview {
                return Err(WorkflowError::validation(format!(
                    "Application must be UnderReview to initiate screening (current: {})",
                    application.status.label()
                )));
            }
            audit::transition(
                uow,
                &application.id,
                &mut application.status,
                ApplicationStatus::Screening,
                "InitiateScreening",
                None,
            )?;

            let screening = Screening {
                id: ScreeningId::generate(),
                organization_id: uow.organization_id().clone(),
                application_id: application.id.clone(),
                background_check_requested: request.background_check,
                credit_check_requested: request.credit_check,
                background_result: None,
                credit_result: None,
                credit_score: None,
                overall_result: ScreeningResult::Pending,
                notes: None,
                initiated_at: uow.now(),
                completed_at: None,
                version: 0,
            };
            audit::record(
                uow,
                AuditRecord::labeled(
                    EntityKind::Screening,
                    &screening.id,
                    None,
                    screening.overall_result.label(),
                    "InitiateScreening",
                )
                .metadata("application_id", &application.id),
            );

            mirror_prospect(
                uow,
                &application.prospect_id,
                ProspectStatus::Screening,
                "InitiateScreening",
            )?;
            uow.stage(application);
            uow.stage(screening.clone());
            Ok(screening)
        })?;

        info!(application_id = %id, screening_id = %screening.id, "screening initiated");
        Ok(screening)
    }

    /// Record screening outcomes. Approval remains a separate step.
    pub fn complete_screening(
        &self,
        id: &ApplicationId,
        results: ScreeningResults,
    ) -> Result<Screening, WorkflowError> {
        self.executor.execute("complete screening", |uow| {
            let application = load_application(uow, id)?;
            if application.status != ApplicationStatus::Screening {
                return Err(WorkflowError::validation(format!(
                    "Application must be in Screening to complete screening (current: {})",
                    application.status.label()
                )));
            }
            if results.overall_result == ScreeningResult::Pending {
                return Err(WorkflowError::validation(
                    "Overall screening result must be Passed, Failed or ConditionalPass",
                ));
            }

            let mut screening = screening_for(uow, &application.id).ok_or_else(|| {
                WorkflowError::validation(format!(
                    "No screening has been initiated for application {}",
                    application.id
                ))
            })?;

            let previous = screening.overall_result;
            screening.background_result = results.background_result;
            screening.credit_result = results.credit_result;
            screening.credit_score = results.credit_score;
            screening.overall_result = results.overall_result;
            screening.notes = results.notes.clone();
            screening.completed_at = Some(uow.now());

            if previous != screening.overall_result {
                audit::record(
                    uow,
                    AuditRecord::labeled(
                        EntityKind::Screening,
                        &screening.id,
                        Some(previous.label()),
                        screening.overall_result.label(),
                        "CompleteScreening",
                    )
                    .metadata("application_id", &application.id),
                );
            }

            uow.stage(screening.clone());
            Ok(screening)
        })
    }

    pub fn approve(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        let application = self.executor.execute("approve application", |uow| {
            let mut application = load_application(uow, id)?;
            if application.status != ApplicationStatus::Screening {
                return Err(WorkflowError::InvalidTransition(
                    application
                        .status
                        .invalid_transition_reason(ApplicationStatus::Approved),
                ));
            }

            let screening = screening_for(uow, &application.id).ok_or_else(|| {
                WorkflowError::validation("Screening must be completed before approval")
            })?;
            if !screening.overall_result.permits_approval() {
                return Err(WorkflowError::validation(format!(
                    "Screening result {} does not permit approval",
                    screening.overall_result.label()
                )));
            }

            audit::transition(
                uow,
                &application.id,
                &mut application.status,
                ApplicationStatus::Approved,
                "Approve",
                None,
            )?;
            application.decision = Some(DecisionRecord {
                decided_by: uow.actor().to_string(),
                decided_at: uow.now(),
                reason: None,
            });

            mirror_prospect(
                uow,
                &application.prospect_id,
                ProspectStatus::Approved,
                "Approve",
            )?;
            uow.stage(application.clone());
            uow.notify(WorkflowAlert::new(
                "application_approved",
                EntityKind::Application,
                &application.id,
            ));
            Ok(application)
        })?;

        info!(application_id = %application.id, "application approved");
        Ok(application)
    }

    /// Deny any application that is not already Denied, LeaseAccepted or
    /// Withdrawn. A pending offer made on it is declined.
    pub fn deny(&self, id: &ApplicationId, reason: &str) -> Result<Application, WorkflowError> {
        let application = self.executor.execute("deny application", |uow| {
            let reason = required_reason(reason, "deny an application")?;
            let mut application = load_application(uow, id)?;

            if matches!(
                application.status,
                ApplicationStatus::Denied
                    | ApplicationStatus::LeaseAccepted
                    | ApplicationStatus::Withdrawn
            ) {
                return Err(WorkflowError::validation(format!(
                    "Application {} is already {} and cannot be denied",
                    application.id,
                    application.status.label()
                )));
            }

            deny_application(uow, &mut application, &reason, "Deny")?;
            let declined_offer = decline_open_offer(
                uow,
                &application.id,
                format!("Application denied: {reason}"),
                "Deny",
            )?;
            uow.stage(application.clone());
            reconcile_property(
                uow,
                &application.property_id,
                Some(&application.id),
                declined_offer.as_ref(),
            )?;

            uow.add_note(
                EntityKind::Application,
                &application.id,
                format!("Application denied: {reason}"),
            );
            Ok(application)
        })?;

        info!(application_id = %application.id, "application denied");
        Ok(application)
    }

    /// Withdraw an open application. A pending offer made on it is declined.
    pub fn withdraw(&self, id: &ApplicationId, reason: &str) -> Result<Application, WorkflowError> {
        let application = self.executor.execute("withdraw application", |uow| {
            let reason = required_reason(reason, "withdraw an application")?;
            let mut application = load_application(uow, id)?;

            if !matches!(
                application.status,
                ApplicationStatus::Submitted
                    | ApplicationStatus::UnderReview
                    | ApplicationStatus::Screening
                    | ApplicationStatus::Approved
                    | ApplicationStatus::LeaseOffered
            ) {
                return Err(WorkflowError::validation(format!(
                    "Application {} cannot be withdrawn from status {}",
                    application.id,
                    application.status.label()
                )));
            }

            audit::transition(
                uow,
                &application.id,
                &mut application.status,
                ApplicationStatus::Withdrawn,
                "Withdraw",
                Some(&reason),
            )?;

            let withdrawn_offer = decline_open_offer(
                uow,
                &application.id,
                format!("Application withdrawn: {reason}"),
                "Withdraw",
            )?;

            mirror_prospect(
                uow,
                &application.prospect_id,
                ProspectStatus::Withdrawn,
                "Withdraw",
            )?;
            uow.stage(application.clone());
            reconcile_property(
                uow,
                &application.property_id,
                Some(&application.id),
                withdrawn_offer.as_ref(),
            )?;

            uow.add_note(
                EntityKind::Application,
                &application.id,
                format!("Application withdrawn: {reason}"),
            );
            uow.notify(
                WorkflowAlert::new("application_withdrawn", EntityKind::Application, &application.id)
                    .detail("reason", &reason),
            );
            Ok(application)
        })?;

        info!(application_id = %application.id, "application withdrawn");
        Ok(application)
    }

    /// Generate a lease offer for an approved application and deny every
    /// competing open application on the same property, atomically.
    pub fn generate_lease_offer(
        &self,
        id: &ApplicationId,
        terms: LeaseOfferTerms,
    ) -> Result<GeneratedOffer, WorkflowError> {
        let offer_expiration_days = self.config.offer_expiration_days;

        let generated = self.executor.execute("generate lease offer", |uow| {
            if terms.start_date >= terms.end_date {
                return Err(WorkflowError::validation(
                    "Lease start date must be before the end date",
                ));
            }
            if terms.start_date < uow.today() {
                return Err(WorkflowError::validation(
                    "Lease start date cannot be in the past",
                ));
            }
            if terms.monthly_rent == 0 {
                return Err(WorkflowError::validation(
                    "Monthly rent must be greater than zero",
                ));
            }

            let mut application = load_application(uow, id)?;
            if application.status != ApplicationStatus::Approved {
                return Err(WorkflowError::validation(format!(
                    "Application must be Approved to generate a lease offer (current: {})",
                    application.status.label()
                )));
            }

            let mut property = uow.require::<Property>(&application.property_id)?;
            if property.status == PropertyStatus::Occupied {
                return Err(WorkflowError::validation(format!(
                    "Property {} is already occupied",
                    property.id
                )));
            }
            if let Some(existing) = uow
                .find::<LeaseOffer>(|offer| {
                    offer.property_id == property.id && offer.status == LeaseOfferStatus::Pending
                })
                .first()
            {
                return Err(WorkflowError::validation(format!(
                    "Property {} already has a pending lease offer ({})",
                    property.id, existing.id
                )));
            }

            let now = uow.now();
            let offer = LeaseOffer {
                id: LeaseOfferId::generate(),
                organization_id: uow.organization_id().clone(),
                application_id: application.id.clone(),
                property_id: property.id.clone(),
                prospect_id: application.prospect_id.clone(),
                status: LeaseOfferStatus::Pending,
                start_date: terms.start_date,
                end_date: terms.end_date,
                monthly_rent: terms.monthly_rent,
                security_deposit: terms.security_deposit,
                special_terms: terms.special_terms.clone(),
                offered_at: now,
                expires_on: now + Duration::days(offer_expiration_days),
                responded_at: None,
                decline_reason: None,
                lease_id: None,
                version: 0,
            };
            audit::record(
                uow,
                AuditRecord::transition(&offer.id, None, offer.status, "GenerateLeaseOffer")
                    .metadata("application_id", &application.id)
                    .metadata("monthly_rent", offer.monthly_rent),
            );

            audit::transition(
                uow,
                &application.id,
                &mut application.status,
                ApplicationStatus::LeaseOffered,
                "GenerateLeaseOffer",
                None,
            )?;
            mirror_prospect(
                uow,
                &application.prospect_id,
                ProspectStatus::LeaseOffered,
                "GenerateLeaseOffer",
            )?;
            audit::mirror(
                uow,
                &property.id,
                &mut property.status,
                PropertyStatus::LeasePending,
                "GenerateLeaseOffer",
            );

            let competitors = uow.find::<Application>(|other| {
                other.property_id == property.id
                    && other.id != application.id
                    && !other.is_deleted
                    && !other.status.is_terminal()
            });
            let competitors_denied = competitors.len();
            for mut competitor in competitors {
                let shares_prospect = competitor.prospect_id == application.prospect_id;
                if shares_prospect {
                    audit::transition(
                        uow,
                        &competitor.id,
                        &mut competitor.status,
                        ApplicationStatus::Denied,
                        "DenyCompetingApplication",
                        Some(COMPETITOR_DENIAL_REASON),
                    )?;
                    stamp_decision(uow, &mut competitor, COMPETITOR_DENIAL_REASON);
                } else {
                    deny_application(
                        uow,
                        &mut competitor,
                        COMPETITOR_DENIAL_REASON,
                        "DenyCompetingApplication",
                    )?;
                }
                uow.stage(competitor);
            }

            uow.stage(application);
            uow.stage(property);
            uow.stage(offer.clone());
            uow.notify(
                WorkflowAlert::new("lease_offer_generated", EntityKind::LeaseOffer, &offer.id)
                    .detail("expires_on", offer.expires_on.date_naive())
                    .detail("competitors_denied", competitors_denied),
            );

            Ok(GeneratedOffer {
                offer,
                competitors_denied,
            })
        })?;

        info!(
            application_id = %id,
            offer_id = %generated.offer.id,
            competitors_denied = generated.competitors_denied,
            "lease offer generated"
        );
        Ok(generated)
    }

    /// Accept a pending offer: creates the tenant, the active lease and the held deposit.
    pub fn accept_lease_offer(
        &self,
        offer_id: &LeaseOfferId,
        payment: DepositPayment,
    ) -> Result<AcceptedOffer, WorkflowError> {
        let accepted = self.executor.execute("accept lease offer", |uow| {
            let payment_method = payment.payment_method.trim();
            if payment_method.is_empty() {
                return Err(WorkflowError::validation(
                    "A deposit payment method is required",
                ));
            }

            let mut offer = uow.require::<LeaseOffer>(offer_id)?;
            if offer.status != LeaseOfferStatus::Pending {
                return Err(WorkflowError::validation(format!(
                    "Lease offer {} is {} and can no longer be accepted",
                    offer.id,
                    offer.status.label()
                )));
            }
            let now = uow.now();
            if offer.expires_on < now {
                return Err(WorkflowError::validation(format!(
                    "Lease offer {} expired on {}",
                    offer.id,
                    offer.expires_on.format("%Y-%m-%d %H:%M UTC")
                )));
            }

            let mut application = load_application(uow, &offer.application_id)?;
            let prospect = uow.require::<Prospect>(&offer.prospect_id)?;
            let mut property = uow.require::<Property>(&offer.property_id)?;
            if property.status == PropertyStatus::Occupied {
                return Err(WorkflowError::validation(format!(
                    "Property {} is already occupied",
                    property.id
                )));
            }

            let organization_id = uow.organization_id().clone();
            let tenant = Tenant {
                id: TenantId::generate(),
                organization_id: organization_id.clone(),
                prospect_id: prospect.id.clone(),
                first_name: prospect.first_name.clone(),
                last_name: prospect.last_name.clone(),
                email: prospect.email.clone(),
                phone: prospect.phone.clone(),
                is_active: true,
                created_at: now,
                version: 0,
            };

            let lease = Lease {
                id: LeaseId::generate(),
                organization_id: organization_id.clone(),
                property_id: property.id.clone(),
                tenant_id: tenant.id.clone(),
                lease_offer_id: Some(offer.id.clone()),
                previous_lease_id: None,
                renewal_number: 0,
                status: LeaseStatus::Active,
                start_date: offer.start_date,
                end_date: offer.end_date,
                monthly_rent: offer.monthly_rent,
                security_deposit: offer.security_deposit,
                move_in_date: payment.move_in_date,
                notice: None,
                termination: None,
                move_out: None,
                version: 0,
            };
            audit::record(
                uow,
                AuditRecord::transition(&lease.id, None, lease.status, "AcceptLeaseOffer")
                    .metadata("lease_offer_id", &offer.id)
                    .metadata("tenant_id", &tenant.id),
            );

            let deposit = SecurityDeposit {
                id: SecurityDepositId::generate(),
                organization_id,
                lease_id: lease.id.clone(),
                amount: offer.security_deposit,
                status: DepositStatus::Held,
                payment_method: payment_method.to_string(),
                received_on: payment.received_on,
                deductions: Vec::new(),
                refund_amount: None,
                amount_owed: None,
                settlement_initiated_at: None,
                refund: None,
                version: 0,
            };
            audit::record(
                uow,
                AuditRecord::transition(&deposit.id, None, deposit.status, "AcceptLeaseOffer")
                    .metadata("lease_id", &lease.id)
                    .metadata("amount", deposit.amount),
            );

            audit::transition(
                uow,
                &offer.id,
                &mut offer.status,
                LeaseOfferStatus::Accepted,
                "AcceptLeaseOffer",
                None,
            )?;
            offer.responded_at = Some(now);
            offer.lease_id = Some(lease.id.clone());

            audit::transition(
                uow,
                &application.id,
                &mut application.status,
                ApplicationStatus::LeaseAccepted,
                "AcceptLeaseOffer",
                None,
            )?;
            mirror_prospect(
                uow,
                &prospect.id,
                ProspectStatus::ConvertedToTenant,
                "AcceptLeaseOffer",
            )?;
            audit::mirror(
                uow,
                &property.id,
                &mut property.status,
                PropertyStatus::Occupied,
                "AcceptLeaseOffer",
            );

            uow.stage(application);
            uow.stage(property);
            uow.stage(offer.clone());
            uow.stage(tenant.clone());
            uow.stage(lease.clone());
            uow.stage(deposit.clone());
            uow.notify(
                WorkflowAlert::new("lease_offer_accepted", EntityKind::LeaseOffer, &offer.id)
                    .detail("lease_id", &lease.id)
                    .detail("tenant_email", &tenant.email),
            );

            Ok(AcceptedOffer {
                offer,
                lease,
                tenant,
                deposit,
            })
        })?;

        info!(
            offer_id = %offer_id,
            lease_id = %accepted.lease.id,
            tenant_id = %accepted.tenant.id,
            "lease offer accepted"
        );
        Ok(accepted)
    }

    pub fn decline_lease_offer(
        &self,
        offer_id: &LeaseOfferId,
        reason: &str,
    ) -> Result<LeaseOffer, WorkflowError> {
        let offer = self.executor.execute("decline lease offer", |uow| {
            let reason = required_reason(reason, "decline a lease offer")?;
            let offer = close_offer(uow, offer_id, LeaseOfferStatus::Declined, Some(&reason))?;
            uow.add_note(
                EntityKind::LeaseOffer,
                &offer.id,
                format!("Lease offer declined: {reason}"),
            );
            Ok(offer)
        })?;

        info!(offer_id = %offer.id, "lease offer declined");
        Ok(offer)
    }

    pub fn expire_lease_offer(&self, offer_id: &LeaseOfferId) -> Result<LeaseOffer, WorkflowError> {
        let offer = self.executor.execute("expire lease offer", |uow| {
            close_offer(uow, offer_id, LeaseOfferStatus::Expired, None)
        })?;

        info!(offer_id = %offer.id, "lease offer expired");
        Ok(offer)
    }

    /// Expire every pending offer in the organization whose acceptance window has passed.
    pub fn expire_overdue_lease_offers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<usize, WorkflowError> {
        let expired = self.executor.execute_in(
            organization_id.clone(),
            "expire overdue lease offers",
            |uow| {
                let now = uow.now();
                let overdue = uow.find::<LeaseOffer>(|offer| {
                    offer.status == LeaseOfferStatus::Pending && offer.expires_on < now
                });
                for offer in &overdue {
                    close_offer(uow, &offer.id, LeaseOfferStatus::Expired, None)?;
                }
                Ok(overdue.len())
            },
        )?;

        info!(organization_id = %organization_id, expired, "overdue lease offers expired");
        Ok(expired)
    }

    pub fn application(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.executor
            .execute("load application", |uow| load_application(uow, id))
    }

    pub fn screening(&self, id: &ApplicationId) -> Result<Option<Screening>, WorkflowError> {
        self.executor.execute("load screening", |uow| {
            let application = load_application(uow, id)?;
            Ok(screening_for(uow, &application.id))
        })
    }

    pub fn lease_offer(&self, id: &LeaseOfferId) -> Result<LeaseOffer, WorkflowError> {
        self.executor
            .execute("load lease offer", |uow| uow.require::<LeaseOffer>(id))
    }

    pub fn property(&self, id: &PropertyId) -> Result<Property, WorkflowError> {
        self.executor
            .execute("load property", |uow| uow.require::<Property>(id))
    }

    pub fn prospect(&self, id: &ProspectId) -> Result<Prospect, WorkflowError> {
        self.executor
            .execute("load prospect", |uow| uow.require::<Prospect>(id))
    }

    /// Committed audit entries for one entity, oldest first.
    pub fn audit_trail(
        &self,
        entity: EntityKind,
        entity_id: &str,
    ) -> Result<Vec<AuditLogEntry>, WorkflowError> {
        self.executor.execute("load audit trail", |uow| {
            Ok(audit::trail(&uow.audit_entries(), entity, entity_id))
        })
    }
}

fn load_application(
    uow: &UnitOfWork<'_>,
    id: &ApplicationId,
) -> Result<Application, WorkflowError> {
    match uow.get::<Application>(id) {
        Some(application) if !application.is_deleted => Ok(application),
        _ => Err(WorkflowError::not_found::<Application>(id)),
    }
}

fn screening_for(uow: &UnitOfWork<'_>, application_id: &ApplicationId) -> Option<Screening> {
    uow.find::<Screening>(|screening| screening.application_id == *application_id)
        .into_iter()
        .next()
}

pub(super) fn required_reason(reason: &str, action: &str) -> Result<String, WorkflowError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation(format!(
            "A reason is required to {action}"
        )));
    }
    Ok(trimmed.to_string())
}

fn mirror_prospect(
    uow: &mut UnitOfWork<'_>,
    prospect_id: &ProspectId,
    to: ProspectStatus,
    action: &'static str,
) -> Result<(), WorkflowError> {
    let mut prospect = uow.require::<Prospect>(prospect_id)?;
    if audit::mirror(uow, &prospect.id, &mut prospect.status, to, action) {
        uow.stage(prospect);
    }
    Ok(())
}

fn stamp_decision(uow: &UnitOfWork<'_>, application: &mut Application, reason: &str) {
    application.decision = Some(DecisionRecord {
        decided_by: uow.actor().to_string(),
        decided_at: uow.now(),
        reason: Some(reason.to_string()),
    });
}

/// Deny and cascade to the prospect. The caller stages the application.
fn deny_application(
    uow: &mut UnitOfWork<'_>,
    application: &mut Application,
    reason: &str,
    action: &'static str,
) -> Result<(), WorkflowError> {
    audit::assign(
        uow,
        &application.id,
        &mut application.status,
        ApplicationStatus::Denied,
        action,
        Some(reason),
    );
    stamp_decision(uow, application, reason);
    mirror_prospect(uow, &application.prospect_id, ProspectStatus::Denied, action)?;
    uow.notify(
        WorkflowAlert::new("application_denied", EntityKind::Application, &application.id)
            .detail("reason", reason),
    );
    Ok(())
}

/// Decline the pending offer made on an application that is being closed.
fn decline_open_offer(
    uow: &mut UnitOfWork<'_>,
    application_id: &ApplicationId,
    decline_reason: String,
    action: &'static str,
) -> Result<Option<LeaseOfferId>, WorkflowError> {
    let open_offers = uow.find::<LeaseOffer>(|offer| {
        offer.application_id == *application_id && offer.status == LeaseOfferStatus::Pending
    });

    let mut declined = None;
    for mut offer in open_offers {
        audit::transition(
            uow,
            &offer.id,
            &mut offer.status,
            LeaseOfferStatus::Declined,
            action,
            Some(&decline_reason),
        )?;
        offer.responded_at = Some(uow.now());
        offer.decline_reason = Some(decline_reason.clone());
        declined = Some(offer.id.clone());
        uow.stage(offer);
    }
    Ok(declined)
}

/// Close a pending offer as declined or expired, close its application and
/// reconcile the property.
fn close_offer(
    uow: &mut UnitOfWork<'_>,
    offer_id: &LeaseOfferId,
    to: LeaseOfferStatus,
    reason: Option<&str>,
) -> Result<LeaseOffer, WorkflowError> {
    let mut offer = uow.require::<LeaseOffer>(offer_id)?;
    if offer.status != LeaseOfferStatus::Pending {
        return Err(WorkflowError::validation(format!(
            "Lease offer {} is {} and cannot be marked {}",
            offer.id,
            offer.status.label(),
            to.label()
        )));
    }

    let now = uow.now();
    if to == LeaseOfferStatus::Expired && offer.expires_on >= now {
        return Err(WorkflowError::validation(format!(
            "Lease offer {} does not expire until {}",
            offer.id,
            offer.expires_on.format("%Y-%m-%d %H:%M UTC")
        )));
    }

    let action = match to {
        LeaseOfferStatus::Expired => "ExpireLeaseOffer",
        _ => "DeclineLeaseOffer",
    };
    audit::transition(uow, &offer.id, &mut offer.status, to, action, reason)?;
    offer.responded_at = Some(now);
    offer.decline_reason = reason.map(str::to_string);

    let mut closed_application = None;
    if let Some(mut application) = uow.get::<Application>(&offer.application_id) {
        if application.status == ApplicationStatus::LeaseOffered {
            let application_status = match to {
                LeaseOfferStatus::Expired => ApplicationStatus::Expired,
                _ => ApplicationStatus::LeaseDeclined,
            };
            audit::transition(
                uow,
                &application.id,
                &mut application.status,
                application_status,
                action,
                reason,
            )?;
            closed_application = Some(application.id.clone());
            uow.stage(application);
        }
    }
    mirror_prospect(uow, &offer.prospect_id, ProspectStatus::LeaseDeclined, action)?;

    uow.stage(offer.clone());
    reconcile_property(
        uow,
        &offer.property_id,
        closed_application.as_ref(),
        Some(&offer.id),
    )?;

    uow.notify(
        WorkflowAlert::new(
            match to {
                LeaseOfferStatus::Expired => "lease_offer_expired",
                _ => "lease_offer_declined",
            },
            EntityKind::LeaseOffer,
            &offer.id,
        )
        .detail("application_id", &offer.application_id),
    );
    Ok(offer)
}
