use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::applications::{
    ApplicationSubmission, DepositPayment, LeaseOfferTerms, ScreeningRequest, ScreeningResults,
};
use super::domain::{
    ApplicationId, DepositDeduction, EntityKind, LeaseId, LeaseOfferId, MoveOutDetails,
    OrganizationId, PropertyId, ProspectId, TenantId,
};
use super::leases::{DepositRefundRequest, EarlyTermination, LeaseRenewal, TerminationNoticeRequest};
use super::store::Store;
use super::unit_of_work::{OperationResult, WorkflowError};
use super::LeasingServices;

type Services<S> = State<Arc<LeasingServices<S>>>;

#[derive(Debug, Deserialize)]
pub struct SubmitApplicationRequest {
    pub prospect_id: ProspectId,
    pub property_id: PropertyId,
    #[serde(flatten)]
    pub submission: ApplicationSubmission,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivateLeaseRequest {
    #[serde(default)]
    pub move_in_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthToMonthRequest {
    #[serde(default)]
    pub monthly_rent: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MoveOutRequest {
    pub actual_move_out_date: NaiveDate,
    #[serde(default)]
    pub details: Option<MoveOutDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SettlementRequest {
    #[serde(default)]
    pub deductions: Vec<DepositDeduction>,
}

#[derive(Debug, Serialize)]
struct ExpiredCount {
    expired: usize,
}

/// Router builder exposing the leasing workflows under `/api/v1/leasing`.
pub fn leasing_router<S>(services: Arc<LeasingServices<S>>) -> Router
where
    S: Store + 'static,
{
    Router::new()
        .route("/api/v1/leasing/applications", post(submit::<S>))
        .route(
            "/api/v1/leasing/applications/:application_id",
            get(application::<S>),
        )
        .route(
            "/api/v1/leasing/applications/:application_id/review",
            post(mark_under_review::<S>),
        )
        .route(
            "/api/v1/leasing/applications/:application_id/screening",
            get(screening::<S>).post(initiate_screening::<S>),
        )
        .route(
            "/api/v1/leasing/applications/:application_id/screening/complete",
            post(complete_screening::<S>),
        )
        .route(
            "/api/v1/leasing/applications/:application_id/approve",
            post(approve::<S>),
        )
        .route(
            "/api/v1/leasing/applications/:application_id/deny",
            post(deny::<S>),
        )
        .route(
            "/api/v1/leasing/applications/:application_id/withdraw",
            post(withdraw::<S>),
        )
        .route(
            "/api/v1/leasing/applications/:application_id/offer",
            post(generate_offer::<S>),
        )
        .route("/api/v1/leasing/offers/:offer_id", get(offer::<S>))
        .route(
            "/api/v1/leasing/offers/:offer_id/accept",
            post(accept_offer::<S>),
        )
        .route(
            "/api/v1/leasing/offers/:offer_id/decline",
            post(decline_offer::<S>),
        )
        .route(
            "/api/v1/leasing/offers/:offer_id/expire",
            post(expire_offer::<S>),
        )
        .route("/api/v1/leasing/properties/:property_id", get(property::<S>))
        .route("/api/v1/leasing/prospects/:prospect_id", get(prospect::<S>))
        .route("/api/v1/leasing/tenants/:tenant_id", get(tenant::<S>))
        .route("/api/v1/leasing/leases/:lease_id", get(lease::<S>))
        .route(
            "/api/v1/leasing/leases/:lease_id/chain",
            get(renewal_chain::<S>),
        )
        .route(
            "/api/v1/leasing/leases/:lease_id/activate",
            post(activate::<S>),
        )
        .route(
            "/api/v1/leasing/leases/:lease_id/notice",
            post(record_notice::<S>),
        )
        .route(
            "/api/v1/leasing/leases/:lease_id/month-to-month",
            post(month_to_month::<S>),
        )
        .route("/api/v1/leasing/leases/:lease_id/renew", post(renew::<S>))
        .route(
            "/api/v1/leasing/leases/:lease_id/move-out",
            post(move_out::<S>),
        )
        .route(
            "/api/v1/leasing/leases/:lease_id/terminate",
            post(terminate::<S>),
        )
        .route(
            "/api/v1/leasing/leases/:lease_id/deposit",
            get(deposit::<S>),
        )
        .route(
            "/api/v1/leasing/leases/:lease_id/deposit/settlement",
            post(settle_deposit::<S>),
        )
        .route(
            "/api/v1/leasing/leases/:lease_id/deposit/refund",
            post(refund_deposit::<S>),
        )
        .route(
            "/api/v1/leasing/organizations/:organization_id/offers/expire",
            post(expire_overdue_offers::<S>),
        )
        .route(
            "/api/v1/leasing/organizations/:organization_id/leases/expire",
            post(expire_overdue_leases::<S>),
        )
        .route(
            "/api/v1/leasing/audit/:entity/:entity_id",
            get(audit_trail::<S>),
        )
        .with_state(services)
}

/// HTTP status for a failed operation.
pub fn error_status(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::Validation(_) | WorkflowError::InvalidTransition(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::Conflict(_) => StatusCode::CONFLICT,
        WorkflowError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(
    result: Result<T, WorkflowError>,
    success: StatusCode,
    message: &str,
) -> Response {
    let status = match &result {
        Ok(_) => success,
        Err(error) => error_status(error),
    };
    (status, Json(OperationResult::from_result(result, message))).into_response()
}

async fn submit<S: Store + 'static>(
    State(services): Services<S>,
    Json(request): Json<SubmitApplicationRequest>,
) -> Response {
    let result = services.applications.submit(
        &request.prospect_id,
        &request.property_id,
        request.submission,
    );
    respond(result, StatusCode::CREATED, "Application submitted")
}

async fn application<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
) -> Response {
    let result = services
        .applications
        .application(&ApplicationId(application_id));
    respond(result, StatusCode::OK, "Application loaded")
}

async fn mark_under_review<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
) -> Response {
    let result = services
        .applications
        .mark_under_review(&ApplicationId(application_id));
    respond(result, StatusCode::OK, "Application is under review")
}

async fn screening<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
) -> Response {
    let result = services
        .applications
        .screening(&ApplicationId(application_id));
    respond(result, StatusCode::OK, "Screening loaded")
}

async fn initiate_screening<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
    Json(request): Json<ScreeningRequest>,
) -> Response {
    let result = services
        .applications
        .initiate_screening(&ApplicationId(application_id), request);
    respond(result, StatusCode::CREATED, "Screening initiated")
}

async fn complete_screening<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
    Json(results): Json<ScreeningResults>,
) -> Response {
    let result = services
        .applications
        .complete_screening(&ApplicationId(application_id), results);
    respond(result, StatusCode::OK, "Screening completed")
}

async fn approve<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
) -> Response {
    let result = services.applications.approve(&ApplicationId(application_id));
    respond(result, StatusCode::OK, "Application approved")
}

async fn deny<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> Response {
    let result = services
        .applications
        .deny(&ApplicationId(application_id), &request.reason);
    respond(result, StatusCode::OK, "Application denied")
}

async fn withdraw<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> Response {
    let result = services
        .applications
        .withdraw(&ApplicationId(application_id), &request.reason);
    respond(result, StatusCode::OK, "Application withdrawn")
}

async fn generate_offer<S: Store + 'static>(
    State(services): Services<S>,
    Path(application_id): Path<String>,
    Json(terms): Json<LeaseOfferTerms>,
) -> Response {
    let result = services
        .applications
        .generate_lease_offer(&ApplicationId(application_id), terms);
    respond(result, StatusCode::CREATED, "Lease offer generated")
}

async fn offer<S: Store + 'static>(
    State(services): Services<S>,
    Path(offer_id): Path<String>,
) -> Response {
    let result = services.applications.lease_offer(&LeaseOfferId(offer_id));
    respond(result, StatusCode::OK, "Lease offer loaded")
}

async fn accept_offer<S: Store + 'static>(
    State(services): Services<S>,
    Path(offer_id): Path<String>,
    Json(payment): Json<DepositPayment>,
) -> Response {
    let result = services
        .applications
        .accept_lease_offer(&LeaseOfferId(offer_id), payment);
    respond(result, StatusCode::CREATED, "Lease offer accepted")
}

async fn decline_offer<S: Store + 'static>(
    State(services): Services<S>,
    Path(offer_id): Path<String>,
    Json(request): Json<ReasonRequest>,
) -> Response {
    let result = services
        .applications
        .decline_lease_offer(&LeaseOfferId(offer_id), &request.reason);
    respond(result, StatusCode::OK, "Lease offer declined")
}

async fn expire_offer<S: Store + 'static>(
    State(services): Services<S>,
    Path(offer_id): Path<String>,
) -> Response {
    let result = services
        .applications
        .expire_lease_offer(&LeaseOfferId(offer_id));
    respond(result, StatusCode::OK, "Lease offer expired")
}

async fn property<S: Store + 'static>(
    State(services): Services<S>,
    Path(property_id): Path<String>,
) -> Response {
    let result = services.applications.property(&PropertyId(property_id));
    respond(result, StatusCode::OK, "Property loaded")
}

async fn prospect<S: Store + 'static>(
    State(services): Services<S>,
    Path(prospect_id): Path<String>,
) -> Response {
    let result = services.applications.prospect(&ProspectId(prospect_id));
    respond(result, StatusCode::OK, "Prospect loaded")
}

async fn tenant<S: Store + 'static>(
    State(services): Services<S>,
    Path(tenant_id): Path<String>,
) -> Response {
    let result = services.leases.tenant(&TenantId(tenant_id));
    respond(result, StatusCode::OK, "Tenant loaded")
}

async fn lease<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
) -> Response {
    let result = services.leases.lease(&LeaseId(lease_id));
    respond(result, StatusCode::OK, "Lease loaded")
}

async fn renewal_chain<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
) -> Response {
    let result = services.leases.renewal_chain(&LeaseId(lease_id));
    respond(result, StatusCode::OK, "Renewal chain loaded")
}

async fn activate<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(request): Json<ActivateLeaseRequest>,
) -> Response {
    let result = services
        .leases
        .activate(&LeaseId(lease_id), request.move_in_date);
    respond(result, StatusCode::OK, "Lease activated")
}

async fn record_notice<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(request): Json<TerminationNoticeRequest>,
) -> Response {
    let result = services
        .leases
        .record_termination_notice(&LeaseId(lease_id), request);
    respond(result, StatusCode::OK, "Termination notice recorded")
}

async fn month_to_month<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(request): Json<MonthToMonthRequest>,
) -> Response {
    let result = services
        .leases
        .convert_to_month_to_month(&LeaseId(lease_id), request.monthly_rent);
    respond(result, StatusCode::OK, "Lease converted to month-to-month")
}

async fn renew<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(renewal): Json<LeaseRenewal>,
) -> Response {
    let result = services.leases.renew(&LeaseId(lease_id), renewal);
    respond(result, StatusCode::CREATED, "Lease renewed")
}

async fn move_out<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(request): Json<MoveOutRequest>,
) -> Response {
    let result = services.leases.complete_move_out(
        &LeaseId(lease_id),
        request.actual_move_out_date,
        request.details,
    );
    respond(result, StatusCode::OK, "Move-out completed")
}

async fn terminate<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(termination): Json<EarlyTermination>,
) -> Response {
    let result = services
        .leases
        .early_terminate(&LeaseId(lease_id), termination);
    respond(result, StatusCode::OK, "Lease terminated")
}

async fn deposit<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
) -> Response {
    let result = services.leases.deposit(&LeaseId(lease_id));
    respond(result, StatusCode::OK, "Security deposit loaded")
}

async fn settle_deposit<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(request): Json<SettlementRequest>,
) -> Response {
    let result = services
        .leases
        .initiate_deposit_settlement(&LeaseId(lease_id), request.deductions);
    respond(result, StatusCode::OK, "Deposit settlement initiated")
}

async fn refund_deposit<S: Store + 'static>(
    State(services): Services<S>,
    Path(lease_id): Path<String>,
    Json(request): Json<DepositRefundRequest>,
) -> Response {
    let result = services
        .leases
        .record_deposit_refund(&LeaseId(lease_id), request);
    respond(result, StatusCode::OK, "Deposit refund recorded")
}

async fn expire_overdue_offers<S: Store + 'static>(
    State(services): Services<S>,
    Path(organization_id): Path<String>,
) -> Response {
    let result = services
        .applications
        .expire_overdue_lease_offers(&OrganizationId(organization_id))
        .map(|expired| ExpiredCount { expired });
    respond(result, StatusCode::OK, "Overdue lease offers expired")
}

async fn expire_overdue_leases<S: Store + 'static>(
    State(services): Services<S>,
    Path(organization_id): Path<String>,
) -> Response {
    let result = services
        .leases
        .expire_overdue_leases(&OrganizationId(organization_id))
        .map(|expired| ExpiredCount { expired });
    respond(result, StatusCode::OK, "Overdue leases expired")
}

async fn audit_trail<S: Store + 'static>(
    State(services): Services<S>,
    Path((entity, entity_id)): Path<(String, String)>,
) -> Response {
    let result = EntityKind::from_label(&entity)
        .ok_or_else(|| WorkflowError::validation(format!("Unknown entity kind '{entity}'")))
        .and_then(|kind| services.applications.audit_trail(kind, &entity_id));
    respond(result, StatusCode::OK, "Audit trail loaded")
}
