use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::leasing::domain::LeaseStatus;
use crate::workflows::leasing::router::error_status;
use crate::workflows::leasing::{leasing_router, WorkflowError};

fn router(harness: &Harness) -> Router {
    leasing_router(Arc::new(harness.services()))
}

async fn post(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).expect("encode body")))
                .expect("request"),
        )
        .await
        .expect("route executes");
    let status = response.status();
    (status, read_json_body(response).await)
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
        .await
        .expect("route executes");
    let status = response.status();
    (status, read_json_body(response).await)
}

fn data_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get("data")
        .and_then(|data| data.get(field))
        .and_then(Value::as_str)
}

#[tokio::test]
async fn submit_route_creates_application() {
    let harness = harness();
    harness.seed_property("p-400");
    harness.seed_prospect("pr-400", "Morgan");

    let (status, payload) = post(
        router(&harness),
        "/api/v1/leasing/applications",
        json!({
            "prospect_id": "pr-400",
            "property_id": "p-400",
            "identification": { "number": "D400", "state": "IA" },
            "monthly_income": 4800,
            "application_fee_paid": true
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["message"], json!("Application submitted"));
    assert_eq!(data_str(&payload, "status"), Some("Submitted"));
    assert_eq!(data_str(&payload, "property_id"), Some("p-400"));
}

#[tokio::test]
async fn unknown_application_returns_not_found() {
    let harness = harness();

    let (status, payload) = get(router(&harness), "/api/v1/leasing/applications/app-missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["success"], json!(false));
    assert_eq!(payload["errors"], json!(["application app-missing not found"]));
    assert!(payload.get("data").is_none());
}

#[tokio::test]
async fn deny_without_reason_is_unprocessable() {
    let harness = harness();
    let property = harness.seed_property("p-401");
    let prospect = harness.seed_prospect("pr-401", "Morgan");
    let application = harness.submit(&prospect, &property, "D401");

    let (status, payload) = post(
        router(&harness),
        &format!("/api/v1/leasing/applications/{}/deny", application.id),
        json!({ "reason": "" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(payload["success"], json!(false));
    assert!(payload["message"]
        .as_str()
        .is_some_and(|message| message.contains("reason")));
}

#[tokio::test]
async fn offer_can_be_generated_and_accepted_over_http() {
    let harness = harness();
    let property = harness.seed_property("p-402");
    let approved = harness.approved("pr-402", &property);

    let (status, payload) = post(
        router(&harness),
        &format!("/api/v1/leasing/applications/{}/offer", approved.id),
        json!({
            "start_date": days_from_today(14),
            "end_date": days_from_today(379),
            "monthly_rent": 1500,
            "security_deposit": 1500
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payload["data"]["competitors_denied"], json!(0));
    let offer_id = payload["data"]["offer"]["id"]
        .as_str()
        .expect("offer id")
        .to_string();

    let (status, payload) = post(
        router(&harness),
        &format!("/api/v1/leasing/offers/{offer_id}/accept"),
        json!({ "payment_method": "Card", "received_on": today() }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payload["data"]["lease"]["status"], json!("Active"));
    assert_eq!(payload["data"]["deposit"]["status"], json!("Held"));

    let (status, payload) = get(router(&harness), "/api/v1/leasing/properties/p-402").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data_str(&payload, "status"), Some("Occupied"));

    let (status, payload) = get(
        router(&harness),
        &format!("/api/v1/leasing/audit/LeaseOffer/{offer_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let trail = payload["data"].as_array().expect("audit entries");
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1]["to_status"], json!("Accepted"));
}

#[tokio::test]
async fn lease_notice_route_accepts_snake_case_notice_types() {
    let harness = harness();
    let lease = harness.seed_lease("lease-403", LeaseStatus::Active);

    let (status, payload) = post(
        router(&harness),
        "/api/v1/leasing/leases/lease-403/notice",
        json!({
            "notice_date": today(),
            "move_out_date": days_from_today(45),
            "notice_type": "landlord_initiated",
            "reason": "Owner move-in"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(data_str(&payload, "status"), Some("NoticeGiven"));
    assert_eq!(data_str(&payload, "id"), Some(lease.id.as_str()));
}

#[tokio::test]
async fn overdue_offer_sweep_reports_count() {
    let harness = harness();
    let property = harness.seed_property("p-404");
    harness.offered("pr-404", &property);
    harness.clock.advance(chrono::Duration::days(40));

    let (status, payload) = post(
        router(&harness),
        &format!("/api/v1/leasing/organizations/{ORG}/offers/expire"),
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["data"]["expired"], json!(1));
}

#[tokio::test]
async fn audit_route_rejects_unknown_entity_kinds() {
    let harness = harness();

    let (status, payload) = get(router(&harness), "/api/v1/leasing/audit/Invoice/inv-1").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(payload["message"]
        .as_str()
        .is_some_and(|message| message.contains("Invoice")));
}

#[test]
fn error_status_maps_every_failure_kind() {
    assert_eq!(
        error_status(&WorkflowError::validation("bad")),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        error_status(&WorkflowError::InvalidTransition("no".to_string())),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        error_status(&WorkflowError::NotFound {
            entity: "lease",
            id: "lease-1".to_string()
        }),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        error_status(&WorkflowError::Conflict("raced".to_string())),
        StatusCode::CONFLICT
    );
    assert_eq!(
        error_status(&WorkflowError::Unexpected("boom".to_string())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
