use std::sync::Arc;

use super::common::*;
use crate::workflows::leasing::audit::{self, AuditRecord};
use crate::workflows::leasing::domain::{
    EntityKind, OrganizationId, Property, PropertyId, PropertyStatus,
};
use crate::workflows::leasing::ports::{FixedClock, StaticActor};
use crate::workflows::leasing::store::MemoryStore;
use crate::workflows::leasing::{OperationResult, UnitOfWorkExecutor, WorkflowError};

fn executor(harness: &Harness) -> UnitOfWorkExecutor<MemoryStore> {
    executor_for(
        harness.store.clone(),
        harness.clock.clone(),
        harness.alerts.clone(),
        harness.notes.clone(),
    )
}

fn mark_pending(
    uow: &mut crate::workflows::leasing::UnitOfWork<'_>,
    id: &PropertyId,
) -> Result<(), WorkflowError> {
    let mut property = uow.require::<Property>(id)?;
    audit::mirror(
        uow,
        &property.id,
        &mut property.status,
        PropertyStatus::ApplicationPending,
        "Test",
    );
    uow.stage(property);
    Ok(())
}

#[test]
fn successful_operation_commits_records_and_audit() {
    let harness = harness();
    let property_id = harness.seed_property("p-100");

    executor(&harness)
        .execute("mark pending", |uow| mark_pending(uow, &property_id))
        .expect("commit succeeds");

    let property = harness.property(&property_id);
    assert_eq!(property.status, PropertyStatus::ApplicationPending);
    assert_eq!(property.version, 2);

    let trail = harness.audit_for(EntityKind::Property, "p-100");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].from_status.as_deref(), Some("Available"));
    assert_eq!(trail[0].to_status, "ApplicationPending");
    assert_eq!(trail[0].actor, AGENT);
    assert_eq!(trail[0].recorded_at, now());
}

#[test]
fn failed_operation_leaves_no_trace() {
    let harness = harness();
    let property_id = harness.seed_property("p-101");

    let result: Result<(), WorkflowError> = executor(&harness).execute("mark pending", |uow| {
        mark_pending(uow, &property_id)?;
        uow.notify(crate::workflows::leasing::ports::WorkflowAlert::new(
            "never_sent",
            EntityKind::Property,
            &property_id,
        ));
        uow.add_note(EntityKind::Property, &property_id, "never written");
        Err(WorkflowError::validation("reject after staging"))
    });

    match result {
        Err(WorkflowError::Validation(message)) => assert_eq!(message, "reject after staging"),
        other => panic!("expected validation failure, got {other:?}"),
    }
    assert_eq!(harness.property_status(&property_id), PropertyStatus::Available);
    assert!(harness.tables().audit_log.is_empty());
    assert!(harness.alerts.events().is_empty());
    assert!(harness.notes.notes().is_empty());
}

#[test]
fn panic_is_converted_into_unexpected_failure() {
    let harness = harness();
    let property_id = harness.seed_property("p-102");

    let result: Result<(), WorkflowError> = executor(&harness).execute("mark pending", |uow| {
        mark_pending(uow, &property_id)?;
        panic!("index out of range in rent schedule");
    });

    match result {
        Err(WorkflowError::Unexpected(message)) => {
            assert!(message.contains("mark pending"));
            assert!(message.contains("index out of range in rent schedule"));
        }
        other => panic!("expected unexpected failure, got {other:?}"),
    }
    assert_eq!(harness.property_status(&property_id), PropertyStatus::Available);
    assert!(harness.tables().audit_log.is_empty());

    // The store lock is released after the fault.
    executor(&harness)
        .execute("mark pending", |uow| mark_pending(uow, &property_id))
        .expect("store usable after panic");
}

#[test]
fn backend_failure_exposes_inner_cause() {
    let harness = harness();
    let store = Arc::new(BrokenDiskStore::default());
    let executor = executor_for(
        store,
        harness.clock.clone(),
        harness.alerts.clone(),
        harness.notes.clone(),
    );

    let result = executor.execute("record audit", |uow| {
        audit::record(
            uow,
            AuditRecord::labeled(EntityKind::Tenant, "tenant-1", None, "Active", "Test"),
        );
        uow.notify(crate::workflows::leasing::ports::WorkflowAlert::new(
            "never_sent",
            EntityKind::Tenant,
            "tenant-1",
        ));
        Ok(())
    });

    match result {
        Err(WorkflowError::Unexpected(message)) => {
            assert!(message.contains("flushing the write-ahead log"));
            assert!(message.contains("disk quota exceeded"));
        }
        other => panic!("expected unexpected failure, got {other:?}"),
    }
    assert!(harness.alerts.events().is_empty());
}

#[test]
fn stale_write_surfaces_as_conflict() {
    let harness = harness();
    let property_id = harness.seed_property("p-103");
    let stale = harness.property(&property_id);

    executor(&harness)
        .execute("mark pending", |uow| mark_pending(uow, &property_id))
        .expect("first write");

    let result = executor(&harness).execute("overwrite property", |uow| {
        let mut overwrite = stale.clone();
        overwrite.status = PropertyStatus::Occupied;
        uow.stage(overwrite);
        Ok(())
    });

    match result {
        Err(WorkflowError::Conflict(message)) => {
            assert!(message.contains("overwrite property could not be committed"));
            assert!(message.contains("p-103"));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(
        harness.property_status(&property_id),
        PropertyStatus::ApplicationPending
    );
}

#[test]
fn reads_are_scoped_to_the_active_organization() {
    let harness = harness();
    harness
        .store
        .seed(Property {
            id: PropertyId::new("p-elsewhere"),
            organization_id: OrganizationId::new("org-other"),
            name: "Other portfolio".to_string(),
            address: "1 Elm".to_string(),
            status: PropertyStatus::Available,
            version: 0,
        })
        .expect("seed");

    let result = executor(&harness).execute("load", |uow| {
        uow.require::<Property>(&PropertyId::new("p-elsewhere"))
    });
    match result {
        Err(WorkflowError::NotFound { entity, id }) => {
            assert_eq!(entity, "property");
            assert_eq!(id, "p-elsewhere");
        }
        other => panic!("expected not found, got {other:?}"),
    }

    let visible = executor(&harness)
        .execute_in(OrganizationId::new("org-other"), "load", |uow| {
            uow.require::<Property>(&PropertyId::new("p-elsewhere"))
        })
        .expect("visible in owning organization");
    assert_eq!(visible.name, "Other portfolio");
}

#[test]
fn staged_records_are_visible_within_the_unit_of_work() {
    let harness = harness();
    let property_id = harness.seed_property("p-104");

    let seen = executor(&harness)
        .execute("mark pending", |uow| {
            mark_pending(uow, &property_id)?;
            let pending = uow.find::<Property>(|property| {
                property.status == PropertyStatus::ApplicationPending
            });
            Ok(pending.len())
        })
        .expect("commit");

    assert_eq!(seen, 1);
}

#[test]
fn alert_delivery_failure_does_not_fail_the_operation() {
    let harness = harness();
    let property_id = harness.seed_property("p-105");
    let executor = UnitOfWorkExecutor::new(
        harness.store.clone(),
        Arc::new(StaticActor::new(AGENT, org())),
        Arc::new(FixedClock::new(now())),
        Arc::new(OfflineAlerts),
        harness.notes.clone(),
    );

    executor
        .execute("mark pending", |uow| {
            mark_pending(uow, &property_id)?;
            uow.notify(crate::workflows::leasing::ports::WorkflowAlert::new(
                "property_pending",
                EntityKind::Property,
                &property_id,
            ));
            Ok(())
        })
        .expect("operation succeeds despite alert failure");

    assert_eq!(
        harness.property_status(&property_id),
        PropertyStatus::ApplicationPending
    );
}

#[test]
fn operation_result_carries_message_and_errors() {
    let ok = OperationResult::from_result(Ok(3_u32), "Counted");
    assert!(ok.success);
    assert_eq!(ok.data, Some(3));
    assert!(ok.errors.is_empty());
    assert_eq!(ok.message, "Counted");

    let failed: OperationResult<u32> = OperationResult::from_result(
        Err(WorkflowError::NotFound {
            entity: "lease",
            id: "lease-9".to_string(),
        }),
        "Counted",
    );
    assert!(!failed.success);
    assert!(failed.data.is_none());
    assert_eq!(failed.errors, vec!["lease lease-9 not found".to_string()]);
    assert_eq!(failed.message, "lease lease-9 not found");

    let json = serde_json::to_value(&failed).expect("serializes");
    assert!(json.get("data").is_none());
}
