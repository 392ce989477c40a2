use std::io;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::LeasingConfig;
use crate::workflows::leasing::applications::{
    AcceptedOffer, ApplicationSubmission, DepositPayment, GeneratedOffer, LeaseOfferTerms,
    ScreeningRequest, ScreeningResults,
};
use crate::workflows::leasing::domain::{
    Application, AuditLogEntry, EntityKind, Identification, Lease, LeaseId, LeaseStatus,
    Organization, OrganizationId, Property, PropertyId, PropertyStatus, Prospect, ProspectId,
    ProspectStatus, ScreeningResult, Tenant, TenantId,
};
use crate::workflows::leasing::ports::{
    AlertError, AlertPublisher, FixedClock, NoteError, NoteService, StaticActor, WorkflowAlert,
};
use crate::workflows::leasing::store::{MemoryStore, Store, StoreError, StoreTransaction, Tables};
use crate::workflows::leasing::{
    ApplicationWorkflow, LeaseWorkflow, LeasingServices, UnitOfWorkExecutor,
};

pub(super) const ORG: &str = "org-maple";
pub(super) const AGENT: &str = "leasing-agent";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn today() -> NaiveDate {
    now().date_naive()
}

pub(super) fn days_from_today(days: i64) -> NaiveDate {
    today() + Duration::days(days)
}

pub(super) fn org() -> OrganizationId {
    OrganizationId::new(ORG)
}

pub(super) fn submission(id_number: &str) -> ApplicationSubmission {
    ApplicationSubmission {
        identification: Identification {
            number: id_number.to_string(),
            state: "IA".to_string(),
        },
        monthly_income: Some(5200),
        desired_move_in: Some(days_from_today(14)),
        application_fee_paid: true,
    }
}

pub(super) fn offer_terms() -> LeaseOfferTerms {
    LeaseOfferTerms {
        start_date: days_from_today(14),
        end_date: days_from_today(14 + 365),
        monthly_rent: 1500,
        security_deposit: 1500,
        special_terms: None,
    }
}

pub(super) fn card_payment() -> DepositPayment {
    DepositPayment {
        payment_method: "Card".to_string(),
        received_on: today(),
        move_in_date: Some(days_from_today(14)),
    }
}

pub(super) fn passed() -> ScreeningResults {
    ScreeningResults {
        background_result: Some(ScreeningResult::Passed),
        credit_result: Some(ScreeningResult::Passed),
        credit_score: Some(724),
        overall_result: ScreeningResult::Passed,
        notes: None,
    }
}

pub(super) fn both_checks() -> ScreeningRequest {
    ScreeningRequest {
        background_check: true,
        credit_check: true,
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<MemoryStore>,
    pub(super) clock: Arc<FixedClock>,
    pub(super) alerts: Arc<MemoryAlerts>,
    pub(super) notes: Arc<MemoryNotes>,
    pub(super) applications: ApplicationWorkflow<MemoryStore>,
    pub(super) leases: LeaseWorkflow<MemoryStore>,
}

pub(super) fn harness() -> Harness {
    harness_with(LeasingConfig::default())
}

pub(super) fn harness_with(config: LeasingConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(now()));
    let alerts = Arc::new(MemoryAlerts::default());
    let notes = Arc::new(MemoryNotes::default());

    store
        .seed(Organization {
            id: org(),
            name: "Maple Property Group".to_string(),
            application_expiration_days: None,
            version: 0,
        })
        .expect("seed organization");

    let executor = executor_for(store.clone(), clock.clone(), alerts.clone(), notes.clone());
    Harness {
        applications: ApplicationWorkflow::new(executor.clone(), config),
        leases: LeaseWorkflow::new(executor, config),
        store,
        clock,
        alerts,
        notes,
    }
}

pub(super) fn executor_for<S: Store + 'static>(
    store: Arc<S>,
    clock: Arc<FixedClock>,
    alerts: Arc<MemoryAlerts>,
    notes: Arc<MemoryNotes>,
) -> UnitOfWorkExecutor<S> {
    UnitOfWorkExecutor::new(
        store,
        Arc::new(StaticActor::new(AGENT, org())),
        clock,
        alerts,
        notes,
    )
}

impl Harness {
    pub(super) fn services(&self) -> LeasingServices<MemoryStore> {
        LeasingServices {
            applications: self.applications.clone(),
            leases: self.leases.clone(),
        }
    }

    pub(super) fn seed_property(&self, id: &str) -> PropertyId {
        self.store
            .seed(Property {
                id: PropertyId::new(id),
                organization_id: org(),
                name: format!("Unit {id}"),
                address: "410 Walnut Street".to_string(),
                status: PropertyStatus::Available,
                version: 0,
            })
            .expect("seed property")
            .id
    }

    pub(super) fn seed_prospect(&self, id: &str, first_name: &str) -> ProspectId {
        self.store
            .seed(Prospect {
                id: ProspectId::new(id),
                organization_id: org(),
                first_name: first_name.to_string(),
                last_name: "Rivera".to_string(),
                email: format!("{}@example.com", first_name.to_lowercase()),
                phone: Some("515-555-0142".to_string()),
                status: ProspectStatus::Lead,
                version: 0,
            })
            .expect("seed prospect")
            .id
    }

    /// Seed a tenant and a lease directly, bypassing the offer flow.
    pub(super) fn seed_lease(&self, id: &str, status: LeaseStatus) -> Lease {
        let property_id = self.seed_property(&format!("{id}-unit"));
        self.store
            .seed(Tenant {
                id: TenantId::new(format!("{id}-tenant")),
                organization_id: org(),
                prospect_id: ProspectId::new(format!("{id}-prospect")),
                first_name: "Dana".to_string(),
                last_name: "Okafor".to_string(),
                email: "dana@example.com".to_string(),
                phone: None,
                is_active: status != LeaseStatus::Pending,
                created_at: now(),
                version: 0,
            })
            .expect("seed tenant");

        let mut property = self.property(&property_id);
        property.status = if status == LeaseStatus::Pending {
            PropertyStatus::LeasePending
        } else {
            PropertyStatus::Occupied
        };
        self.store.seed(property).expect("reseed property");

        self.store
            .seed(Lease {
                id: LeaseId::new(id),
                organization_id: org(),
                property_id,
                tenant_id: TenantId::new(format!("{id}-tenant")),
                lease_offer_id: None,
                previous_lease_id: None,
                renewal_number: 0,
                status,
                start_date: days_from_today(-180),
                end_date: days_from_today(185),
                monthly_rent: 1400,
                security_deposit: 1400,
                move_in_date: Some(days_from_today(-180)),
                notice: None,
                termination: None,
                move_out: None,
                version: 0,
            })
            .expect("seed lease")
    }

    pub(super) fn submit(&self, prospect: &ProspectId, property: &PropertyId, id_number: &str) -> Application {
        self.applications
            .submit(prospect, property, submission(id_number))
            .expect("submission succeeds")
    }

    /// Submit, screen and approve an application for a fresh prospect.
    pub(super) fn approved(&self, prospect: &str, property: &PropertyId) -> Application {
        let prospect_id = self.seed_prospect(prospect, "Avery");
        let application = self.submit(&prospect_id, property, &format!("D-{prospect}"));
        self.applications
            .initiate_screening(&application.id, both_checks())
            .expect("screening starts");
        self.applications
            .complete_screening(&application.id, passed())
            .expect("screening completes");
        self.applications
            .approve(&application.id)
            .expect("approval succeeds")
    }

    pub(super) fn offered(&self, prospect: &str, property: &PropertyId) -> (Application, GeneratedOffer) {
        let application = self.approved(prospect, property);
        let generated = self
            .applications
            .generate_lease_offer(&application.id, offer_terms())
            .expect("offer generated");
        (application, generated)
    }

    pub(super) fn accepted(&self, prospect: &str, property: &PropertyId) -> AcceptedOffer {
        let (_, generated) = self.offered(prospect, property);
        self.applications
            .accept_lease_offer(&generated.offer.id, card_payment())
            .expect("offer accepted")
    }

    pub(super) fn tables(&self) -> Tables {
        self.store.snapshot().expect("snapshot")
    }

    pub(super) fn property(&self, id: &PropertyId) -> Property {
        self.tables().properties[id].clone()
    }

    pub(super) fn property_status(&self, id: &PropertyId) -> PropertyStatus {
        self.property(id).status
    }

    pub(super) fn prospect_status(&self, id: &ProspectId) -> ProspectStatus {
        self.tables().prospects[id].status
    }

    pub(super) fn audit_for(&self, entity: EntityKind, id: &str) -> Vec<AuditLogEntry> {
        self.tables()
            .audit_log
            .into_iter()
            .filter(|entry| entry.entity_kind == entity && entry.entity_id == id)
            .collect()
    }
}

#[derive(Default)]
pub(super) struct MemoryAlerts {
    events: Mutex<Vec<WorkflowAlert>>,
}

impl MemoryAlerts {
    pub(super) fn events(&self) -> Vec<WorkflowAlert> {
        self.events.lock().expect("alert mutex poisoned").clone()
    }

    pub(super) fn templates(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|alert| alert.template)
            .collect()
    }
}

impl AlertPublisher for MemoryAlerts {
    fn publish(&self, alert: WorkflowAlert) -> Result<(), AlertError> {
        self.events
            .lock()
            .expect("alert mutex poisoned")
            .push(alert);
        Ok(())
    }
}

pub(super) struct OfflineAlerts;

impl AlertPublisher for OfflineAlerts {
    fn publish(&self, _alert: WorkflowAlert) -> Result<(), AlertError> {
        Err(AlertError::Transport("smtp relay offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryNotes {
    notes: Mutex<Vec<(EntityKind, String, String)>>,
}

impl MemoryNotes {
    pub(super) fn notes(&self) -> Vec<(EntityKind, String, String)> {
        self.notes.lock().expect("note mutex poisoned").clone()
    }
}

impl NoteService for MemoryNotes {
    fn add_note(&self, entity: EntityKind, entity_id: &str, text: &str) -> Result<(), NoteError> {
        self.notes.lock().expect("note mutex poisoned").push((
            entity,
            entity_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}

/// Store whose commits always fail with a wrapped I/O error.
#[derive(Default)]
pub(super) struct BrokenDiskStore {
    inner: MemoryStore,
}

impl Store for BrokenDiskStore {
    fn begin(&self) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        let inner = self.inner.begin()?;
        Ok(Box::new(BrokenDiskTransaction { inner }))
    }
}

struct BrokenDiskTransaction<'a> {
    inner: Box<dyn StoreTransaction + 'a>,
}

impl StoreTransaction for BrokenDiskTransaction<'_> {
    fn tables(&self) -> &Tables {
        self.inner.tables()
    }

    fn commit(self: Box<Self>, _changes: Tables) -> Result<(), StoreError> {
        let BrokenDiskTransaction { inner } = *self;
        inner.rollback();
        Err(StoreError::Backend {
            context: "flushing the write-ahead log".to_string(),
            source: Box::new(io::Error::new(io::ErrorKind::Other, "disk quota exceeded")),
        })
    }

    fn rollback(self: Box<Self>) {
        let BrokenDiskTransaction { inner } = *self;
        inner.rollback();
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
