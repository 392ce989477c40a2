use chrono::NaiveDate;
use leaseflow::workflows::leasing::domain::{
    EntityKind, Organization, OrganizationId, Property, PropertyId, PropertyStatus, Prospect,
    ProspectId, ProspectStatus,
};
use leaseflow::workflows::leasing::ports::{
    AlertError, AlertPublisher, NoteError, NoteService, WorkflowAlert,
};
use leaseflow::workflows::leasing::{MemoryStore, StoreError};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Alert sink that logs every alert and keeps a copy for inspection.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAlertPublisher {
    events: Arc<Mutex<Vec<WorkflowAlert>>>,
}

impl AlertPublisher for InMemoryAlertPublisher {
    fn publish(&self, alert: WorkflowAlert) -> Result<(), AlertError> {
        info!(
            template = %alert.template,
            entity = %alert.entity,
            entity_id = %alert.entity_id,
            details = ?alert.details,
            "workflow alert"
        );
        let mut guard = self
            .events
            .lock()
            .map_err(|_| AlertError::Transport("alert buffer poisoned".to_string()))?;
        guard.push(alert);
        Ok(())
    }
}

impl InMemoryAlertPublisher {
    pub(crate) fn events(&self) -> Vec<WorkflowAlert> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedNote {
    pub(crate) entity: EntityKind,
    pub(crate) entity_id: String,
    pub(crate) text: String,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNoteService {
    notes: Arc<Mutex<Vec<RecordedNote>>>,
}

impl NoteService for InMemoryNoteService {
    fn add_note(&self, entity: EntityKind, entity_id: &str, text: &str) -> Result<(), NoteError> {
        debug!(%entity, entity_id, text, "note recorded");
        let mut guard = self
            .notes
            .lock()
            .map_err(|_| NoteError::Unavailable("note buffer poisoned".to_string()))?;
        guard.push(RecordedNote {
            entity,
            entity_id: entity_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

impl InMemoryNoteService {
    pub(crate) fn notes(&self) -> Vec<RecordedNote> {
        self.notes
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Ids of the starter portfolio loaded into a fresh store.
#[derive(Debug, Clone)]
pub(crate) struct SeededPortfolio {
    pub(crate) properties: Vec<PropertyId>,
    pub(crate) prospects: Vec<ProspectId>,
}

const DEMO_PROPERTIES: [(&str, &str, &str); 3] = [
    ("unit-101", "Cedar Court 101", "101 Cedar Court"),
    ("unit-204", "Cedar Court 204", "204 Cedar Court"),
    ("unit-310", "Birch Row 310", "310 Birch Row"),
];

const DEMO_PROSPECTS: [(&str, &str, &str); 4] = [
    ("prospect-avery", "Avery", "Lindqvist"),
    ("prospect-blake", "Blake", "Osei"),
    ("prospect-casey", "Casey", "Moreno"),
    ("prospect-devon", "Devon", "Nakamura"),
];

/// Load an organization with a few vacant units and prospects.
pub(crate) fn seed_portfolio(
    store: &MemoryStore,
    organization_id: &OrganizationId,
) -> Result<SeededPortfolio, StoreError> {
    store.seed(Organization {
        id: organization_id.clone(),
        name: "Cedar Property Management".to_string(),
        application_expiration_days: None,
        version: 0,
    })?;

    let mut properties = Vec::with_capacity(DEMO_PROPERTIES.len());
    for (id, name, address) in DEMO_PROPERTIES {
        let property = store.seed(Property {
            id: PropertyId::new(id),
            organization_id: organization_id.clone(),
            name: name.to_string(),
            address: address.to_string(),
            status: PropertyStatus::Available,
            version: 0,
        })?;
        properties.push(property.id);
    }

    let mut prospects = Vec::with_capacity(DEMO_PROSPECTS.len());
    for (id, first_name, last_name) in DEMO_PROSPECTS {
        let prospect = store.seed(Prospect {
            id: ProspectId::new(id),
            organization_id: organization_id.clone(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!("{}@example.com", first_name.to_ascii_lowercase()),
            phone: None,
            status: ProspectStatus::Lead,
            version: 0,
        })?;
        prospects.push(prospect.id);
    }

    info!(
        organization_id = %organization_id,
        properties = properties.len(),
        prospects = prospects.len(),
        "seeded starter portfolio"
    );
    Ok(SeededPortfolio {
        properties,
        prospects,
    })
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
