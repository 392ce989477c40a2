use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EntityKind, OrganizationId};

/// Identity of whoever is driving the current operation.
pub trait ActorContext: Send + Sync {
    fn current_user_id(&self) -> String;
    fn active_organization_id(&self) -> OrganizationId;
}

/// Fixed actor, suitable for services acting on behalf of one organization.
#[derive(Debug, Clone)]
pub struct StaticActor {
    user_id: String,
    organization_id: OrganizationId,
}

impl StaticActor {
    pub fn new(user_id: impl Into<String>, organization_id: OrganizationId) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id,
        }
    }
}

impl ActorContext for StaticActor {
    fn current_user_id(&self) -> String {
        self.user_id.clone()
    }

    fn active_organization_id(&self) -> OrganizationId {
        self.organization_id.clone()
    }
}

/// Source of "now" for expiry and date rules.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for deterministic expiry scenarios.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Free-form notes attached to records. Best-effort and outside the transaction.
pub trait NoteService: Send + Sync {
    fn add_note(&self, entity: EntityKind, entity_id: &str, text: &str) -> Result<(), NoteError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("note storage unavailable: {0}")]
    Unavailable(String),
}

/// Trait describing outbound alert hooks (e.g., e-mail or SMS adapters).
pub trait AlertPublisher: Send + Sync {
    fn publish(&self, alert: WorkflowAlert) -> Result<(), AlertError>;
}

/// Notification emitted after a transition commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowAlert {
    pub template: String,
    pub entity: EntityKind,
    pub entity_id: String,
    pub details: BTreeMap<String, String>,
}

impl WorkflowAlert {
    pub fn new(template: &str, entity: EntityKind, entity_id: impl ToString) -> Self {
        Self {
            template: template.to_string(),
            entity,
            entity_id: entity_id.to_string(),
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Alert dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert transport unavailable: {0}")]
    Transport(String),
}
