use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::domain::{AuditLogEntry, EntityKind, OrganizationId};
use super::ports::{ActorContext, AlertPublisher, Clock, NoteService, WorkflowAlert};
use super::store::{Entity, Store, StoreError, StoreTransaction, Tables};

/// Failure returned by every workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unexpected(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found<T: Entity>(id: &T::Id) -> Self {
        Self::NotFound {
            entity: T::NAME,
            id: id.to_string(),
        }
    }
}

/// Presentation-boundary view of an operation outcome.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub errors: Vec<String>,
    pub message: String,
}

impl<T> OperationResult<T> {
    pub fn from_result(result: Result<T, WorkflowError>, success_message: &str) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                errors: Vec::new(),
                message: success_message.to_string(),
            },
            Err(err) => {
                let message = err.to_string();
                Self {
                    success: false,
                    data: None,
                    errors: vec![message.clone()],
                    message,
                }
            }
        }
    }
}

#[derive(Debug)]
enum PostCommit {
    Alert(WorkflowAlert),
    Note {
        entity: EntityKind,
        entity_id: String,
        text: String,
    },
}

/// Identity map and change tracker for one operation.
///
/// Reads observe staged records before committed ones. Nothing reaches the store
/// until the executor commits; on any failure the staging area is discarded.
pub struct UnitOfWork<'s> {
    tx: Box<dyn StoreTransaction + 's>,
    staged: Tables,
    outbox: Vec<PostCommit>,
    organization_id: OrganizationId,
    actor: String,
    now: DateTime<Utc>,
}

impl<'s> UnitOfWork<'s> {
    fn new(
        tx: Box<dyn StoreTransaction + 's>,
        organization_id: OrganizationId,
        actor: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tx,
            staged: Tables::default(),
            outbox: Vec::new(),
            organization_id,
            actor,
            now,
        }
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Timestamp fixed at the start of the unit of work.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Look up a record inside the active organization.
    pub fn get<T: Entity>(&self, id: &T::Id) -> Option<T> {
        T::table(&self.staged)
            .get(id)
            .or_else(|| T::table(self.tx.tables()).get(id))
            .filter(|record| record.organization_id() == &self.organization_id)
            .cloned()
    }

    pub fn require<T: Entity>(&self, id: &T::Id) -> Result<T, WorkflowError> {
        self.get(id).ok_or_else(|| WorkflowError::not_found::<T>(id))
    }

    /// All records of a kind in the active organization matching `predicate`, ordered by id.
    pub fn find<T: Entity>(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let staged = T::table(&self.staged);
        let committed = T::table(self.tx.tables());

        let mut records: Vec<T> = committed
            .iter()
            .filter(|(id, _)| !staged.contains_key(*id))
            .map(|(_, record)| record)
            .chain(staged.values())
            .filter(|record| record.organization_id() == &self.organization_id)
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        records
    }

    /// Stage an insert or update.
    pub fn stage<T: Entity>(&mut self, record: T) {
        T::table_mut(&mut self.staged).insert(record.id().clone(), record);
    }

    pub(crate) fn append_audit(&mut self, entry: AuditLogEntry) {
        self.staged.audit_log.push(entry);
    }

    /// Committed and staged audit entries for the active organization, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.tx
            .tables()
            .audit_log
            .iter()
            .chain(self.staged.audit_log.iter())
            .filter(|entry| entry.organization_id == self.organization_id)
            .cloned()
            .collect()
    }

    /// Queue an alert for delivery once the unit of work commits.
    pub fn notify(&mut self, alert: WorkflowAlert) {
        self.outbox.push(PostCommit::Alert(alert));
    }

    /// Queue a note for delivery once the unit of work commits.
    pub fn add_note(&mut self, entity: EntityKind, entity_id: impl ToString, text: impl Into<String>) {
        self.outbox.push(PostCommit::Note {
            entity,
            entity_id: entity_id.to_string(),
            text: text.into(),
        });
    }

    fn discard(&mut self) {
        self.staged = Tables::default();
        self.outbox.clear();
    }

    fn rollback(mut self) {
        self.discard();
        self.tx.rollback();
    }
}

/// Runs workflow operations as atomic units of work and delivers their
/// post-commit effects.
pub struct UnitOfWorkExecutor<S> {
    store: Arc<S>,
    actor: Arc<dyn ActorContext>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertPublisher>,
    notes: Arc<dyn NoteService>,
}

impl<S> Clone for UnitOfWorkExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            actor: Arc::clone(&self.actor),
            clock: Arc::clone(&self.clock),
            alerts: Arc::clone(&self.alerts),
            notes: Arc::clone(&self.notes),
        }
    }
}

impl<S> UnitOfWorkExecutor<S>
where
    S: Store + 'static,
{
    pub fn new(
        store: Arc<S>,
        actor: Arc<dyn ActorContext>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertPublisher>,
        notes: Arc<dyn NoteService>,
    ) -> Self {
        Self {
            store,
            actor,
            clock,
            alerts,
            notes,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn active_organization_id(&self) -> OrganizationId {
        self.actor.active_organization_id()
    }

    /// Run `op` in the actor's active organization.
    pub fn execute<T, F>(&self, action: &'static str, op: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, WorkflowError>,
    {
        self.execute_in(self.actor.active_organization_id(), action, op)
    }

    /// Run `op` scoped to `organization_id`. Commits on `Ok`; on `Err` or panic the
    /// transaction is rolled back and every staged record is discarded.
    pub fn execute_in<T, F>(
        &self,
        organization_id: OrganizationId,
        action: &'static str,
        op: F,
    ) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, WorkflowError>,
    {
        let tx = self.store.begin().map_err(|err| store_fault(action, &err))?;
        let mut uow = UnitOfWork::new(
            tx,
            organization_id,
            self.actor.current_user_id(),
            self.clock.now(),
        );

        match panic::catch_unwind(AssertUnwindSafe(|| op(&mut uow))) {
            Ok(Ok(value)) => {
                let UnitOfWork {
                    tx, staged, outbox, ..
                } = uow;
                let audit_entries = staged.audit_log.len();
                tx.commit(staged).map_err(|err| store_fault(action, &err))?;
                debug!(action, audit_entries, "unit of work committed");
                self.dispatch(outbox);
                Ok(value)
            }
            Ok(Err(err)) => {
                uow.rollback();
                info!(action, error = %err, "unit of work rolled back");
                Err(err)
            }
            Err(payload) => {
                uow.rollback();
                let cause = panic_message(payload.as_ref());
                error!(action, %cause, "unit of work aborted by a fault");
                Err(WorkflowError::Unexpected(format!(
                    "An unexpected error occurred during {action}: {cause}"
                )))
            }
        }
    }

    fn dispatch(&self, outbox: Vec<PostCommit>) {
        for effect in outbox {
            match effect {
                PostCommit::Alert(alert) => {
                    let template = alert.template.clone();
                    if let Err(err) = self.alerts.publish(alert) {
                        warn!(%template, error = %err, "alert delivery failed");
                    }
                }
                PostCommit::Note {
                    entity,
                    entity_id,
                    text,
                } => {
                    if let Err(err) = self.notes.add_note(entity, &entity_id, &text) {
                        warn!(%entity, %entity_id, error = %err, "note could not be recorded");
                    }
                }
            }
        }
    }
}

/// Render an error and every error in its `source()` chain.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn store_fault(action: &str, err: &StoreError) -> WorkflowError {
    let detail = error_chain(err);
    match err {
        StoreError::Conflict(_) => {
            warn!(action, %detail, "unit of work lost a write conflict");
            WorkflowError::Conflict(format!("{action} could not be committed: {detail}"))
        }
        _ => {
            error!(action, %detail, "store failure");
            WorkflowError::Unexpected(format!(
                "An unexpected error occurred during {action}: {detail}"
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "operation panicked".to_string()
    }
}
