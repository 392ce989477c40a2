use std::collections::BTreeMap;

use super::domain::{AuditEntryId, AuditLogEntry, EntityKind};
use super::transitions::WorkflowState;
use super::unit_of_work::{UnitOfWork, WorkflowError};

/// Draft of one transition record, completed with actor, organization and
/// timestamp when recorded.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    entity: EntityKind,
    entity_id: String,
    from_status: Option<&'static str>,
    to_status: &'static str,
    action: &'static str,
    reason: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl AuditRecord {
    pub fn transition<S: WorkflowState>(
        entity_id: impl ToString,
        from: Option<S>,
        to: S,
        action: &'static str,
    ) -> Self {
        Self {
            entity: S::KIND,
            entity_id: entity_id.to_string(),
            from_status: from.map(WorkflowState::label),
            to_status: to.label(),
            action,
            reason: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Record for a status that has no transition table, such as a screening result.
    pub fn labeled(
        entity: EntityKind,
        entity_id: impl ToString,
        from: Option<&'static str>,
        to: &'static str,
        action: &'static str,
    ) -> Self {
        Self {
            entity,
            entity_id: entity_id.to_string(),
            from_status: from,
            to_status: to,
            action,
            reason: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Stage an audit entry in the same unit of work as the mutation it documents.
pub fn record(uow: &mut UnitOfWork<'_>, record: AuditRecord) -> AuditEntryId {
    let id = AuditEntryId::generate();
    let entry = AuditLogEntry {
        id: id.clone(),
        organization_id: uow.organization_id().clone(),
        entity_kind: record.entity,
        entity_id: record.entity_id,
        from_status: record.from_status.map(str::to_string),
        to_status: record.to_status.to_string(),
        action: record.action.to_string(),
        reason: record.reason,
        actor: uow.actor().to_string(),
        metadata: record.metadata,
        recorded_at: uow.now(),
    };
    uow.append_audit(entry);
    id
}

/// Gate a status change on the transition table, apply it and record it.
pub fn transition<S: WorkflowState>(
    uow: &mut UnitOfWork<'_>,
    entity_id: impl ToString,
    status: &mut S,
    to: S,
    action: &'static str,
    reason: Option<&str>,
) -> Result<(), WorkflowError> {
    let from = *status;
    if !from.is_valid_transition(to) {
        return Err(WorkflowError::InvalidTransition(
            from.invalid_transition_reason(to),
        ));
    }
    *status = to;

    let mut draft = AuditRecord::transition(entity_id, Some(from), to, action);
    if let Some(reason) = reason {
        draft = draft.reason(reason);
    }
    record(uow, draft);
    Ok(())
}

/// Apply a status change whose allowed source states the operation checked
/// itself, and record it.
pub fn assign<S: WorkflowState>(
    uow: &mut UnitOfWork<'_>,
    entity_id: impl ToString,
    status: &mut S,
    to: S,
    action: &'static str,
    reason: Option<&str>,
) {
    let from = *status;
    *status = to;

    let mut draft = AuditRecord::transition(entity_id, Some(from), to, action);
    if let Some(reason) = reason {
        draft = draft.reason(reason);
    }
    record(uow, draft);
}

/// Set a derived status (prospect, property) without gating; records only real changes.
pub fn mirror<S: WorkflowState>(
    uow: &mut UnitOfWork<'_>,
    entity_id: impl ToString,
    status: &mut S,
    to: S,
    action: &'static str,
) -> bool {
    let from = *status;
    if from == to {
        return false;
    }
    *status = to;
    record(uow, AuditRecord::transition(entity_id, Some(from), to, action));
    true
}

/// Entries for one entity, oldest first.
pub fn trail(entries: &[AuditLogEntry], entity: EntityKind, entity_id: &str) -> Vec<AuditLogEntry> {
    entries
        .iter()
        .filter(|entry| entry.entity_kind == entity && entry.entity_id == entity_id)
        .cloned()
        .collect()
}
