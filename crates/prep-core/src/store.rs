//! Collaborator interfaces and the buffered write model.
//!
//! Everything the engine reads comes through these traits, scoped by tenant
//! on every call. Writes never go through them directly: a cycle collects
//! [`WriteOp`]s into a [`ChangeSet`] and hands it to
//! [`ScreeningStore::commit`], which applies all of it or none of it.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use prep_match::DocumentMatch;
use prep_model::{
    Document, DocumentId, Immunization, ImmunizationId, Patient, PatientCondition, PatientId,
    Screening, ScreeningId, ScreeningKey, ScreeningStatus, ScreeningTypeDefinition,
    ScreeningTypeId, TenantId,
};
use serde::Serialize;

use crate::error::{AuditError, PersistenceError};

/// Transactional store for patients, definitions and screenings.
pub trait ScreeningStore: Send + Sync {
    fn patients(&self, tenant_id: TenantId) -> Result<Vec<Patient>, PersistenceError>;

    fn patient(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Option<Patient>, PersistenceError>;

    /// Patients updated strictly after `since`, or all when `since` is `None`.
    fn patients_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Patient>, PersistenceError>;

    fn conditions(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<PatientCondition>, PersistenceError>;

    /// Conditions updated strictly after `since`, or all when `since` is `None`.
    fn conditions_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PatientCondition>, PersistenceError>;

    /// Every definition of the tenant, active or not.
    fn screening_types(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ScreeningTypeDefinition>, PersistenceError>;

    fn screenings(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<Screening>, PersistenceError>;

    /// Time of the tenant's last committed refresh.
    fn refresh_watermark(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError>;

    /// Patients the last committed refresh could not evaluate.
    fn pending_patients(
        &self,
        tenant_id: TenantId,
    ) -> Result<BTreeSet<PatientId>, PersistenceError>;

    /// Apply a change set atomically.
    fn commit(&self, changes: &ChangeSet) -> Result<CommitSummary, PersistenceError>;
}

/// Local and EHR documents, in one uniform shape.
pub trait DocumentSource: Send + Sync {
    fn documents(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<Document>, PersistenceError>;

    /// Documents updated strictly after `since`, or all when `since` is `None`.
    fn documents_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Document>, PersistenceError>;
}

pub trait ImmunizationSource: Send + Sync {
    fn immunizations(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<Immunization>, PersistenceError>;

    /// Immunizations updated strictly after `since`, or all when `since` is `None`.
    fn immunizations_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Immunization>, PersistenceError>;
}

/// Documents a user explicitly rejected as evidence for a screening.
pub trait DismissalStore: Send + Sync {
    fn is_dismissed(
        &self,
        screening_id: ScreeningId,
        document_id: DocumentId,
    ) -> Result<bool, PersistenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RefreshStarted,
    RefreshCompleted,
    RefreshFailed,
    ScreeningCreated,
    ScreeningArchived,
    ScreeningDeleted,
    ConfigurationError,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RefreshStarted => "refresh_started",
            AuditEventType::RefreshCompleted => "refresh_completed",
            AuditEventType::RefreshFailed => "refresh_failed",
            AuditEventType::ScreeningCreated => "screening_created",
            AuditEventType::ScreeningArchived => "screening_archived",
            AuditEventType::ScreeningDeleted => "screening_deleted",
            AuditEventType::ConfigurationError => "configuration_error",
        }
    }
}

/// Fire-and-forget audit sink.
pub trait AuditLogger: Send + Sync {
    fn log_event(
        &self,
        event_type: AuditEventType,
        details: &serde_json::Value,
    ) -> Result<(), AuditError>;
}

/// Audit sink that forwards events to `tracing` only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log_event(
        &self,
        event_type: AuditEventType,
        details: &serde_json::Value,
    ) -> Result<(), AuditError> {
        tracing::info!(target: "prep_core::audit", event = event_type.as_str(), %details, "audit");
        Ok(())
    }
}

/// Full recomputed state of one screening.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningUpsert {
    pub key: ScreeningKey,
    /// Existing row, or `None` to create one.
    pub screening_id: Option<ScreeningId>,
    pub status: ScreeningStatus,
    pub last_completed_date: Option<NaiveDate>,
    pub matched_immunizations: BTreeSet<ImmunizationId>,
    /// Replaces every match record of the screening.
    pub document_matches: Vec<DocumentMatch>,
    pub is_dormant: bool,
}

/// One buffered write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    UpsertScreening(ScreeningUpsert),
    /// Removes the screening and its match records.
    DeleteScreening {
        screening_id: ScreeningId,
        key: ScreeningKey,
    },
    RecordCriteriaSignature {
        screening_type_id: ScreeningTypeId,
        signature: String,
    },
    /// Moves the watermark and replaces the pending patients. Changes of
    /// pending patients are older than the watermark, so they are carried
    /// to the next cycle explicitly.
    SetRefreshWatermark {
        at: DateTime<Utc>,
        pending_patients: BTreeSet<PatientId>,
    },
}

/// All writes of one refresh cycle for one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub tenant_id: TenantId,
    /// Stamped on every written screening as `last_processed`.
    pub processed_at: DateTime<Utc>,
    ops: Vec<WriteOp>,
}

impl ChangeSet {
    pub fn new(tenant_id: TenantId, processed_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            processed_at,
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = WriteOp>) {
        self.ops.extend(ops);
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Rows touched by a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub screenings_created: usize,
    pub screenings_updated: usize,
    pub screenings_deleted: usize,
    pub match_records_written: usize,
}
