//! In-memory implementation of every collaborator trait.
//!
//! Backs the CLI (loaded from a JSON dataset file) and the tests. A commit
//! applies its change set to a copy of the dataset and swaps the copy in
//! only when every operation succeeded.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};
use prep_model::{
    Document, DocumentId, Immunization, MatchRecord, Patient, PatientCondition, PatientId,
    Screening, ScreeningId, ScreeningTypeDefinition, TenantId,
};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, PersistenceError};
use crate::store::{
    AuditEventType, AuditLogger, ChangeSet, CommitSummary, DismissalStore, DocumentSource,
    ImmunizationSource, ScreeningStore, ScreeningUpsert, WriteOp,
};

/// A document a user rejected as evidence for one screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dismissal {
    pub screening_id: ScreeningId,
    pub document_id: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshWatermark {
    pub tenant_id: TenantId,
    pub refreshed_at: DateTime<Utc>,
    /// Patients skipped by the refresh that set this watermark.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pending_patients: BTreeSet<PatientId>,
}

/// Everything the engine reads and writes, for any number of tenants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub patients: Vec<Patient>,
    pub conditions: Vec<PatientCondition>,
    pub screening_types: Vec<ScreeningTypeDefinition>,
    pub screenings: Vec<Screening>,
    pub match_records: Vec<MatchRecord>,
    pub documents: Vec<Document>,
    pub immunizations: Vec<Immunization>,
    pub dismissals: Vec<Dismissal>,
    pub watermarks: Vec<RefreshWatermark>,
}

impl Dataset {
    fn next_screening_id(&self) -> ScreeningId {
        let max = self.screenings.iter().map(|s| s.id.get()).max().unwrap_or(0);
        ScreeningId::new(max + 1)
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<CommitSummary, PersistenceError> {
        let mut summary = CommitSummary::default();
        for op in changes.ops() {
            match op {
                WriteOp::UpsertScreening(upsert) => {
                    self.upsert_screening(changes, upsert, &mut summary)?;
                }
                WriteOp::DeleteScreening { screening_id, .. } => {
                    let before = self.screenings.len();
                    self.screenings.retain(|s| {
                        !(s.id == *screening_id && s.tenant_id == changes.tenant_id)
                    });
                    if self.screenings.len() == before {
                        return Err(PersistenceError::MissingScreening {
                            screening_id: *screening_id,
                        });
                    }
                    self.match_records.retain(|r| r.screening_id != *screening_id);
                    summary.screenings_deleted += 1;
                }
                WriteOp::RecordCriteriaSignature {
                    screening_type_id,
                    signature,
                } => {
                    if let Some(definition) = self
                        .screening_types
                        .iter_mut()
                        .find(|d| d.id == *screening_type_id && d.tenant_id == changes.tenant_id)
                    {
                        definition.criteria_signature = Some(signature.clone());
                    }
                }
                WriteOp::SetRefreshWatermark {
                    at,
                    pending_patients,
                } => {
                    match self
                        .watermarks
                        .iter_mut()
                        .find(|w| w.tenant_id == changes.tenant_id)
                    {
                        Some(watermark) => {
                            watermark.refreshed_at = *at;
                            watermark.pending_patients = pending_patients.clone();
                        }
                        None => self.watermarks.push(RefreshWatermark {
                            tenant_id: changes.tenant_id,
                            refreshed_at: *at,
                            pending_patients: pending_patients.clone(),
                        }),
                    }
                }
            }
        }
        Ok(summary)
    }

    fn upsert_screening(
        &mut self,
        changes: &ChangeSet,
        upsert: &ScreeningUpsert,
        summary: &mut CommitSummary,
    ) -> Result<(), PersistenceError> {
        let tenant_id = changes.tenant_id;
        let owner = self
            .patients
            .iter()
            .find(|p| p.id == upsert.key.patient_id)
            .map(|p| p.tenant_id);
        if let Some(found) = owner
            && found != tenant_id
        {
            return Err(PersistenceError::TenantMismatch {
                expected: tenant_id,
                found,
            });
        }

        let existing = match upsert.screening_id {
            Some(id) => Some(
                self.screenings
                    .iter()
                    .position(|s| s.id == id && s.tenant_id == tenant_id)
                    .ok_or(PersistenceError::MissingScreening { screening_id: id })?,
            ),
            None => self
                .screenings
                .iter()
                .position(|s| s.tenant_id == tenant_id && s.key() == upsert.key),
        };

        let screening_id = match existing {
            Some(idx) => {
                let screening = &mut self.screenings[idx];
                write_fields(screening, upsert, changes.processed_at);
                summary.screenings_updated += 1;
                screening.id
            }
            None => {
                let id = self.next_screening_id();
                let mut screening = Screening {
                    id,
                    tenant_id,
                    patient_id: upsert.key.patient_id,
                    screening_type_id: upsert.key.screening_type_id,
                    status: upsert.status,
                    last_completed_date: None,
                    matched_documents: Default::default(),
                    matched_immunizations: Default::default(),
                    last_processed: None,
                    is_dormant: false,
                    created_at: changes.processed_at,
                };
                write_fields(&mut screening, upsert, changes.processed_at);
                self.screenings.push(screening);
                summary.screenings_created += 1;
                id
            }
        };

        self.match_records.retain(|r| r.screening_id != screening_id);
        for found in &upsert.document_matches {
            self.match_records.push(MatchRecord {
                screening_id,
                document_id: found.document_id,
                confidence: found.confidence,
                matched_keywords: found.matched_keywords.clone(),
            });
            summary.match_records_written += 1;
        }
        Ok(())
    }
}

fn write_fields(screening: &mut Screening, upsert: &ScreeningUpsert, processed_at: DateTime<Utc>) {
    screening.status = upsert.status;
    screening.last_completed_date = upsert.last_completed_date;
    screening.matched_documents = upsert
        .document_matches
        .iter()
        .map(|m| m.document_id)
        .collect();
    screening.matched_immunizations = upsert.matched_immunizations.clone();
    screening.is_dormant = upsert.is_dormant;
    screening.last_processed = Some(processed_at);
}

/// Thread-safe store over a [`Dataset`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<Dataset>,
    audit_log: RwLock<Vec<(AuditEventType, serde_json::Value)>>,
}

impl InMemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            data: RwLock::new(dataset),
            audit_log: RwLock::default(),
        }
    }

    /// Copy of the current dataset.
    pub fn snapshot(&self) -> Result<Dataset, PersistenceError> {
        Ok(self.read()?.clone())
    }

    pub fn into_dataset(self) -> Result<Dataset, PersistenceError> {
        self.data
            .into_inner()
            .map_err(|_| PersistenceError::unavailable("dataset lock poisoned"))
    }

    /// Audit events received so far, oldest first.
    pub fn audit_events(&self) -> Vec<(AuditEventType, serde_json::Value)> {
        self.audit_log
            .read()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Dataset>, PersistenceError> {
        self.data
            .read()
            .map_err(|_| PersistenceError::unavailable("dataset lock poisoned"))
    }

    fn with_patient<T>(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
        select: impl Fn(&Dataset) -> Vec<T>,
    ) -> Result<Vec<T>, PersistenceError> {
        let data = self.read()?;
        if !data
            .patients
            .iter()
            .any(|p| p.id == patient_id && p.tenant_id == tenant_id)
        {
            return Ok(Vec::new());
        }
        Ok(select(&data))
    }
}

fn after(updated_at: DateTime<Utc>, since: Option<DateTime<Utc>>) -> bool {
    since.is_none_or(|since| updated_at > since)
}

impl ScreeningStore for InMemoryStore {
    fn patients(&self, tenant_id: TenantId) -> Result<Vec<Patient>, PersistenceError> {
        let data = self.read()?;
        let mut patients: Vec<Patient> = data
            .patients
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        patients.sort_by_key(|p| p.id);
        Ok(patients)
    }

    fn patient(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Option<Patient>, PersistenceError> {
        Ok(self
            .read()?
            .patients
            .iter()
            .find(|p| p.id == patient_id && p.tenant_id == tenant_id)
            .cloned())
    }

    fn patients_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Patient>, PersistenceError> {
        Ok(self
            .read()?
            .patients
            .iter()
            .filter(|p| p.tenant_id == tenant_id && after(p.updated_at, since))
            .cloned()
            .collect())
    }

    fn conditions(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<PatientCondition>, PersistenceError> {
        self.with_patient(tenant_id, patient_id, |data| {
            data.conditions
                .iter()
                .filter(|c| c.patient_id == patient_id && c.tenant_id == tenant_id)
                .cloned()
                .collect()
        })
    }

    fn conditions_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PatientCondition>, PersistenceError> {
        Ok(self
            .read()?
            .conditions
            .iter()
            .filter(|c| c.tenant_id == tenant_id && after(c.updated_at, since))
            .cloned()
            .collect())
    }

    fn screening_types(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<ScreeningTypeDefinition>, PersistenceError> {
        let data = self.read()?;
        let mut definitions: Vec<ScreeningTypeDefinition> = data
            .screening_types
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect();
        definitions.sort_by_key(|d| d.id);
        Ok(definitions)
    }

    fn screenings(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<Screening>, PersistenceError> {
        let data = self.read()?;
        let mut screenings: Vec<Screening> = data
            .screenings
            .iter()
            .filter(|s| s.patient_id == patient_id && s.tenant_id == tenant_id)
            .cloned()
            .collect();
        screenings.sort_by_key(|s| s.id);
        Ok(screenings)
    }

    fn refresh_watermark(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        Ok(self
            .read()?
            .watermarks
            .iter()
            .find(|w| w.tenant_id == tenant_id)
            .map(|w| w.refreshed_at))
    }

    fn pending_patients(
        &self,
        tenant_id: TenantId,
    ) -> Result<BTreeSet<PatientId>, PersistenceError> {
        Ok(self
            .read()?
            .watermarks
            .iter()
            .find(|w| w.tenant_id == tenant_id)
            .map(|w| w.pending_patients.clone())
            .unwrap_or_default())
    }

    fn commit(&self, changes: &ChangeSet) -> Result<CommitSummary, PersistenceError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| PersistenceError::unavailable("dataset lock poisoned"))?;
        let mut staged = data.clone();
        let summary = staged.apply(changes)?;
        *data = staged;
        tracing::debug!(
            tenant_id = %changes.tenant_id,
            ops = changes.ops().len(),
            created = summary.screenings_created,
            updated = summary.screenings_updated,
            deleted = summary.screenings_deleted,
            "change set committed"
        );
        Ok(summary)
    }
}

impl DocumentSource for InMemoryStore {
    fn documents(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<Document>, PersistenceError> {
        self.with_patient(tenant_id, patient_id, |data| {
            data.documents
                .iter()
                .filter(|d| d.patient_id == patient_id && d.tenant_id == tenant_id)
                .cloned()
                .collect()
        })
    }

    fn documents_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Document>, PersistenceError> {
        Ok(self
            .read()?
            .documents
            .iter()
            .filter(|d| d.tenant_id == tenant_id && after(d.updated_at, since))
            .cloned()
            .collect())
    }
}

impl ImmunizationSource for InMemoryStore {
    fn immunizations(
        &self,
        tenant_id: TenantId,
        patient_id: PatientId,
    ) -> Result<Vec<Immunization>, PersistenceError> {
        self.with_patient(tenant_id, patient_id, |data| {
            data.immunizations
                .iter()
                .filter(|i| i.patient_id == patient_id && i.tenant_id == tenant_id)
                .cloned()
                .collect()
        })
    }

    fn immunizations_updated_since(
        &self,
        tenant_id: TenantId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Immunization>, PersistenceError> {
        Ok(self
            .read()?
            .immunizations
            .iter()
            .filter(|i| i.tenant_id == tenant_id && after(i.updated_at, since))
            .cloned()
            .collect())
    }
}

impl DismissalStore for InMemoryStore {
    fn is_dismissed(
        &self,
        screening_id: ScreeningId,
        document_id: DocumentId,
    ) -> Result<bool, PersistenceError> {
        Ok(self.read()?.dismissals.contains(&Dismissal {
            screening_id,
            document_id,
        }))
    }
}

impl AuditLogger for InMemoryStore {
    fn log_event(
        &self,
        event_type: AuditEventType,
        details: &serde_json::Value,
    ) -> Result<(), AuditError> {
        let mut log = self.audit_log.write().map_err(|_| AuditError {
            message: "audit log lock poisoned".to_string(),
        })?;
        log.push((event_type, details.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use prep_model::{ScreeningKey, ScreeningStatus, ScreeningTypeId};

    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    fn dataset() -> Dataset {
        Dataset {
            patients: vec![Patient {
                id: PatientId::new(1),
                tenant_id: TenantId::new(1),
                mrn: None,
                date_of_birth: None,
                gender: None,
                next_appointment: None,
                updated_at: at("2024-01-01T00:00:00Z"),
            }],
            ..Dataset::default()
        }
    }

    fn upsert(screening_id: Option<ScreeningId>) -> WriteOp {
        WriteOp::UpsertScreening(ScreeningUpsert {
            key: ScreeningKey {
                patient_id: PatientId::new(1),
                screening_type_id: ScreeningTypeId::new(7),
            },
            screening_id,
            status: ScreeningStatus::Due,
            last_completed_date: None,
            matched_immunizations: Default::default(),
            document_matches: Vec::new(),
            is_dormant: false,
        })
    }

    #[test]
    fn commit_creates_then_updates() {
        let store = InMemoryStore::new(dataset());
        let mut changes = ChangeSet::new(TenantId::new(1), at("2024-02-01T00:00:00Z"));
        changes.push(upsert(None));
        let summary = store.commit(&changes).unwrap();
        assert_eq!(summary.screenings_created, 1);

        let mut again = ChangeSet::new(TenantId::new(1), at("2024-03-01T00:00:00Z"));
        again.push(upsert(Some(ScreeningId::new(1))));
        let summary = store.commit(&again).unwrap();
        assert_eq!(summary.screenings_updated, 1);

        let screenings = store.screenings(TenantId::new(1), PatientId::new(1)).unwrap();
        assert_eq!(screenings.len(), 1);
        assert_eq!(screenings[0].created_at, at("2024-02-01T00:00:00Z"));
        assert_eq!(screenings[0].last_processed, Some(at("2024-03-01T00:00:00Z")));
    }

    #[test]
    fn failed_commit_leaves_data_untouched() {
        let store = InMemoryStore::new(dataset());
        let mut changes = ChangeSet::new(TenantId::new(1), at("2024-02-01T00:00:00Z"));
        changes.push(upsert(None));
        changes.push(WriteOp::SetRefreshWatermark {
            at: at("2024-02-01T00:00:00Z"),
            pending_patients: BTreeSet::from([PatientId::new(1)]),
        });
        changes.push(WriteOp::DeleteScreening {
            screening_id: ScreeningId::new(99),
            key: ScreeningKey {
                patient_id: PatientId::new(1),
                screening_type_id: ScreeningTypeId::new(1),
            },
        });
        assert_eq!(
            store.commit(&changes),
            Err(PersistenceError::MissingScreening {
                screening_id: ScreeningId::new(99)
            })
        );
        assert_eq!(store.snapshot().unwrap(), dataset());
        assert_eq!(store.refresh_watermark(TenantId::new(1)).unwrap(), None);
        assert!(store.pending_patients(TenantId::new(1)).unwrap().is_empty());
    }

    #[test]
    fn watermark_replaces_pending_patients() {
        let store = InMemoryStore::new(dataset());
        let tenant = TenantId::new(1);
        let mut first = ChangeSet::new(tenant, at("2024-02-01T00:00:00Z"));
        first.push(WriteOp::SetRefreshWatermark {
            at: at("2024-02-01T00:00:00Z"),
            pending_patients: BTreeSet::from([PatientId::new(1)]),
        });
        store.commit(&first).unwrap();
        assert_eq!(
            store.pending_patients(tenant).unwrap(),
            BTreeSet::from([PatientId::new(1)])
        );

        let mut second = ChangeSet::new(tenant, at("2024-03-01T00:00:00Z"));
        second.push(WriteOp::SetRefreshWatermark {
            at: at("2024-03-01T00:00:00Z"),
            pending_patients: BTreeSet::new(),
        });
        store.commit(&second).unwrap();
        assert!(store.pending_patients(tenant).unwrap().is_empty());
        assert_eq!(
            store.refresh_watermark(tenant).unwrap(),
            Some(at("2024-03-01T00:00:00Z"))
        );
        assert!(store.pending_patients(TenantId::new(2)).unwrap().is_empty());
    }

    #[test]
    fn other_tenants_rows_are_invisible() {
        let store = InMemoryStore::new(dataset());
        assert!(store.patients(TenantId::new(2)).unwrap().is_empty());
        assert!(store.patient(TenantId::new(2), PatientId::new(1)).unwrap().is_none());
        assert!(store.documents(TenantId::new(2), PatientId::new(1)).unwrap().is_empty());
    }

    #[test]
    fn cross_tenant_upsert_is_rejected() {
        let store = InMemoryStore::new(dataset());
        let mut changes = ChangeSet::new(TenantId::new(2), at("2024-02-01T00:00:00Z"));
        changes.push(upsert(None));
        assert!(matches!(
            store.commit(&changes),
            Err(PersistenceError::TenantMismatch { .. })
        ));
    }
}
