//! Change detection: what moved since the last refresh.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use prep_model::{ChangeSummary, DocumentId, PatientId, ScreeningTypeDefinition, ScreeningTypeId, TenantId};
use serde::Serialize;

use crate::error::PersistenceError;
use crate::store::{DocumentSource, ImmunizationSource, ScreeningStore};

/// What the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequest {
    /// Only changes strictly after this time count. Defaults to the tenant's
    /// refresh watermark.
    pub cutoff: Option<DateTime<Utc>>,
    pub force: bool,
    /// Patients to refresh regardless of detected changes.
    pub patient_ids: Vec<PatientId>,
}

/// Why a definition counts as modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationReason {
    /// Never evaluated before.
    SignatureMissing,
    /// Matching-relevant fields differ from the recorded signature.
    SignatureChanged,
    /// Touched after the cutoff without a criteria change.
    UpdatedSinceCutoff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedScreeningType {
    pub id: ScreeningTypeId,
    pub reason: ModificationReason,
}

impl ModifiedScreeningType {
    /// Whether eligibility rules may have changed, which permits deleting
    /// screenings that became ineligible.
    pub fn criteria_changed(&self) -> bool {
        matches!(
            self.reason,
            ModificationReason::SignatureMissing | ModificationReason::SignatureChanged
        )
    }
}

/// Outcome of change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub needs_refresh: bool,
    pub forced: bool,
    /// Effective cutoff after falling back to the watermark.
    pub cutoff: Option<DateTime<Utc>>,
    pub screening_types_modified: Vec<ModifiedScreeningType>,
    pub documents_modified: Vec<DocumentId>,
    /// Owners of modified documents, conditions and immunizations, patients
    /// whose own record changed, patients left pending by the previous
    /// cycle, and requested patients.
    pub patients_modified: BTreeSet<PatientId>,
    /// Patients named in the request.
    pub requested_patients: BTreeSet<PatientId>,
}

impl ChangeReport {
    pub fn criteria_changed(&self, id: ScreeningTypeId) -> bool {
        self.screening_types_modified
            .iter()
            .any(|m| m.id == id && m.criteria_changed())
    }

    pub fn any_screening_type_modified(&self) -> bool {
        !self.screening_types_modified.is_empty()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            forced: self.forced,
            screening_types_modified: self.screening_types_modified.len(),
            documents_modified: self.documents_modified.len(),
            patients_modified: self.patients_modified.len(),
        }
    }
}

/// Reason a definition counts as modified, if it does.
pub fn modification_reason(
    definition: &ScreeningTypeDefinition,
    cutoff: Option<DateTime<Utc>>,
) -> Option<ModificationReason> {
    match definition.criteria_signature.as_deref() {
        None => Some(ModificationReason::SignatureMissing),
        Some(recorded) if recorded != definition.compute_criteria_signature() => {
            Some(ModificationReason::SignatureChanged)
        }
        Some(_) if cutoff.is_some_and(|cutoff| definition.updated_at > cutoff) => {
            Some(ModificationReason::UpdatedSinceCutoff)
        }
        Some(_) => None,
    }
}

pub struct ChangeDetector<'a> {
    store: &'a dyn ScreeningStore,
    documents: &'a dyn DocumentSource,
    immunizations: &'a dyn ImmunizationSource,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(
        store: &'a dyn ScreeningStore,
        documents: &'a dyn DocumentSource,
        immunizations: &'a dyn ImmunizationSource,
    ) -> Self {
        Self {
            store,
            documents,
            immunizations,
        }
    }

    /// Detect changes for a tenant.
    ///
    /// Reports `needs_refresh = false` with empty lists when nothing
    /// qualifies and the refresh was neither forced nor patient-targeted.
    pub fn detect(
        &self,
        tenant_id: TenantId,
        request: &ChangeRequest,
    ) -> Result<ChangeReport, PersistenceError> {
        let cutoff = match request.cutoff {
            Some(cutoff) => Some(cutoff),
            None => self.store.refresh_watermark(tenant_id)?,
        };

        let mut screening_types_modified: Vec<ModifiedScreeningType> = self
            .store
            .screening_types(tenant_id)?
            .iter()
            .filter_map(|definition| {
                modification_reason(definition, cutoff).map(|reason| ModifiedScreeningType {
                    id: definition.id,
                    reason,
                })
            })
            .collect();
        screening_types_modified.sort_by_key(|m| m.id);

        let documents = self.documents.documents_updated_since(tenant_id, cutoff)?;
        let mut documents_modified: Vec<DocumentId> = documents.iter().map(|d| d.id).collect();
        documents_modified.sort();
        documents_modified.dedup();

        let requested_patients: BTreeSet<PatientId> = request.patient_ids.iter().copied().collect();
        let mut patients_modified: BTreeSet<PatientId> =
            documents.iter().map(|d| d.patient_id).collect();
        patients_modified.extend(
            self.store
                .conditions_updated_since(tenant_id, cutoff)?
                .iter()
                .map(|c| c.patient_id),
        );
        patients_modified.extend(
            self.immunizations
                .immunizations_updated_since(tenant_id, cutoff)?
                .iter()
                .map(|i| i.patient_id),
        );
        patients_modified.extend(
            self.store
                .patients_updated_since(tenant_id, cutoff)?
                .iter()
                .map(|p| p.id),
        );
        let pending = self.store.pending_patients(tenant_id)?;
        patients_modified.extend(pending.iter().copied());
        patients_modified.extend(requested_patients.iter().copied());

        let needs_refresh = request.force
            || !screening_types_modified.is_empty()
            || !documents_modified.is_empty()
            || !patients_modified.is_empty();

        tracing::debug!(
            tenant_id = %tenant_id,
            cutoff = ?cutoff,
            screening_types = screening_types_modified.len(),
            documents = documents_modified.len(),
            patients = patients_modified.len(),
            pending = pending.len(),
            needs_refresh,
            "change detection finished"
        );

        if !needs_refresh {
            return Ok(ChangeReport {
                cutoff,
                ..ChangeReport::default()
            });
        }

        Ok(ChangeReport {
            needs_refresh,
            forced: request.force,
            cutoff,
            screening_types_modified,
            documents_modified,
            patients_modified,
            requested_patients,
        })
    }
}
