//! The refresh cycle.
//!
//! One cycle, for one tenant:
//!
//! 1. detect changes; exit early with no writes when nothing changed
//! 2. pick the affected patients
//! 3. per patient and variant family, select the most specific eligible
//!    member, recompute its evidence and status, and remove screenings of
//!    outranked or no-longer-applicable members (complete ones are kept)
//! 4. record criteria signatures and the refresh watermark
//! 5. commit everything as one change set
//!
//! A failing patient is recorded and skipped. It is stored as pending with
//! the watermark so the next cycle picks it up again, and criteria
//! signatures are held back until every patient evaluated cleanly. A
//! failing commit fails the whole cycle and nothing is persisted.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{DateTime, Days, NaiveDate, Utc};
use prep_match::{DocumentMatcher, FuzzyMatcher};
use prep_model::{
    IssueKind, Patient, PatientId, RefreshIssue, RefreshResult, Screening, ScreeningCriteria,
    ScreeningKey, ScreeningTypeDefinition, ScreeningTypeId, TenantId,
};
use serde_json::json;
use tracing::{debug, debug_span, error, info, info_span, warn};

use crate::change::{ChangeDetector, ChangeReport, ChangeRequest};
use crate::config::EngineConfig;
use crate::eligibility::{EligibilityEvaluator, PatientRecord};
use crate::error::{EvaluationError, PersistenceError, RefreshError};
use crate::evidence::EvidenceFinder;
use crate::lock::TenantLocks;
use crate::status::StatusCalculator;
use crate::store::{
    AuditEventType, AuditLogger, ChangeSet, DismissalStore, DocumentSource, ImmunizationSource,
    ScreeningStore, ScreeningUpsert, WriteOp,
};
use crate::variant::{VariantSelector, group_families};

/// The collaborators a cycle reads from and writes to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub store: &'a dyn ScreeningStore,
    pub documents: &'a dyn DocumentSource,
    pub immunizations: &'a dyn ImmunizationSource,
    pub dismissals: &'a dyn DismissalStore,
    pub audit: &'a dyn AuditLogger,
}

impl<'a> Collaborators<'a> {
    /// Use one object for every role.
    pub fn from_store<S>(store: &'a S) -> Self
    where
        S: ScreeningStore + DocumentSource + ImmunizationSource + DismissalStore + AuditLogger,
    {
        Self {
            store,
            documents: store,
            immunizations: store,
            dismissals: store,
            audit: store,
        }
    }
}

/// Parameters of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub tenant_id: TenantId,
    /// Only changes after this count; defaults to the last refresh.
    pub cutoff: Option<DateTime<Utc>>,
    pub force: bool,
    /// Patients to refresh even without detected changes.
    pub patient_ids: Vec<PatientId>,
    /// Stamped as `last_processed` and stored as the new watermark.
    pub now: DateTime<Utc>,
    /// Evaluation date for ages and statuses.
    pub today: NaiveDate,
}

impl RefreshRequest {
    pub fn new(tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            cutoff: None,
            force: false,
            patient_ids: Vec::new(),
            now,
            today: now.date_naive(),
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_patients(mut self, patient_ids: impl IntoIterator<Item = PatientId>) -> Self {
        self.patient_ids.extend(patient_ids);
        self
    }

    pub fn with_cutoff(mut self, cutoff: Option<DateTime<Utc>>) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn change_request(&self) -> ChangeRequest {
        ChangeRequest {
            cutoff: self.cutoff,
            force: self.force,
            patient_ids: self.patient_ids.clone(),
        }
    }
}

/// A definition with its validated criteria, if valid.
struct EvaluatedDefinition<'d> {
    definition: &'d ScreeningTypeDefinition,
    criteria: Option<ScreeningCriteria>,
    criteria_changed: bool,
}

/// Everything shared by all patients of one cycle.
struct Cycle<'d, 'a> {
    tenant_id: TenantId,
    today: NaiveDate,
    /// Active definitions grouped into families, in family-key order.
    families: Vec<Vec<EvaluatedDefinition<'d>>>,
    /// Inactive definitions whose criteria changed this cycle.
    retired: Vec<&'d ScreeningTypeDefinition>,
    evaluator: EligibilityEvaluator,
    selector: VariantSelector,
    status: StatusCalculator,
    finder: EvidenceFinder<'a>,
}

/// Buffered output of one patient.
#[derive(Default)]
struct PatientOutcome {
    ops: Vec<WriteOp>,
    audit: Vec<(AuditEventType, serde_json::Value)>,
}

impl PatientOutcome {
    fn delete(&mut self, screening: &Screening, event: AuditEventType, details: serde_json::Value) {
        self.ops.push(WriteOp::DeleteScreening {
            screening_id: screening.id,
            key: screening.key(),
        });
        self.audit.push((event, details));
    }
}

pub struct RefreshOrchestrator<'a> {
    collaborators: Collaborators<'a>,
    config: EngineConfig,
    locks: &'a TenantLocks,
}

impl<'a> RefreshOrchestrator<'a> {
    pub fn new(collaborators: Collaborators<'a>, config: EngineConfig, locks: &'a TenantLocks) -> Self {
        Self {
            collaborators,
            config,
            locks,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one refresh cycle for `request.tenant_id`.
    ///
    /// Holds the tenant's lock for the whole cycle.
    pub fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResult, RefreshError> {
        let tenant_id = request.tenant_id;
        let span = info_span!("refresh", tenant_id = %tenant_id);
        let _entered = span.enter();
        let started = Instant::now();

        let handle = self.locks.handle(tenant_id)?;
        let _guard = handle
            .lock()
            .map_err(|_| RefreshError::LockPoisoned { tenant_id })?;

        let detector = ChangeDetector::new(
            self.collaborators.store,
            self.collaborators.documents,
            self.collaborators.immunizations,
        );
        let report = detector
            .detect(tenant_id, &request.change_request())
            .map_err(|err| self.fail(tenant_id, err))?;
        if !report.needs_refresh {
            info!("no changes since last refresh");
            return Ok(RefreshResult {
                success: true,
                skipped: true,
                ..RefreshResult::default()
            });
        }

        self.audit(
            AuditEventType::RefreshStarted,
            &json!({
                "tenant_id": tenant_id,
                "forced": report.forced,
                "screening_types_modified": report.screening_types_modified.len(),
                "documents_modified": report.documents_modified.len(),
                "patients_modified": report.patients_modified.len(),
            }),
        );

        let mut result = RefreshResult {
            changes: report.summary(),
            ..RefreshResult::default()
        };
        let mut audit_buffer = Vec::new();

        let definitions = self
            .collaborators
            .store
            .screening_types(tenant_id)
            .map_err(|err| self.fail(tenant_id, err))?;
        let cycle = self.prepare(request, &definitions, &report, &mut result, &mut audit_buffer);

        let patients = self
            .affected_patients(tenant_id, &report, &mut result)
            .map_err(|err| self.fail(tenant_id, err))?;

        let mut changes = ChangeSet::new(tenant_id, request.now);
        let mut pending_patients = BTreeSet::new();
        for patient in patients {
            let patient_id = patient.id;
            let span = debug_span!("patient", patient_id = %patient_id);
            let _entered = span.enter();
            match self.process_patient(&cycle, patient) {
                Ok(outcome) => {
                    changes.extend(outcome.ops);
                    audit_buffer.extend(outcome.audit);
                    result.patients_processed += 1;
                }
                Err(err) => {
                    warn!(patient_id = %patient_id, error = %err, "patient skipped");
                    pending_patients.insert(patient_id);
                    result.errors.push(RefreshIssue {
                        kind: IssueKind::Evaluation,
                        patient_id: Some(patient_id),
                        screening_type_id: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        if pending_patients.is_empty() {
            for definition in &definitions {
                if report.criteria_changed(definition.id) {
                    changes.push(WriteOp::RecordCriteriaSignature {
                        screening_type_id: definition.id,
                        signature: definition.compute_criteria_signature(),
                    });
                }
            }
        } else {
            warn!(
                pending = pending_patients.len(),
                "criteria signatures held back until skipped patients are evaluated"
            );
        }
        changes.push(WriteOp::SetRefreshWatermark {
            at: request.now,
            pending_patients,
        });

        let summary = self
            .collaborators
            .store
            .commit(&changes)
            .map_err(|err| self.fail(tenant_id, err))?;

        for (event, details) in &audit_buffer {
            self.audit(*event, details);
        }

        result.success = true;
        result.screenings_created = summary.screenings_created;
        result.screenings_updated = summary.screenings_updated;
        result.screenings_deleted = summary.screenings_deleted;

        let duration_ms = started.elapsed().as_millis() as u64;
        self.audit(
            AuditEventType::RefreshCompleted,
            &json!({
                "tenant_id": tenant_id,
                "patients_processed": result.patients_processed,
                "screenings_created": result.screenings_created,
                "screenings_updated": result.screenings_updated,
                "screenings_deleted": result.screenings_deleted,
                "errors": result.errors.len(),
                "duration_ms": duration_ms,
            }),
        );
        info!(
            patients = result.patients_processed,
            created = result.screenings_created,
            updated = result.screenings_updated,
            deleted = result.screenings_deleted,
            errors = result.errors.len(),
            duration_ms,
            "refresh committed"
        );
        Ok(result)
    }

    /// Validate definitions and group the active ones into families.
    fn prepare<'d>(
        &self,
        request: &RefreshRequest,
        definitions: &'d [ScreeningTypeDefinition],
        report: &ChangeReport,
        result: &mut RefreshResult,
        audit_buffer: &mut Vec<(AuditEventType, serde_json::Value)>,
    ) -> Cycle<'d, 'a> {
        let mut retired = Vec::new();
        let mut evaluated: BTreeMap<ScreeningTypeId, EvaluatedDefinition<'d>> = BTreeMap::new();
        for definition in definitions {
            let criteria_changed = report.criteria_changed(definition.id);
            if !definition.is_active {
                if criteria_changed {
                    retired.push(definition);
                }
                continue;
            }
            let criteria = match definition.criteria() {
                Ok(criteria) => Some(criteria),
                Err(err) => {
                    warn!(
                        screening_type_id = %definition.id,
                        error = %err,
                        "definition treated as never eligible"
                    );
                    result.errors.push(RefreshIssue {
                        kind: IssueKind::Configuration,
                        patient_id: None,
                        screening_type_id: Some(definition.id),
                        message: err.to_string(),
                    });
                    audit_buffer.push((
                        AuditEventType::ConfigurationError,
                        json!({
                            "tenant_id": request.tenant_id,
                            "screening_type_id": definition.id,
                            "error": err.to_string(),
                        }),
                    ));
                    None
                }
            };
            evaluated.insert(
                definition.id,
                EvaluatedDefinition {
                    definition,
                    criteria,
                    criteria_changed,
                },
            );
        }

        let families: Vec<Vec<EvaluatedDefinition<'d>>> =
            group_families(evaluated.values().map(|e| e.definition))
                .into_iter()
                .map(|family| {
                    family
                        .members
                        .iter()
                        .filter_map(|member| evaluated.remove(&member.id))
                        .collect::<Vec<_>>()
                })
                .collect();

        let evaluator = EligibilityEvaluator::new(request.today);
        Cycle {
            tenant_id: request.tenant_id,
            today: request.today,
            families,
            retired,
            evaluator,
            selector: VariantSelector::new(evaluator),
            status: StatusCalculator::new(request.today, self.config.due_soon_window_months),
            finder: EvidenceFinder::new(
                DocumentMatcher::new(
                    FuzzyMatcher::new(self.config.fuzzy),
                    self.config.match_threshold,
                ),
                self.collaborators.dismissals,
            ),
        }
    }

    /// Patients to process, in id order.
    ///
    /// Everyone when a definition changed, or when forced without a patient
    /// list; otherwise the patients named by the change report, looked up
    /// one by one. Requested patients that do not exist are reported as
    /// errors.
    fn affected_patients(
        &self,
        tenant_id: TenantId,
        report: &ChangeReport,
        result: &mut RefreshResult,
    ) -> Result<Vec<Patient>, PersistenceError> {
        let store = self.collaborators.store;
        let everyone = report.any_screening_type_modified()
            || (report.forced && report.requested_patients.is_empty());

        let mut patients = if everyone {
            store.patients(tenant_id)?
        } else {
            let mut found = Vec::with_capacity(report.patients_modified.len());
            for &patient_id in &report.patients_modified {
                match store.patient(tenant_id, patient_id)? {
                    Some(patient) => found.push(patient),
                    None if report.requested_patients.contains(&patient_id) => {}
                    None => debug!(patient_id = %patient_id, "changed patient no longer exists"),
                }
            }
            found
        };
        patients.sort_by_key(|p| p.id);

        for requested in &report.requested_patients {
            if patients.binary_search_by_key(requested, |p| p.id).is_err() {
                let err = EvaluationError::UnknownPatient {
                    tenant_id,
                    patient_id: *requested,
                };
                warn!(patient_id = %requested, "requested patient not found");
                result.errors.push(RefreshIssue {
                    kind: IssueKind::Evaluation,
                    patient_id: Some(*requested),
                    screening_type_id: None,
                    message: err.to_string(),
                });
            }
        }
        Ok(patients)
    }

    fn process_patient(
        &self,
        cycle: &Cycle<'_, '_>,
        patient: Patient,
    ) -> Result<PatientOutcome, EvaluationError> {
        let store = self.collaborators.store;
        let tenant_id = cycle.tenant_id;
        let conditions = store.conditions(tenant_id, patient.id)?;
        let existing: BTreeMap<ScreeningTypeId, Screening> = store
            .screenings(tenant_id, patient.id)?
            .into_iter()
            .map(|s| (s.screening_type_id, s))
            .collect();
        let documents = self.collaborators.documents.documents(tenant_id, patient.id)?;
        let immunizations = self
            .collaborators
            .immunizations
            .immunizations(tenant_id, patient.id)?;
        let record = PatientRecord::new(patient, conditions);
        let is_dormant = self.is_dormant(&record.patient, cycle.today);

        let mut outcome = PatientOutcome::default();
        for family in &cycle.families {
            let members: Vec<&ScreeningTypeDefinition> =
                family.iter().map(|member| member.definition).collect();
            let selected = cycle.selector.select(&record, &members);

            for member in family {
                let definition = member.definition;
                let current = existing.get(&definition.id);

                if let (Some(chosen), Some(criteria)) = (selected, member.criteria.as_ref())
                    && chosen.id == definition.id
                {
                    let evidence = cycle.finder.find_matches(
                        current.map(|s| s.id),
                        criteria,
                        &documents,
                        &immunizations,
                    )?;
                    let last_completed_date = evidence.last_completed_date();
                    let status = cycle.status.calculate_status(criteria, last_completed_date);
                    debug!(
                        screening_type_id = %definition.id,
                        status = %status,
                        documents = evidence.documents.len(),
                        immunizations = evidence.immunizations.len(),
                        "screening evaluated"
                    );
                    if current.is_none() {
                        outcome.audit.push((
                            AuditEventType::ScreeningCreated,
                            json!({
                                "tenant_id": tenant_id,
                                "patient_id": record.patient.id,
                                "screening_type_id": definition.id,
                                "status": status,
                            }),
                        ));
                    }
                    outcome.ops.push(WriteOp::UpsertScreening(ScreeningUpsert {
                        key: ScreeningKey {
                            patient_id: record.patient.id,
                            screening_type_id: definition.id,
                        },
                        screening_id: current.map(|s| s.id),
                        status,
                        last_completed_date,
                        matched_immunizations: evidence.immunization_ids(),
                        document_matches: evidence.documents,
                        is_dormant,
                    }));
                    continue;
                }

                let Some(screening) = current else {
                    continue;
                };
                if screening.status.is_preserved() {
                    continue;
                }
                if let Some(chosen) = selected {
                    outcome.delete(
                        screening,
                        AuditEventType::ScreeningArchived,
                        json!({
                            "tenant_id": tenant_id,
                            "patient_id": record.patient.id,
                            "screening_id": screening.id,
                            "screening_type_id": definition.id,
                            "superseded_by": chosen.id,
                        }),
                    );
                } else if member.criteria_changed {
                    outcome.delete(
                        screening,
                        AuditEventType::ScreeningDeleted,
                        json!({
                            "tenant_id": tenant_id,
                            "patient_id": record.patient.id,
                            "screening_id": screening.id,
                            "screening_type_id": definition.id,
                            "reason": "no longer eligible after criteria change",
                        }),
                    );
                }
            }
        }

        for definition in &cycle.retired {
            if let Some(screening) = existing.get(&definition.id)
                && !screening.status.is_preserved()
            {
                outcome.delete(
                    screening,
                    AuditEventType::ScreeningDeleted,
                    json!({
                        "tenant_id": tenant_id,
                        "patient_id": record.patient.id,
                        "screening_id": screening.id,
                        "screening_type_id": definition.id,
                        "reason": "definition deactivated",
                    }),
                );
            }
        }

        Ok(outcome)
    }

    fn is_dormant(&self, patient: &Patient, today: NaiveDate) -> bool {
        let Some(window) = self.config.dormancy_window_days else {
            return false;
        };
        let horizon = today
            .checked_add_days(Days::new(u64::from(window)))
            .unwrap_or(NaiveDate::MAX);
        !patient
            .next_appointment
            .is_some_and(|appointment| appointment >= today && appointment <= horizon)
    }

    fn fail(&self, tenant_id: TenantId, err: PersistenceError) -> RefreshError {
        error!(error = %err, "refresh failed, nothing persisted");
        self.audit(
            AuditEventType::RefreshFailed,
            &json!({ "tenant_id": tenant_id, "error": err.to_string() }),
        );
        RefreshError::persistence(tenant_id, err)
    }

    fn audit(&self, event: AuditEventType, details: &serde_json::Value) {
        if let Err(err) = self.collaborators.audit.log_event(event, details) {
            warn!(event = event.as_str(), error = %err, "audit event dropped");
        }
    }
}
