//! Command implementations, independent of argument parsing and printing.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, info_span};

use prep_core::{
    Collaborators, Dataset, EligibilityEvaluator, EligibilityExplanation, EngineConfig,
    InMemoryStore, PatientRecord, RefreshOrchestrator, RefreshRequest, TenantLocks,
    TracingAuditLogger, group_families, specificity_score,
};
use prep_match::{FuzzyConfig, FuzzyMatcher, KeywordMatch};
use prep_model::{PatientId, RefreshResult, ScreeningTypeId, TenantId};

use crate::dataset::{load_dataset, save_dataset};
use crate::logging::redact_value;

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub dataset: PathBuf,
    pub tenant_id: TenantId,
    pub force: bool,
    pub patient_ids: Vec<PatientId>,
    pub cutoff: Option<DateTime<Utc>>,
    /// Evaluation date; defaults to the date of `now`.
    pub today: Option<NaiveDate>,
    pub now: DateTime<Utc>,
    pub config: EngineConfig,
    /// Run the cycle but leave the dataset file untouched.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub result: RefreshResult,
    /// Whether the dataset file was rewritten.
    pub saved: bool,
}

/// Load the dataset, run one refresh cycle and write the result back.
pub fn refresh_dataset(options: &RefreshOptions) -> Result<RefreshOutcome> {
    let span = info_span!("refresh_dataset", path = %options.dataset.display());
    let _entered = span.enter();
    let start = Instant::now();

    let dataset = load_dataset(&options.dataset)?;
    let store = InMemoryStore::new(dataset);
    let locks = TenantLocks::new();
    let collaborators = Collaborators {
        audit: &TracingAuditLogger,
        ..Collaborators::from_store(&store)
    };

    let mut request = RefreshRequest::new(options.tenant_id, options.now)
        .with_force(options.force)
        .with_patients(options.patient_ids.iter().copied())
        .with_cutoff(options.cutoff);
    if let Some(today) = options.today {
        request = request.with_today(today);
    }

    let result = RefreshOrchestrator::new(collaborators, options.config.clone(), &locks)
        .refresh(&request)
        .with_context(|| format!("refresh tenant {}", options.tenant_id))?;

    let saved = !options.dry_run && !result.skipped;
    if saved {
        let dataset = store
            .into_dataset()
            .context("collect refreshed dataset")?;
        save_dataset(&dataset, &options.dataset)?;
    }
    info!(
        saved,
        dry_run = options.dry_run,
        duration_ms = start.elapsed().as_millis(),
        "refresh finished"
    );
    Ok(RefreshOutcome { result, saved })
}

/// Keyword matches in `text` at or above `threshold`, best first.
pub fn score_text(
    text: &str,
    keywords: &[String],
    threshold: f32,
    fuzzy: FuzzyConfig,
) -> Vec<KeywordMatch> {
    debug!(
        text = redact_value(text),
        keywords = keywords.len(),
        threshold,
        "scoring text"
    );
    FuzzyMatcher::new(fuzzy).match_keywords(text, keywords, threshold)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainReport {
    pub patient_id: PatientId,
    pub screening_type_id: ScreeningTypeId,
    pub screening_type: String,
    pub as_of: NaiveDate,
    pub explanation: EligibilityExplanation,
}

/// Rule-by-rule eligibility of one patient for one definition.
pub fn explain_eligibility(
    dataset: &Dataset,
    patient_id: PatientId,
    screening_type_id: ScreeningTypeId,
    as_of: NaiveDate,
) -> Result<ExplainReport> {
    let Some(patient) = dataset.patients.iter().find(|p| p.id == patient_id) else {
        bail!("patient {patient_id} not found");
    };
    let Some(definition) = dataset
        .screening_types
        .iter()
        .find(|d| d.id == screening_type_id && d.tenant_id == patient.tenant_id)
    else {
        bail!(
            "screening type {screening_type_id} not found in tenant {}",
            patient.tenant_id
        );
    };
    let conditions = dataset
        .conditions
        .iter()
        .filter(|c| c.patient_id == patient_id && c.tenant_id == patient.tenant_id)
        .cloned()
        .collect();
    let record = PatientRecord::new(patient.clone(), conditions);
    Ok(ExplainReport {
        patient_id,
        screening_type_id,
        screening_type: definition.name.clone(),
        as_of,
        explanation: EligibilityEvaluator::new(as_of).explain(&record, definition),
    })
}

/// One definition within its variant family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyRow {
    pub family: String,
    pub family_size: usize,
    pub screening_type_id: ScreeningTypeId,
    pub name: String,
    pub active: bool,
    /// `None` when the definition fails validation.
    pub specificity: Option<u32>,
}

/// Every definition of the tenant, grouped by family key.
pub fn list_families(dataset: &Dataset, tenant_id: TenantId) -> Vec<FamilyRow> {
    let definitions = dataset
        .screening_types
        .iter()
        .filter(|d| d.tenant_id == tenant_id);
    group_families(definitions)
        .into_iter()
        .flat_map(|family| {
            let family_size = family.members.len();
            let key = family.key;
            family.members.into_iter().map(move |definition| FamilyRow {
                family: key.clone(),
                family_size,
                screening_type_id: definition.id,
                name: definition.name.clone(),
                active: definition.is_active,
                specificity: definition
                    .criteria()
                    .ok()
                    .map(|criteria| specificity_score(definition, &criteria)),
            })
        })
        .collect()
}
