use std::fs;

use anyhow::{Context, Result};
use chrono::Utc;

use prep_cli::dataset::load_dataset;
use prep_cli::tasks::{
    ExplainReport, FamilyRow, RefreshOptions, RefreshOutcome, explain_eligibility,
    list_families, refresh_dataset, score_text,
};
use prep_core::EngineConfig;
use prep_match::KeywordMatch;
use prep_model::{PatientId, ScreeningTypeId, TenantId};

use crate::cli::{ExplainArgs, FamiliesArgs, MatchArgs, RefreshArgs};

fn load_config(path: Option<&std::path::Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).context("load engine config"),
        None => Ok(EngineConfig::default()),
    }
}

pub fn run_refresh(args: &RefreshArgs) -> Result<RefreshOutcome> {
    let options = RefreshOptions {
        dataset: args.dataset.clone(),
        tenant_id: TenantId::new(args.tenant),
        force: args.force,
        patient_ids: args.patients.iter().copied().map(PatientId::new).collect(),
        cutoff: args.cutoff,
        today: args.today,
        now: Utc::now(),
        config: load_config(args.config.as_deref())?,
        dry_run: args.dry_run,
    };
    refresh_dataset(&options)
}

pub fn run_match(args: &MatchArgs) -> Result<Vec<KeywordMatch>> {
    let config = load_config(args.config.as_deref())?;
    let text = match (&args.text, &args.file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?,
        (None, None) => String::new(),
    };
    let threshold = args.threshold.unwrap_or(config.match_threshold);
    Ok(score_text(&text, &args.keywords, threshold, config.fuzzy))
}

pub fn run_explain(args: &ExplainArgs) -> Result<ExplainReport> {
    let dataset = load_dataset(&args.dataset)?;
    let as_of = args.today.unwrap_or_else(|| Utc::now().date_naive());
    explain_eligibility(
        &dataset,
        PatientId::new(args.patient),
        ScreeningTypeId::new(args.screening_type),
        as_of,
    )
}

pub fn run_families(args: &FamiliesArgs) -> Result<Vec<FamilyRow>> {
    let dataset = load_dataset(&args.dataset)?;
    Ok(list_families(&dataset, TenantId::new(args.tenant)))
}
