use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use tempfile::tempdir;

use prep_cli::dataset::{load_dataset, save_dataset};
use prep_cli::tasks::{
    RefreshOptions, explain_eligibility, list_families, refresh_dataset, score_text,
};
use prep_core::{Dataset, EngineConfig};
use prep_match::FuzzyConfig;
use prep_model::{
    ConditionId, Document, DocumentId, DocumentOrigin, GenderRestriction, MatchingStrategy,
    Patient, PatientCondition, PatientId, ScreeningStatus, ScreeningTypeDefinition,
    ScreeningTypeId, StoredList, TenantId,
};

const TENANT: TenantId = TenantId::new(4);

fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

fn definition(id: u64, name: &str, triggers: &[&str]) -> ScreeningTypeDefinition {
    ScreeningTypeDefinition {
        id: ScreeningTypeId::new(id),
        tenant_id: TENANT,
        name: name.to_string(),
        keywords: StoredList::values(["a1c", "hemoglobin a1c"]),
        trigger_conditions: StoredList::values(triggers.iter().copied()),
        min_age: Some(18),
        max_age: None,
        gender_restriction: GenderRestriction::Both,
        frequency_value: Some(0.25),
        frequency_unit: Some("years".to_string()),
        matching: MatchingStrategy::Documents,
        is_active: true,
        criteria_signature: None,
        updated_at: at("2025-01-01T00:00:00Z"),
    }
}

fn clinic() -> Dataset {
    Dataset {
        patients: vec![Patient {
            id: PatientId::new(1),
            tenant_id: TENANT,
            mrn: Some("MRN0001".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1968, 3, 14),
            gender: Some("female".to_string()),
            next_appointment: None,
            updated_at: at("2025-01-01T00:00:00Z"),
        }],
        conditions: vec![PatientCondition {
            id: ConditionId::new(1),
            tenant_id: TENANT,
            patient_id: PatientId::new(1),
            condition_name: "T2DM".to_string(),
            is_active: true,
            diagnosis_date: None,
            updated_at: at("2025-01-01T00:00:00Z"),
        }],
        screening_types: vec![
            definition(1, "A1C Test", &[]),
            definition(2, "A1C Test (Diabetic)", &["diabetes"]),
        ],
        documents: vec![Document {
            id: DocumentId::new(1),
            tenant_id: TENANT,
            patient_id: PatientId::new(1),
            origin: DocumentOrigin::Ehr,
            filename: Some("lab_results.pdf".to_string()),
            ocr_text: Some("HbA1c 6.8 %".to_string()),
            ocr_confidence: Some(0.92),
            document_date: NaiveDate::from_ymd_opt(2025, 1, 10),
            created_at: at("2025-01-12T00:00:00Z"),
            updated_at: at("2025-01-12T00:00:00Z"),
        }],
        ..Dataset::default()
    }
}

fn options(path: &Path) -> RefreshOptions {
    RefreshOptions {
        dataset: path.to_path_buf(),
        tenant_id: TENANT,
        force: false,
        patient_ids: Vec::new(),
        cutoff: None,
        today: None,
        now: at("2025-06-01T09:00:00Z"),
        config: EngineConfig::default(),
        dry_run: false,
    }
}

#[test]
fn refresh_round_trips_the_dataset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("clinic.json");
    save_dataset(&clinic(), &path).unwrap();

    let outcome = refresh_dataset(&options(&path)).unwrap();
    assert!(outcome.saved);
    insta::assert_json_snapshot!(outcome.result, @r#"
    {
      "success": true,
      "skipped": false,
      "patients_processed": 1,
      "screenings_created": 1,
      "screenings_updated": 0,
      "screenings_deleted": 0,
      "changes": {
        "forced": false,
        "screening_types_modified": 2,
        "documents_modified": 1,
        "patients_modified": 1
      },
      "errors": []
    }
    "#);

    let saved = load_dataset(&path).unwrap();
    assert_eq!(saved.screenings.len(), 1);
    let screening = &saved.screenings[0];
    assert_eq!(screening.screening_type_id, ScreeningTypeId::new(2));
    // 2025-01-10 plus three months is before 2025-06-01.
    assert_eq!(screening.status, ScreeningStatus::Due);
    assert_eq!(screening.last_completed_date, NaiveDate::from_ymd_opt(2025, 1, 10));
    assert_eq!(saved.watermarks.len(), 1);
    assert!(saved.screening_types.iter().all(|d| d.criteria_signature.is_some()));

    let mut again = options(&path);
    again.now = at("2025-06-01T10:00:00Z");
    let second = refresh_dataset(&again).unwrap();
    assert!(second.result.skipped);
    assert!(!second.saved);
    assert_eq!(load_dataset(&path).unwrap(), saved);
}

#[test]
fn dry_run_leaves_the_file_alone() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("clinic.json");
    save_dataset(&clinic(), &path).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let mut dry = options(&path);
    dry.dry_run = true;
    let outcome = refresh_dataset(&dry).unwrap();
    assert!(!outcome.saved);
    assert_eq!(outcome.result.screenings_created, 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn missing_dataset_is_an_error() {
    let dir = tempdir().unwrap();
    let err = refresh_dataset(&options(&dir.path().join("absent.json"))).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
}

#[test]
fn explain_uses_the_patient_tenant() {
    let dataset = clinic();
    let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let report =
        explain_eligibility(&dataset, PatientId::new(1), ScreeningTypeId::new(2), today).unwrap();
    assert!(report.explanation.eligible);
    assert_eq!(report.screening_type, "A1C Test (Diabetic)");

    let err = explain_eligibility(&dataset, PatientId::new(1), ScreeningTypeId::new(99), today)
        .unwrap_err();
    assert!(err.to_string().contains("screening type 99"));
    assert!(
        explain_eligibility(&dataset, PatientId::new(5), ScreeningTypeId::new(2), today).is_err()
    );
}

#[test]
fn families_group_variants() {
    let rows = list_families(&clinic(), TENANT);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.family == "a1c test" && row.family_size == 2));
    assert_eq!(rows[0].specificity, Some(0));
    assert_eq!(rows[1].specificity, Some(10));
    assert!(list_families(&clinic(), TenantId::new(99)).is_empty());
}

#[test]
fn score_text_applies_threshold() {
    let keywords = vec!["a1c".to_string(), "colonoscopy".to_string()];
    let matches = score_text("Hemoglobin A1c 6.8", &keywords, 0.75, FuzzyConfig::default());
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].keyword, "a1c");
    assert!(score_text("Hemoglobin A1c 6.8", &keywords, 1.01, FuzzyConfig::default()).is_empty());
}
