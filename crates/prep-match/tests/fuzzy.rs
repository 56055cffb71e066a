use chrono::{DateTime, NaiveDate, Utc};
use proptest::prelude::*;

use prep_match::{DocumentMatcher, FuzzyConfig, FuzzyMatcher, MatchKind};
use prep_model::{Document, DocumentId, DocumentOrigin, PatientId, TenantId};

fn keywords(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn document(id: u64, ocr: Option<&str>, filename: Option<&str>) -> Document {
    Document {
        id: DocumentId::new(id),
        tenant_id: TenantId::new(1),
        patient_id: PatientId::new(1),
        origin: DocumentOrigin::Local,
        filename: filename.map(str::to_string),
        ocr_text: ocr.map(str::to_string),
        ocr_confidence: Some(0.92),
        document_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        created_at: "2024-03-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        updated_at: "2024-03-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap(),
    }
}

fn document_matcher() -> DocumentMatcher {
    DocumentMatcher::new(FuzzyMatcher::default(), 0.75)
}

#[test]
fn flu_never_matches_inside_longer_words() {
    let matcher = FuzzyMatcher::default();
    let kws = keywords(&["flu"]);
    for text in ["influence", "fluent", "The patient is fluent in Spanish", "under the influence"] {
        assert!(
            matcher.match_keywords(text, &kws, 0.0).is_empty(),
            "unexpected match in {text:?}"
        );
    }
}

#[test]
fn flu_documents_require_word_boundaries() {
    let matcher = document_matcher();
    let kws = keywords(&["flu"]);
    let docs = [
        document(1, Some("Patient is fluent in English"), None),
        document(2, Some("No signs of influence"), Some("note.pdf")),
        document(3, Some("Flu vaccine administered left deltoid"), None),
    ];
    let matches = matcher.match_documents(&docs, &kws);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].document_id, DocumentId::new(3));
}

#[test]
fn influenza_is_not_influence() {
    let matcher = FuzzyMatcher::default();
    let kws = keywords(&["influenza"]);
    for text in [
        "Patient was under the influence at intake",
        "an influential family history",
        "Influences: none",
    ] {
        assert!(
            matcher.match_keywords(text, &kws, 0.0).is_empty(),
            "unexpected match in {text:?}"
        );
    }
    let docs = [
        document(1, Some("Patient was under the influence at intake"), None),
        document(2, Some("Influenza vaccine given"), None),
    ];
    let matches = document_matcher().match_documents(&docs, &kws);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].document_id, DocumentId::new(2));
}

#[test]
fn filename_counts_as_searchable_text() {
    let matcher = document_matcher();
    let doc = document(7, None, Some("2024_LipidPanel_results.pdf"));
    let found = matcher.match_document(&doc, &keywords(&["lipid panel"])).unwrap();
    assert_eq!(found.confidence, 1.0);
    assert_eq!(found.matched_keywords, vec!["lipid panel".to_string()]);
    assert_eq!(found.evidence_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
}

#[test]
fn evidence_date_falls_back_to_creation_date() {
    let matcher = document_matcher();
    let mut doc = document(8, Some("screening colonoscopy, no polyps"), None);
    doc.document_date = None;
    let found = matcher.match_document(&doc, &keywords(&["colonoscopy"])).unwrap();
    assert_eq!(found.evidence_date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
}

#[test]
fn matched_keywords_ordered_by_confidence() {
    let matcher = document_matcher();
    let doc = document(
        9,
        Some("HbA1c 7.2% drawn today; glycated hemoglobin trending down"),
        None,
    );
    let found = matcher
        .match_document(&doc, &keywords(&["hemoglobin a1c", "a1c"]))
        .unwrap();
    assert_eq!(found.confidence, 1.0);
    assert_eq!(found.matched_keywords, keywords(&["a1c", "hemoglobin a1c"]));
}

#[test]
fn blank_document_never_matches() {
    let matcher = document_matcher();
    assert!(matcher.match_document(&document(1, None, None), &keywords(&["psa"])).is_none());
    assert!(matcher.match_documents(&[document(2, Some("psa"), None)], &[]).is_empty());
}

#[test]
fn stricter_config_rejects_loose_matches() {
    let strict = FuzzyMatcher::new(FuzzyConfig {
        token_ratio_min: 0.97,
        trigram_min: 0.97,
        ..FuzzyConfig::default()
    });
    assert!(strict.score_keyword("colonoscpy", "colonoscopy").is_none());
    let loose = FuzzyMatcher::default();
    assert_eq!(
        loose.score_keyword("colonoscpy", "colonoscopy").map(|m| m.kind),
        Some(MatchKind::TokenRatio)
    );
}

proptest! {
    #[test]
    fn matching_is_deterministic(
        text in "[a-zA-Z .,_-]{0,80}",
        kws in proptest::collection::vec("[a-z ]{1,15}", 0..5),
        threshold in 0.0f32..1.0,
    ) {
        let matcher = FuzzyMatcher::default();
        let first = matcher.match_keywords(&text, &kws, threshold);
        let second = matcher.match_keywords(&text, &kws, threshold);
        prop_assert_eq!(&first, &second);
        for m in &first {
            prop_assert!(m.confidence >= threshold);
            prop_assert!((0.0..=1.0).contains(&m.confidence));
        }
        for pair in first.windows(2) {
            prop_assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn flu_ignores_words_that_merely_contain_it(prefix in "[a-z]{1,6}", suffix in "[a-z]{1,6}") {
        let word = format!("{prefix}flu{suffix}");
        prop_assume!(word != "influenza");
        let matcher = FuzzyMatcher::default();
        prop_assert!(matcher.match_keywords(&word, &keywords(&["flu"]), 0.0).is_empty());
    }
}
