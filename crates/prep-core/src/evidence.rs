//! Evidence gathering for one screening.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use prep_match::{DocumentMatch, DocumentMatcher, ImmunizationMatch, ImmunizationPredicate};
use prep_model::{
    Document, DocumentId, Immunization, ImmunizationId, MatchingStrategy, ScreeningCriteria,
    ScreeningId,
};

use crate::error::PersistenceError;
use crate::store::DismissalStore;

/// Documents and immunizations supporting a screening's status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub documents: Vec<DocumentMatch>,
    pub immunizations: Vec<ImmunizationMatch>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.immunizations.is_empty()
    }

    /// Latest evidence date; immunizations without a date do not count.
    pub fn last_completed_date(&self) -> Option<NaiveDate> {
        let documents = self.documents.iter().map(|m| m.evidence_date);
        let immunizations = self.immunizations.iter().filter_map(|m| m.administration_date);
        documents.chain(immunizations).max()
    }

    pub fn document_ids(&self) -> BTreeSet<DocumentId> {
        self.documents.iter().map(|m| m.document_id).collect()
    }

    pub fn immunization_ids(&self) -> BTreeSet<ImmunizationId> {
        self.immunizations.iter().map(|m| m.immunization_id).collect()
    }
}

/// Finds evidence for screenings, honoring per-screening dismissals.
pub struct EvidenceFinder<'a> {
    matcher: DocumentMatcher,
    dismissals: &'a dyn DismissalStore,
}

impl<'a> EvidenceFinder<'a> {
    pub fn new(matcher: DocumentMatcher, dismissals: &'a dyn DismissalStore) -> Self {
        Self {
            matcher,
            dismissals,
        }
    }

    /// Evidence for a screening among a patient's records.
    ///
    /// `screening_id` is `None` for a screening that does not exist yet; it
    /// cannot have dismissals.
    pub fn find_matches(
        &self,
        screening_id: Option<ScreeningId>,
        criteria: &ScreeningCriteria,
        documents: &[Document],
        immunizations: &[Immunization],
    ) -> Result<Evidence, PersistenceError> {
        match &criteria.matching {
            MatchingStrategy::Documents => {
                let mut matches = self.matcher.match_documents(documents, &criteria.keywords);
                if let Some(screening_id) = screening_id {
                    let mut kept = Vec::with_capacity(matches.len());
                    for found in matches {
                        if self.dismissals.is_dismissed(screening_id, found.document_id)? {
                            tracing::debug!(
                                screening_id = %screening_id,
                                document_id = %found.document_id,
                                "skipping dismissed document"
                            );
                            continue;
                        }
                        kept.push(found);
                    }
                    matches = kept;
                }
                Ok(Evidence {
                    documents: matches,
                    immunizations: Vec::new(),
                })
            }
            MatchingStrategy::Immunization {
                vaccine_codes,
                vaccine_names,
            } => {
                let predicate = ImmunizationPredicate::new(vaccine_codes, vaccine_names);
                Ok(Evidence {
                    documents: Vec::new(),
                    immunizations: predicate.match_records(immunizations),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{DateTime, Utc};
    use prep_match::FuzzyMatcher;
    use prep_model::{
        DocumentOrigin, GenderRestriction, ImmunizationStatus, PatientId, TenantId,
    };

    use super::*;

    struct Dismissed(BTreeSet<(ScreeningId, DocumentId)>);

    impl DismissalStore for Dismissed {
        fn is_dismissed(
            &self,
            screening_id: ScreeningId,
            document_id: DocumentId,
        ) -> Result<bool, PersistenceError> {
            Ok(self.0.contains(&(screening_id, document_id)))
        }
    }

    fn criteria(matching: MatchingStrategy) -> ScreeningCriteria {
        ScreeningCriteria {
            keywords: vec!["mammogram".to_string()],
            trigger_conditions: Vec::new(),
            min_age: None,
            max_age: None,
            gender: GenderRestriction::Both,
            frequency: None,
            matching,
        }
    }

    fn document(id: u64, text: &str, date: (i32, u32, u32)) -> Document {
        Document {
            id: DocumentId::new(id),
            tenant_id: TenantId::new(1),
            patient_id: PatientId::new(1),
            origin: DocumentOrigin::Ehr,
            filename: None,
            ocr_text: Some(text.to_string()),
            ocr_confidence: None,
            document_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn finder(dismissals: &Dismissed) -> EvidenceFinder<'_> {
        EvidenceFinder::new(DocumentMatcher::new(FuzzyMatcher::default(), 0.75), dismissals)
    }

    #[test]
    fn dismissed_documents_are_excluded() {
        let dismissals = Dismissed(BTreeSet::from([(ScreeningId::new(4), DocumentId::new(2))]));
        let docs = [
            document(1, "screening mammogram", (2023, 5, 1)),
            document(2, "diagnostic mammogram", (2024, 5, 1)),
        ];
        let finder = finder(&dismissals);
        let crit = criteria(MatchingStrategy::Documents);

        let evidence = finder.find_matches(Some(ScreeningId::new(4)), &crit, &docs, &[]).unwrap();
        assert_eq!(evidence.document_ids(), BTreeSet::from([DocumentId::new(1)]));
        assert_eq!(evidence.last_completed_date(), NaiveDate::from_ymd_opt(2023, 5, 1));

        let fresh = finder.find_matches(None, &crit, &docs, &[]).unwrap();
        assert_eq!(fresh.documents.len(), 2);
        assert_eq!(fresh.last_completed_date(), NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn immunization_strategy_ignores_documents() {
        let dismissals = Dismissed(BTreeSet::new());
        let crit = criteria(MatchingStrategy::Immunization {
            vaccine_codes: vec!["141".to_string()],
            vaccine_names: Vec::new(),
        });
        let docs = [document(1, "mammogram", (2024, 1, 1))];
        let shots = [Immunization {
            id: ImmunizationId::new(3),
            tenant_id: TenantId::new(1),
            patient_id: PatientId::new(1),
            vaccine_code: Some("141".to_string()),
            vaccine_name: "Influenza".to_string(),
            administration_date: NaiveDate::from_ymd_opt(2024, 10, 2),
            status: ImmunizationStatus::Completed,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }];
        let evidence = finder(&dismissals).find_matches(None, &crit, &docs, &shots).unwrap();
        assert!(evidence.documents.is_empty());
        assert_eq!(evidence.immunization_ids(), BTreeSet::from([ImmunizationId::new(3)]));
        assert_eq!(evidence.last_completed_date(), NaiveDate::from_ymd_opt(2024, 10, 2));
    }

    #[test]
    fn no_evidence_has_no_completion_date() {
        assert!(Evidence::default().is_empty());
        assert_eq!(Evidence::default().last_completed_date(), None);
    }
}
