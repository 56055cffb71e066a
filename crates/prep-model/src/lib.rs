//! Data model for the screening eligibility and status refresh engine.

pub mod document;
pub mod enums;
pub mod error;
pub mod ids;
pub mod list;
pub mod patient;
pub mod refresh;
pub mod screening;
pub mod screening_type;

pub use document::{Document, Immunization};
pub use enums::{
    DocumentOrigin, FrequencyUnit, Gender, GenderRestriction, ImmunizationStatus, ScreeningStatus,
    Severity,
};
pub use error::ConfigurationError;
pub use ids::{
    ConditionId, DocumentId, ImmunizationId, PatientId, ScreeningId, ScreeningTypeId, TenantId,
};
pub use list::StoredList;
pub use patient::{Patient, PatientCondition};
pub use refresh::{ChangeSummary, IssueKind, RefreshIssue, RefreshResult};
pub use screening::{MatchRecord, Screening, ScreeningKey};
pub use screening_type::{
    Frequency, Interval, MatchingStrategy, ScreeningCriteria, ScreeningTypeDefinition, base_name,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_result_counts_writes() {
        let result = RefreshResult {
            success: true,
            screenings_created: 2,
            screenings_updated: 3,
            screenings_deleted: 1,
            ..RefreshResult::default()
        };
        assert_eq!(result.screening_writes(), 6);
        assert!(!result.has_errors());
    }

    #[test]
    fn refresh_result_serializes() {
        let result = RefreshResult {
            success: true,
            errors: vec![RefreshIssue {
                kind: IssueKind::Evaluation,
                patient_id: Some(PatientId::new(7)),
                screening_type_id: None,
                message: "document source unavailable".to_string(),
            }],
            ..RefreshResult::default()
        };
        let json = serde_json::to_string(&result).expect("serialize result");
        let round: RefreshResult = serde_json::from_str(&json).expect("deserialize result");
        assert_eq!(round, result);
        assert!(!json.contains("screening_type_id"));
    }
}
