//! Structured outcome of a refresh cycle.

use serde::{Deserialize, Serialize};

use crate::ids::{PatientId, ScreeningTypeId};

/// Category of a non-fatal problem recorded during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A definition could not be evaluated and was treated as never-eligible.
    Configuration,
    /// A patient could not be processed and was skipped.
    Evaluation,
}

/// A non-fatal problem; callers surface these as warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshIssue {
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screening_type_id: Option<ScreeningTypeId>,
    pub message: String,
}

/// What change detection found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub forced: bool,
    pub screening_types_modified: usize,
    pub documents_modified: usize,
    pub patients_modified: usize,
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResult {
    /// The cycle committed (or had nothing to do).
    pub success: bool,
    /// Change detection found nothing and the cycle exited early.
    pub skipped: bool,
    pub patients_processed: usize,
    pub screenings_created: usize,
    pub screenings_updated: usize,
    pub screenings_deleted: usize,
    pub changes: ChangeSummary,
    pub errors: Vec<RefreshIssue>,
}

impl RefreshResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Screening rows created, updated or deleted.
    pub fn screening_writes(&self) -> usize {
        self.screenings_created + self.screenings_updated + self.screenings_deleted
    }
}
